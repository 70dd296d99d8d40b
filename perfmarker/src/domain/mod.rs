//! Domain model for perfmarker
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern
//! - Self-documenting function signatures
//! - Structured error handling mapped onto C status codes

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{ProfilingMode, Tid, Timestamp};

pub use errors::{MarkerError, ParamsError, StatusCode};
