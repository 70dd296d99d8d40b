//! # Perfmarker - GPU Profiler Activity Logger
//!
//! Perfmarker lets an application annotate its execution timeline for a GPU
//! profiler. Threads open and close named markers; each thread's records go to
//! its own stream, and on finalize every stream is consolidated into one
//! `.amdtperfmarker` file that the profiler's timeline viewer loads next to
//! its API trace.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Instrumented Application                    │
//! │        amdtBeginMarker / amdtEndMarker / amdtStopProfiling      │
//! └───────────────┬─────────────────────────────────┬───────────────┘
//!                 │ markers                         │ stop/resume
//!                 ▼                                 ▼
//! ┌───────────────────────────────────┐   ┌─────────────────────────┐
//! │          ActivityLogger           │   │     ProfileControl      │
//! │  ┌───────────┐   ┌─────────────┐  │   │  CL/HSA trace agents    │
//! │  │ Preflight │   │ LoggerParams│  │   │  CL/HSA counter agents  │
//! │  │ (env vars)│   │ (.rcpdata)  │  │   │  CL occupancy agent     │
//! │  └───────────┘   └─────────────┘  │   └─────────────────────────┘
//! │          │                        │
//! │          ▼                        │
//! │  ┌─────────────────────────────┐  │
//! │  │ StreamRegistry (tid → stream│  │
//! │  │  in memory or temp file)    │  │
//! │  └──────────────┬──────────────┘  │
//! └─────────────────┼─────────────────┘
//!                   │ finalize
//!                   ▼
//!        <output>.amdtperfmarker ──▶ PerfMarkerOutput ──▶ Chrome trace
//! ```
//!
//! ## Module Structure
//!
//! - [`logger`]: lifecycle gate, the process-wide lock and the public marker API
//! - [`recorder`]: line encoding, per-thread streams, the registry and the
//!   consolidated writer
//! - [`preflight`]: detection of an attached GPU trace agent
//! - [`params`]: the profiler's parameter file
//! - [`profile_control`]: stop/resume forwarded to loaded profiler agents
//! - [`trace_data`]: reader for the consolidated file
//! - [`export`]: Chrome Trace Event Format JSON for Perfetto or `chrome://tracing`
//! - [`ffi`]: the `amdt*` C entry points
//! - [`domain`]: core types (Tid, Timestamp, ProfilingMode) and errors
//!
//! ## Typical Usage
//!
//! ```no_run
//! use perfmarker::ActivityLogger;
//!
//! # fn example() -> Result<(), perfmarker::MarkerError> {
//! let logger = ActivityLogger::new();
//! logger.initialize()?;
//!
//! logger.begin_marker(Some("Frame"), None, None)?;
//! logger.begin_marker(Some("Upload"), Some("Memory"), None)?;
//! logger.end_marker()?;
//! logger.end_marker()?;
//!
//! logger.finalize()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! - **Marker**: a named, grouped interval on one thread; markers nest
//! - **Timeout mode**: the profiler's periodic flush mode, where streams live in
//!   per-thread temp files instead of memory
//! - **Balanced**: every begin on a thread has a matching end at finalize

pub mod clock;
pub mod domain;
pub mod export;
pub mod ffi;
pub mod logger;
pub mod params;
pub mod preflight;
pub mod profile_control;
pub mod recorder;
pub mod trace_data;

pub use domain::{MarkerError, ParamsError, ProfilingMode, StatusCode, Tid, Timestamp};
pub use logger::{ActivityLogger, ActivityLoggerBuilder, ScopedMarker};
pub use profile_control::ProfileControl;
