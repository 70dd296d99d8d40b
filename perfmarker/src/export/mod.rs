//! Trace export functionality
//!
//! Converts consolidated perf-marker output into other trace formats.
//! Currently supports Chrome Trace Event Format for chrome://tracing and Perfetto.

pub mod chrome_trace;

pub use chrome_trace::ChromeTraceExporter;
