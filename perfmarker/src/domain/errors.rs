//! Structured error types for perfmarker
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Every [`MarkerError`] maps onto exactly one C status code through
//! [`StatusCode`].

use super::types::{ProfilingMode, Tid};
use perfmarker_common as abi;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarkerError {
    #[error("Activity logger is not initialized")]
    Uninitialized,

    #[error("Activity logger is already finalized")]
    Finalized,

    #[error("Unbalanced marker on thread {0}: no open marker to end")]
    UnbalancedMarker(Tid),

    #[error("GPU profiler not detected in this process")]
    ProfilerNotDetected,

    #[error("Marker name is required")]
    NullMarkerName,

    #[error("Failed to create marker stream for thread {tid}: {source}")]
    StreamAllocation {
        tid: Tid,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open output file {}: {source}", .path.display())]
    OpenOutputFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No profiler agent accepted {0}")]
    FailedToAttach(ProfilingMode),

    #[error(transparent)]
    Params(#[from] ParamsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ParamsError {
    #[error("Failed to read parameter file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot locate parameter file: {0} is not set")]
    NoLocation(&'static str),

    #[error("Parameter file is missing keys: {}", .0.join(", "))]
    MissingKeys(Vec<&'static str>),
}

/// Closed set of results reported through the C entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Success,
    UninitializedLogger,
    FinalizedLogger,
    UnbalancedMarker,
    ProfilerNotDetected,
    NullMarkerName,
    InternalError,
    OutOfMemory,
    FailedToOpenOutputFile,
    FailedToAttachToProfiler,
    ProfileAlreadyResumed,
    ProfileAlreadyPaused,
    ProfilerParameterMismatch,
}

impl StatusCode {
    /// Integer value returned across the C ABI
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            StatusCode::Success => abi::AL_SUCCESS,
            StatusCode::UninitializedLogger => abi::AL_UNINITIALIZED_ACTIVITY_LOGGER,
            StatusCode::FinalizedLogger => abi::AL_FINALIZED_ACTIVITY_LOGGER,
            StatusCode::UnbalancedMarker => abi::AL_UNBALANCED_MARKER,
            StatusCode::ProfilerNotDetected => abi::AL_GPU_PROFILER_NOT_DETECTED,
            StatusCode::NullMarkerName => abi::AL_NULL_MARKER_NAME,
            StatusCode::InternalError => abi::AL_INTERNAL_ERROR,
            StatusCode::OutOfMemory => abi::AL_OUT_OF_MEMORY,
            StatusCode::FailedToOpenOutputFile => abi::AL_FAILED_TO_OPEN_OUTPUT_FILE,
            StatusCode::FailedToAttachToProfiler => abi::AL_FAILED_TO_ATTACH_TO_PROFILER,
            StatusCode::ProfileAlreadyResumed => abi::AL_WARN_PROFILE_ALREADY_RESUMED,
            StatusCode::ProfileAlreadyPaused => abi::AL_WARN_PROFILE_ALREADY_PAUSED,
            StatusCode::ProfilerParameterMismatch => abi::AL_GPU_PROFILER_MISMATCH,
        }
    }

    /// Warnings are non-zero but do not indicate failure
    #[must_use]
    pub const fn is_warning(self) -> bool {
        matches!(self, StatusCode::ProfileAlreadyResumed | StatusCode::ProfileAlreadyPaused)
    }

    /// Collapse an operation result into its status code
    #[must_use]
    pub fn from_result<T>(result: &Result<T, MarkerError>) -> Self {
        match result {
            Ok(_) => StatusCode::Success,
            Err(e) => StatusCode::from(e),
        }
    }
}

impl From<&MarkerError> for StatusCode {
    fn from(err: &MarkerError) -> Self {
        match err {
            MarkerError::Uninitialized => StatusCode::UninitializedLogger,
            MarkerError::Finalized => StatusCode::FinalizedLogger,
            MarkerError::UnbalancedMarker(_) => StatusCode::UnbalancedMarker,
            MarkerError::ProfilerNotDetected => StatusCode::ProfilerNotDetected,
            MarkerError::NullMarkerName => StatusCode::NullMarkerName,
            MarkerError::StreamAllocation { .. } => StatusCode::OutOfMemory,
            MarkerError::OpenOutputFile { .. } => StatusCode::FailedToOpenOutputFile,
            MarkerError::FailedToAttach(_) => StatusCode::FailedToAttachToProfiler,
            MarkerError::Params(_) => StatusCode::ProfilerParameterMismatch,
            MarkerError::Io(_) => StatusCode::InternalError,
        }
    }
}
