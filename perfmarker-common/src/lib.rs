//! # Shared Definitions (C callers ↔ Rust logger)
//!
//! Constants shared between the `extern "C"` activity logger surface and the
//! Rust implementation. Integer values are part of the public C ABI and must
//! never be renumbered.
//!
//! ## Key Groups
//!
//! - Status codes (`AL_*`) returned by every entry point
//! - Profiling control mode bits (`AMDT_*_PROFILING`)
//! - Perf-marker text format: header, event tags, column widths, escape token

#![no_std]

// ============================================================================
// Status Codes
// ============================================================================

/// Operation completed
pub const AL_SUCCESS: i32 = 0;

/// A marker call was made before `amdtInitializeActivityLogger`
pub const AL_UNINITIALIZED_ACTIVITY_LOGGER: i32 = -1;

/// A call was made after `amdtFinalizeActivityLogger`
pub const AL_FINALIZED_ACTIVITY_LOGGER: i32 = -2;

/// End marker without a matching begin on the calling thread
pub const AL_UNBALANCED_MARKER: i32 = -3;

/// No GPU profiler agent is attached to this process
pub const AL_GPU_PROFILER_NOT_DETECTED: i32 = -4;

/// Marker name missing where one is required
pub const AL_NULL_MARKER_NAME: i32 = -5;

pub const AL_INTERNAL_ERROR: i32 = -6;

/// Stream storage could not be created
pub const AL_OUT_OF_MEMORY: i32 = -7;

/// Consolidated output file could not be created at finalize
pub const AL_FAILED_TO_OPEN_OUTPUT_FILE: i32 = -8;

/// No profiler agent entry point could be called
pub const AL_FAILED_TO_ATTACH_TO_PROFILER: i32 = -9;

/// Warning: profiling was already resumed
pub const AL_WARN_PROFILE_ALREADY_RESUMED: i32 = -10;

/// Warning: profiling was already paused
pub const AL_WARN_PROFILE_ALREADY_PAUSED: i32 = -11;

/// The profiler's parameter file is missing or incomplete
pub const AL_GPU_PROFILER_MISMATCH: i32 = -12;

// ============================================================================
// Profiling Control Modes
// ============================================================================

/// Application timeline trace profiling
pub const AMDT_TRACE_PROFILING: u32 = 0x1;

/// Performance counter profiling
pub const AMDT_PERF_COUNTER_PROFILING: u32 = 0x2;

/// CPU profiling
pub const AMDT_CPU_PROFILING: u32 = 0x4;

/// All profiling modes
pub const AMDT_ALL_PROFILING: u32 =
    AMDT_TRACE_PROFILING | AMDT_PERF_COUNTER_PROFILING | AMDT_CPU_PROFILING;

// ============================================================================
// Perf-Marker Text Format
// ============================================================================

/// First line of every consolidated output file
pub const PERFMARKER_HEADER: &str = "=====Perfmarker Output=====";

/// Extension used for the parameter file and per-thread temporary files
pub const PERFMARKER_EXT: &str = "amdtperfmarker";

/// Replaces literal spaces in marker and group names
///
/// The timeline viewer tokenizes records on whitespace, so names must not
/// contain raw spaces.
pub const SPACE_ESCAPE: &str = "&nbsp;";

/// Group used when none (or an empty one) is given
pub const DEFAULT_GROUP: &str = "Default";

/// Names shorter than this are written in padded columns
pub const MARKER_NAME_WIDTH: usize = 50;

/// Column width for the event tag and the timestamp
pub const FIELD_WIDTH: usize = 20;

/// Separator between fields of long-name records
pub const FIELD_SEPARATOR: &str = "   ";

pub const TAG_BEGIN: &str = "clBeginPerfMarker";
pub const TAG_END: &str = "clEndPerfMarker";
pub const TAG_END_EX: &str = "clEndPerfMarkerEx";

// ============================================================================
// Profiler Detection
// ============================================================================

/// Environment variable naming the OpenCL agent library
pub const ENV_CL_AGENT: &str = "CL_AGENT";

/// Environment variable naming the HSA tools library
pub const ENV_HSA_TOOLS_LIB: &str = "HSA_TOOLS_LIB";

pub const CL_TRACE_AGENT: &str = "CLTraceAgent";
pub const CL_PROFILE_AGENT: &str = "CLProfileAgent";
pub const CL_OCCUPANCY_AGENT: &str = "CLOccupancyAgent";
pub const HSA_TRACE_AGENT: &str = "HSATraceAgent";
pub const HSA_PROFILE_AGENT: &str = "HSAProfileAgent";
