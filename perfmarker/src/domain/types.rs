//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep thread ids, timestamps and profiling modes from
//! being mixed up with plain integers in function signatures.

#![allow(unsafe_code)] // gettid() requires unsafe

use perfmarker_common::{
    AMDT_ALL_PROFILING, AMDT_CPU_PROFILING, AMDT_PERF_COUNTER_PROFILING, AMDT_TRACE_PROFILING,
};
use std::fmt;
use std::ops::BitOr;

/// Thread ID
///
/// Identifies the thread that owns a marker stream. On Linux this is the
/// kernel thread id, which is what the GPU profiler records for API calls,
/// so markers line up with the traced calls in the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tid(pub u64);

impl Tid {
    /// Id of the calling thread
    #[must_use]
    pub fn current() -> Self {
        Tid(current_thread_id())
    }
}

#[cfg(target_os = "linux")]
#[allow(clippy::cast_sign_loss)]
fn current_thread_id() -> u64 {
    // SAFETY: gettid has no preconditions and cannot fail.
    unsafe { libc::syscall(libc::SYS_gettid) as u64 }
}

#[cfg(not(target_os = "linux"))]
fn current_thread_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT_TID: AtomicU64 = AtomicU64::new(1);

    thread_local! {
        static TID: u64 = NEXT_TID.fetch_add(1, Ordering::Relaxed);
    }

    TID.with(|t| *t)
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Timestamp in nanoseconds
///
/// Nanoseconds since an arbitrary monotonic epoch (boot time on Linux).
/// Displays as the bare integer so it can be padded into record columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Convert to microseconds (f64)
    #[allow(clippy::cast_precision_loss)]
    pub fn as_micros_f64(self) -> f64 {
        self.0 as f64 / 1_000.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Set of profiling modes to stop or resume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProfilingMode(u32);

impl ProfilingMode {
    pub const TRACE: Self = Self(AMDT_TRACE_PROFILING);
    pub const PERF_COUNTER: Self = Self(AMDT_PERF_COUNTER_PROFILING);
    pub const CPU: Self = Self(AMDT_CPU_PROFILING);
    pub const ALL: Self = Self(AMDT_ALL_PROFILING);

    /// Build from raw C bits; unknown bits are kept so they reach agents untouched
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every bit of `other` is set in `self`
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if any bit of `other` is set in `self`
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for ProfilingMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for ProfilingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::TRACE) {
            names.push("trace");
        }
        if self.contains(Self::PERF_COUNTER) {
            names.push("perf-counter");
        }
        if self.contains(Self::CPU) {
            names.push("cpu");
        }
        if names.is_empty() {
            write!(f, "none(0x{:x})", self.0)
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}
