//! Nanosecond clock used to stamp marker events
//!
//! Markers must share a time base with the GPU profiler's API trace, which
//! stamps with `CLOCK_MONOTONIC`. The [`Clock`] trait lets tests drive time
//! deterministically.

#![allow(unsafe_code)] // clock_gettime() requires unsafe

use crate::domain::Timestamp;

/// Source of monotonic nanosecond timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// `CLOCK_MONOTONIC` on Unix, process-relative `Instant` elsewhere
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    #[cfg(not(unix))]
    origin: std::time::Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            #[cfg(not(unix))]
            origin: std::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl Clock for MonotonicClock {
    #[allow(clippy::cast_sign_loss)]
    fn now(&self) -> Timestamp {
        let mut tp = libc::timespec { tv_sec: 0, tv_nsec: 0 };
        // SAFETY: tp is a valid, writable timespec; CLOCK_MONOTONIC is always available.
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut tp);
        }
        Timestamp(tp.tv_sec as u64 * 1_000_000_000 + tp.tv_nsec as u64)
    }
}

#[cfg(not(unix))]
impl Clock for MonotonicClock {
    #[allow(clippy::cast_possible_truncation)]
    fn now(&self) -> Timestamp {
        Timestamp(self.origin.elapsed().as_nanos() as u64)
    }
}
