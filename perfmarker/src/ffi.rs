//! C ABI exported by the `cdylib`
//!
//! Each entry point returns one of the `AL_*` status codes from
//! `perfmarker-common`. The process has one logger and one profile controller,
//! both created on first use.

#![allow(unsafe_code)] // C strings from callers require unsafe
#![allow(non_snake_case)] // exported names follow the C API

use crate::domain::{MarkerError, ProfilingMode, StatusCode};
use crate::logger::ActivityLogger;
use crate::profile_control::ProfileControl;
use env_logger::Env;
use log::warn;
use std::borrow::Cow;
use std::ffi::{c_char, c_int, CStr};
use std::sync::{Mutex, Once, OnceLock, PoisonError};

static LOGGER: OnceLock<ActivityLogger> = OnceLock::new();
static PROFILE_CONTROL: OnceLock<Mutex<ProfileControl>> = OnceLock::new();

/// Route diagnostics to stderr unless the host already installed a logger
fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_env(Env::default().default_filter_or("warn")).try_init();
    });
}

fn logger() -> &'static ActivityLogger {
    init_logging();
    LOGGER.get_or_init(ActivityLogger::new)
}

fn with_profile_control<T>(f: impl FnOnce(&mut ProfileControl) -> T) -> T {
    init_logging();
    let control = PROFILE_CONTROL.get_or_init(|| Mutex::new(ProfileControl::default()));
    let mut guard = control.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

/// Borrow a caller string; `None` for null
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
unsafe fn c_str<'a>(ptr: *const c_char) -> Option<Cow<'a, str>> {
    if ptr.is_null() {
        None
    } else {
        // SAFETY: non-null and NUL-terminated per the caller contract.
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy())
    }
}

fn status<T>(operation: &str, result: &Result<T, MarkerError>) -> c_int {
    if let Err(e) = result {
        warn!("{operation} failed: {e}");
    }
    StatusCode::from_result(result).code()
}

#[no_mangle]
pub extern "C" fn amdtInitializeActivityLogger() -> c_int {
    status("amdtInitializeActivityLogger", &logger().initialize())
}

/// # Safety
/// Each pointer must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn amdtBeginMarker(
    marker_name: *const c_char,
    group_name: *const c_char,
    user_string: *const c_char,
) -> c_int {
    // SAFETY: forwarded caller contract.
    let (name, group, user) = unsafe { (c_str(marker_name), c_str(group_name), c_str(user_string)) };
    let result = logger().begin_marker(name.as_deref(), group.as_deref(), user.as_deref());
    status("amdtBeginMarker", &result)
}

#[no_mangle]
pub extern "C" fn amdtEndMarker() -> c_int {
    status("amdtEndMarker", &logger().end_marker())
}

/// # Safety
/// Each pointer must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn amdtEndMarkerEx(
    marker_name: *const c_char,
    group_name: *const c_char,
    user_string: *const c_char,
) -> c_int {
    // SAFETY: forwarded caller contract.
    let (name, group, user) = unsafe { (c_str(marker_name), c_str(group_name), c_str(user_string)) };
    let result = logger().end_marker_ex(name.as_deref(), group.as_deref(), user.as_deref());
    status("amdtEndMarkerEx", &result)
}

#[no_mangle]
pub extern "C" fn amdtFinalizeActivityLogger() -> c_int {
    status("amdtFinalizeActivityLogger", &logger().finalize())
}

#[no_mangle]
pub extern "C" fn amdtStopProfiling(profiling_mode: u32) -> c_int {
    let mode = ProfilingMode::from_bits(profiling_mode);
    status("amdtStopProfiling", &with_profile_control(|control| control.stop(mode)))
}

#[no_mangle]
pub extern "C" fn amdtResumeProfiling(profiling_mode: u32) -> c_int {
    let mode = ProfilingMode::from_bits(profiling_mode);
    status("amdtResumeProfiling", &with_profile_control(|control| control.resume(mode)))
}

#[no_mangle]
pub extern "C" fn amdtStopProfilingEx() -> c_int {
    status("amdtStopProfilingEx", &with_profile_control(ProfileControl::stop_ex))
}

#[no_mangle]
pub extern "C" fn amdtResumeProfilingEx() -> c_int {
    status("amdtResumeProfilingEx", &with_profile_control(ProfileControl::resume_ex))
}
