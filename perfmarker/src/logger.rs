//! # Activity Logger
//!
//! Process-level marker logger: lifecycle gate, single lock, and the public
//! begin/end/finalize operations.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized ──initialize──▶ Initialized ──finalize──▶ Finalized
//!       ▲                            │
//!       └── detection/params fail    └── output open fails (stays, retry ok)
//! ```
//!
//! - `initialize` is idempotent once initialized and rejected after finalize.
//! - Marker calls require `Initialized`.
//! - `finalize` is idempotent once finalized and rejected before initialize.
//!
//! ## Concurrency
//!
//! One mutex guards the lifecycle state and the stream registry, so every
//! operation is serialized. Finalize drains all streams: callers must stop
//! recording on every thread before finalizing. A marker call that races with
//! finalize is rejected with [`MarkerError::Finalized`] or recorded before the
//! drain; it never touches a released stream.

use crate::clock::{Clock, MonotonicClock};
use crate::domain::{MarkerError, Tid};
use crate::params::{DefaultParamsFile, LoggerParams, ParameterSource};
use crate::preflight::{check_gpu_profiler, EnvironmentProbe, ProcessEnvironment};
use crate::recorder::{self, FinalizeSummary, StorageMode, StreamRegistry};
use log::{debug, info};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// State carried while markers may be recorded
#[derive(Debug)]
struct Session {
    params: LoggerParams,
    registry: StreamRegistry,
}

#[derive(Debug)]
enum Lifecycle {
    Uninitialized,
    Initialized(Session),
    Finalized,
}

/// Marker logger for one process
///
/// Usually reached through the process-wide instance behind the C entry
/// points, but independent instances can be built for embedding and tests.
pub struct ActivityLogger {
    state: Mutex<Lifecycle>,
    clock: Box<dyn Clock>,
    environment: Box<dyn EnvironmentProbe>,
    params: Box<dyn ParameterSource>,
}

impl std::fmt::Debug for ActivityLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLogger").field("state", &self.state).finish_non_exhaustive()
    }
}

impl Default for ActivityLogger {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ActivityLogger {
    /// Logger wired to the real clock, environment and parameter file
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> ActivityLoggerBuilder {
        ActivityLoggerBuilder::default()
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        // Every mutation under the lock leaves the state consistent, so a
        // panic on another thread does not invalidate it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Detect the GPU profiler and load its parameters
    ///
    /// Only a fully parameterized initialization changes state.
    ///
    /// # Errors
    /// - [`MarkerError::Finalized`] after finalize
    /// - [`MarkerError::ProfilerNotDetected`] if no trace agent is attached
    /// - [`MarkerError::Params`] if the parameters are missing or incomplete
    pub fn initialize(&self) -> Result<(), MarkerError> {
        let mut state = self.lock();

        match *state {
            Lifecycle::Initialized(_) => return Ok(()),
            Lifecycle::Finalized => return Err(MarkerError::Finalized),
            Lifecycle::Uninitialized => {}
        }

        check_gpu_profiler(self.environment.as_ref())?;
        let params = self.params.load()?;

        info!(
            "Activity logger initialized (output: {}, {} streams)",
            params.output_file.display(),
            if params.timeout_mode { "temp-file" } else { "in-memory" }
        );

        let registry = StreamRegistry::new(StorageMode::for_params(&params));
        *state = Lifecycle::Initialized(Session { params, registry });
        Ok(())
    }

    /// Begin a marker on the calling thread
    ///
    /// `group` defaults to `Default` when absent or empty. `user_string` is
    /// accepted for API compatibility and not recorded.
    ///
    /// # Errors
    /// - [`MarkerError::Uninitialized`] / [`MarkerError::Finalized`] outside the active phase
    /// - [`MarkerError::NullMarkerName`] if `name` is `None` or empty
    /// - [`MarkerError::StreamAllocation`] if the thread's stream cannot be created
    pub fn begin_marker(
        &self,
        name: Option<&str>,
        group: Option<&str>,
        user_string: Option<&str>,
    ) -> Result<(), MarkerError> {
        self.begin_marker_on(Tid::current(), name, group, user_string)
    }

    /// [`Self::begin_marker`] on behalf of an explicit thread
    ///
    /// # Errors
    /// Same as [`Self::begin_marker`]
    pub fn begin_marker_on(
        &self,
        tid: Tid,
        name: Option<&str>,
        group: Option<&str>,
        user_string: Option<&str>,
    ) -> Result<(), MarkerError> {
        // Reserved for structured annotations such as color hints.
        let _ = user_string;

        let mut state = self.lock();
        let session = active_session(&mut state)?;
        recorder::begin_marker(&mut session.registry, self.clock.as_ref(), tid, name, group)
    }

    /// Close the innermost marker on the calling thread
    ///
    /// # Errors
    /// Same as [`Self::end_marker_ex`]
    pub fn end_marker(&self) -> Result<(), MarkerError> {
        self.end_marker_ex(Some(""), Some(""), Some(""))
    }

    /// Close the innermost marker, optionally renaming it
    ///
    /// Empty name with the default group closes without renaming. Any other
    /// combination requires a non-empty name.
    ///
    /// # Errors
    /// - [`MarkerError::Uninitialized`] / [`MarkerError::Finalized`] outside the active phase
    /// - [`MarkerError::NullMarkerName`] for a missing name, or an empty name with a group
    /// - [`MarkerError::UnbalancedMarker`] if no marker is open on this thread
    pub fn end_marker_ex(
        &self,
        name: Option<&str>,
        group: Option<&str>,
        user_string: Option<&str>,
    ) -> Result<(), MarkerError> {
        self.end_marker_ex_on(Tid::current(), name, group, user_string)
    }

    /// [`Self::end_marker_ex`] on behalf of an explicit thread
    ///
    /// # Errors
    /// Same as [`Self::end_marker_ex`]
    pub fn end_marker_ex_on(
        &self,
        tid: Tid,
        name: Option<&str>,
        group: Option<&str>,
        user_string: Option<&str>,
    ) -> Result<(), MarkerError> {
        let _ = user_string;

        let mut state = self.lock();
        let session = active_session(&mut state)?;
        recorder::end_marker(&mut session.registry, self.clock.as_ref(), tid, name, group)
    }

    /// Write the consolidated output file and release every stream
    ///
    /// Returns `None` when the logger was already finalized.
    ///
    /// # Errors
    /// - [`MarkerError::Uninitialized`] if never initialized
    /// - [`MarkerError::OpenOutputFile`] if the output cannot be created; the
    ///   logger stays initialized so finalize can be retried
    pub fn finalize(&self) -> Result<Option<FinalizeSummary>, MarkerError> {
        let mut state = self.lock();

        let session = match &mut *state {
            Lifecycle::Finalized => return Ok(None),
            Lifecycle::Uninitialized => return Err(MarkerError::Uninitialized),
            Lifecycle::Initialized(session) => session,
        };

        let summary = recorder::write_consolidated(&session.params.output_file, &mut session.registry)?;
        info!(
            "Activity logger finalized: {} threads, {} records written to {}",
            summary.threads,
            summary.records,
            session.params.output_file.display()
        );

        *state = Lifecycle::Finalized;
        Ok(Some(summary))
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        matches!(*self.lock(), Lifecycle::Initialized(_))
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        matches!(*self.lock(), Lifecycle::Finalized)
    }

    /// Open markers on `tid`, or `None` if it has no stream
    #[must_use]
    pub fn depth_of(&self, tid: Tid) -> Option<u32> {
        match &*self.lock() {
            Lifecycle::Initialized(session) => session.registry.get(tid).map(|s| s.depth()),
            _ => None,
        }
    }

    /// Parameters in effect, once initialized
    #[must_use]
    pub fn params(&self) -> Option<LoggerParams> {
        match &*self.lock() {
            Lifecycle::Initialized(session) => Some(session.params.clone()),
            _ => None,
        }
    }
}

fn active_session(state: &mut Lifecycle) -> Result<&mut Session, MarkerError> {
    match state {
        Lifecycle::Initialized(session) => Ok(session),
        Lifecycle::Uninitialized => Err(MarkerError::Uninitialized),
        Lifecycle::Finalized => Err(MarkerError::Finalized),
    }
}

/// Replaces the logger's external collaborators
#[derive(Default)]
pub struct ActivityLoggerBuilder {
    clock: Option<Box<dyn Clock>>,
    environment: Option<Box<dyn EnvironmentProbe>>,
    params: Option<Box<dyn ParameterSource>>,
}

impl ActivityLoggerBuilder {
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    #[must_use]
    pub fn environment(mut self, environment: impl EnvironmentProbe + 'static) -> Self {
        self.environment = Some(Box::new(environment));
        self
    }

    #[must_use]
    pub fn params(mut self, params: impl ParameterSource + 'static) -> Self {
        self.params = Some(Box::new(params));
        self
    }

    #[must_use]
    pub fn build(self) -> ActivityLogger {
        ActivityLogger {
            state: Mutex::new(Lifecycle::Uninitialized),
            clock: self.clock.unwrap_or_else(|| Box::new(MonotonicClock::new())),
            environment: self.environment.unwrap_or_else(|| Box::new(ProcessEnvironment)),
            params: self.params.unwrap_or_else(|| Box::new(DefaultParamsFile)),
        }
    }
}

/// Marker that ends itself when dropped
///
/// ```no_run
/// use perfmarker::{ActivityLogger, ScopedMarker};
///
/// let logger = ActivityLogger::new();
/// logger.initialize().ok();
/// {
///     let _marker = ScopedMarker::new(&logger, "Upload", Some("Transfers"));
///     // enqueue work...
/// }
/// ```
#[must_use = "the marker ends as soon as the guard is dropped"]
pub struct ScopedMarker<'a> {
    logger: &'a ActivityLogger,
    tid: Tid,
    began: bool,
}

impl<'a> ScopedMarker<'a> {
    pub fn new(logger: &'a ActivityLogger, name: &str, group: Option<&str>) -> Self {
        let tid = Tid::current();
        let began = match logger.begin_marker_on(tid, Some(name), group, None) {
            Ok(()) => true,
            Err(e) => {
                debug!("Scoped marker {name:?} not recorded: {e}");
                false
            }
        };
        Self { logger, tid, began }
    }

    /// Whether the begin event was recorded
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.began
    }
}

impl Drop for ScopedMarker<'_> {
    fn drop(&mut self) {
        if self.began {
            if let Err(e) = self.logger.end_marker_ex_on(self.tid, Some(""), Some(""), None) {
                debug!("Scoped marker end not recorded: {e}");
            }
        }
    }
}
