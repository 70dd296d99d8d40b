//! Operating parameters handed over by the GPU profiler
//!
//! The profiler writes a small `key=value` file before launching the
//! application. Three keys are required:
//!
//! ```text
//! TimeOut=True
//! PerfMarkerTempFileBaseName=/tmp/session/markers_
//! PerfMarkerOutputFileName=/tmp/session/app.amdtperfmarker
//! ```
//!
//! `TimeOut=True` selects disk-backed marker streams: the profiler may kill
//! the application on a timeout, so markers are written to per-thread
//! temporary files instead of being held in memory.

use crate::domain::{ParamsError, Tid};
use perfmarker_common::PERFMARKER_EXT;
use std::fs;
use std::path::{Path, PathBuf};

const KEY_TIMEOUT: &str = "TimeOut";
const KEY_TEMP_FILE_BASE: &str = "PerfMarkerTempFileBaseName";
const KEY_OUTPUT_FILE: &str = "PerfMarkerOutputFileName";

/// Parameters required before any marker can be recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerParams {
    /// Record into per-thread temporary files instead of memory
    pub timeout_mode: bool,
    /// Path prefix for per-thread temporary files
    pub temp_file_base: PathBuf,
    /// Consolidated output written at finalize
    pub output_file: PathBuf,
}

impl LoggerParams {
    /// Parse the profiler's `key=value` parameter text
    ///
    /// Lines are split at the first `=`. Unknown keys and lines without `=`
    /// are ignored. `TimeOut` is only true for the exact value `True`.
    ///
    /// # Errors
    /// Returns [`ParamsError::MissingKeys`] unless all three keys are present.
    pub fn parse(text: &str) -> Result<Self, ParamsError> {
        let mut timeout_mode = None;
        let mut temp_file_base = None;
        let mut output_file = None;

        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };

            match key {
                KEY_TIMEOUT => timeout_mode = Some(value == "True"),
                KEY_TEMP_FILE_BASE => temp_file_base = Some(PathBuf::from(value)),
                KEY_OUTPUT_FILE => output_file = Some(PathBuf::from(value)),
                _ => {}
            }
        }

        match (timeout_mode, temp_file_base, output_file) {
            (Some(timeout_mode), Some(temp_file_base), Some(output_file)) => {
                Ok(Self { timeout_mode, temp_file_base, output_file })
            }
            (timeout_mode, temp_file_base, output_file) => {
                let mut missing = Vec::new();
                if timeout_mode.is_none() {
                    missing.push(KEY_TIMEOUT);
                }
                if temp_file_base.is_none() {
                    missing.push(KEY_TEMP_FILE_BASE);
                }
                if output_file.is_none() {
                    missing.push(KEY_OUTPUT_FILE);
                }
                Err(ParamsError::MissingKeys(missing))
            }
        }
    }

    /// Temporary file backing `tid`'s stream in timeout mode
    ///
    /// Format: `<temp_file_base><pid>_<tid>.amdtperfmarker`
    #[must_use]
    pub fn temp_file_for(&self, pid: u32, tid: Tid) -> PathBuf {
        let mut name = self.temp_file_base.clone().into_os_string();
        name.push(format!("{pid}_{tid}.{PERFMARKER_EXT}"));
        PathBuf::from(name)
    }
}

/// Where initialization obtains its [`LoggerParams`]
pub trait ParameterSource: Send + Sync {
    /// # Errors
    /// Returns an error if the parameters are unavailable or incomplete
    fn load(&self) -> Result<LoggerParams, ParamsError>;
}

/// Parameter file written by the GPU profiler
#[derive(Debug, Clone)]
pub struct ParamsFile {
    path: PathBuf,
}

impl ParamsFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The profiler's well-known location for this platform
    ///
    /// - Unix: `$HOME/.rcpdata.amdtperfmarker`
    /// - Windows: `%TEMP%\rcpdata.amdtperfmarker`
    ///
    /// # Errors
    /// Returns [`ParamsError::NoLocation`] if the base directory variable is unset
    pub fn default_location() -> Result<Self, ParamsError> {
        #[cfg(windows)]
        let (var, file_name) = ("TEMP", format!("rcpdata.{PERFMARKER_EXT}"));
        #[cfg(not(windows))]
        let (var, file_name) = ("HOME", format!(".rcpdata.{PERFMARKER_EXT}"));

        let dir = std::env::var_os(var).ok_or(ParamsError::NoLocation(var))?;
        Ok(Self::new(Path::new(&dir).join(file_name)))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ParameterSource for ParamsFile {
    fn load(&self) -> Result<LoggerParams, ParamsError> {
        let text = fs::read_to_string(&self.path)
            .map_err(|source| ParamsError::Read { path: self.path.clone(), source })?;
        LoggerParams::parse(&text)
    }
}

/// Fixed parameters, for embedding without a profiler-written file
#[derive(Debug, Clone)]
pub struct StaticParams(pub LoggerParams);

impl ParameterSource for StaticParams {
    fn load(&self) -> Result<LoggerParams, ParamsError> {
        Ok(self.0.clone())
    }
}

/// Deferred lookup of the default [`ParamsFile`], resolved at initialize time
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultParamsFile;

impl ParameterSource for DefaultParamsFile {
    fn load(&self) -> Result<LoggerParams, ParamsError> {
        ParamsFile::default_location()?.load()
    }
}
