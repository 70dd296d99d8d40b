//! Pre-flight checks for the activity logger
//!
//! Markers are only meaningful while a GPU profiler agent is injected into the
//! process. The profiler announces its agents through environment variables,
//! so detection is a read of the process environment behind
//! [`EnvironmentProbe`], which tests replace with a fixed map.

use crate::domain::MarkerError;
use perfmarker_common::{CL_TRACE_AGENT, ENV_CL_AGENT, ENV_HSA_TOOLS_LIB, HSA_TRACE_AGENT};
use std::collections::HashMap;

/// Read access to environment variables
pub trait EnvironmentProbe: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl EnvironmentProbe for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvironmentProbe for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Check that a GPU profiler trace agent is attached
///
/// Passes when `CL_AGENT` names the OpenCL trace agent or `HSA_TOOLS_LIB`
/// names the HSA trace agent.
///
/// # Errors
/// Returns [`MarkerError::ProfilerNotDetected`] if neither agent is present
pub fn check_gpu_profiler(env: &dyn EnvironmentProbe) -> Result<(), MarkerError> {
    let names_agent = |key: &str, agent: &str| {
        env.var(key).is_some_and(|value| !value.is_empty() && value.contains(agent))
    };

    if names_agent(ENV_CL_AGENT, CL_TRACE_AGENT) || names_agent(ENV_HSA_TOOLS_LIB, HSA_TRACE_AGENT)
    {
        return Ok(());
    }

    Err(MarkerError::ProfilerNotDetected)
}
