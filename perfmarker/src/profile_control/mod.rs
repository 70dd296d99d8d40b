//! # Stop/resume profiling
//!
//! Forwards profiling control requests to whichever profiler agents are loaded
//! in the process. The mode bits select the agents:
//!
//! ```text
//! TRACE         -> CLTraceAgent, HSATraceAgent
//! PERF_COUNTER  -> CLProfileAgent, HSAProfileAgent
//! (any GPU bit) -> CLOccupancyAgent, always, with the mode
//! CPU           -> CPU agents only; GPU agents are not touched
//! ```
//!
//! A request succeeds if at least one agent entry point was called.

pub mod agents;

pub use agents::{library_names, LoadedLibraryAgent};

use crate::domain::{MarkerError, ProfilingMode};
use log::{debug, info};

/// Which mode bit an agent answers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    Trace,
    PerfCounter,
    /// Called on every GPU request; receives the mode itself
    Occupancy,
    Cpu,
}

impl AgentRole {
    fn selected_by(self, mode: ProfilingMode) -> bool {
        match self {
            Self::Trace => mode.contains(ProfilingMode::TRACE),
            Self::PerfCounter => mode.contains(ProfilingMode::PERF_COUNTER),
            Self::Occupancy => true,
            Self::Cpu => mode.contains(ProfilingMode::CPU),
        }
    }
}

/// A profiler component that can be paused and resumed
pub trait ProfilerAgent: Send {
    fn name(&self) -> &str;

    fn role(&self) -> AgentRole;

    /// Returns `true` if the agent's stop entry point was called
    fn stop(&mut self, mode: ProfilingMode) -> bool;

    /// Returns `true` if the agent's resume entry point was called
    fn resume(&mut self, mode: ProfilingMode) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Stop,
    Resume,
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Resume => write!(f, "resume"),
        }
    }
}

/// Dispatches stop/resume requests to GPU and CPU agents
pub struct ProfileControl {
    gpu_agents: Vec<Box<dyn ProfilerAgent>>,
    cpu_agents: Vec<Box<dyn ProfilerAgent>>,
}

impl std::fmt::Debug for ProfileControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |agents: &[Box<dyn ProfilerAgent>]| {
            agents.iter().map(|a| a.name().to_string()).collect::<Vec<_>>()
        };
        f.debug_struct("ProfileControl")
            .field("gpu_agents", &names(&self.gpu_agents))
            .field("cpu_agents", &names(&self.cpu_agents))
            .finish()
    }
}

impl Default for ProfileControl {
    /// The GPU profiler agents looked up among loaded libraries; no CPU agent
    fn default() -> Self {
        Self::new(LoadedLibraryAgent::gpu_profiler_agents(), Vec::new())
    }
}

impl ProfileControl {
    #[must_use]
    pub fn new(gpu_agents: Vec<Box<dyn ProfilerAgent>>, cpu_agents: Vec<Box<dyn ProfilerAgent>>) -> Self {
        Self { gpu_agents, cpu_agents }
    }

    /// Pause data collection for the profilers selected by `mode`
    ///
    /// # Errors
    /// Returns [`MarkerError::FailedToAttach`] if no selected agent is loaded
    pub fn stop(&mut self, mode: ProfilingMode) -> Result<(), MarkerError> {
        self.dispatch(Request::Stop, mode)
    }

    /// Resume data collection for the profilers selected by `mode`
    ///
    /// # Errors
    /// Returns [`MarkerError::FailedToAttach`] if no selected agent is loaded
    pub fn resume(&mut self, mode: ProfilingMode) -> Result<(), MarkerError> {
        self.dispatch(Request::Resume, mode)
    }

    /// Pause the CPU profiler
    ///
    /// # Errors
    /// Returns [`MarkerError::FailedToAttach`] if no CPU agent is loaded
    pub fn stop_ex(&mut self) -> Result<(), MarkerError> {
        self.stop(ProfilingMode::CPU)
    }

    /// Resume the CPU profiler
    ///
    /// # Errors
    /// Returns [`MarkerError::FailedToAttach`] if no CPU agent is loaded
    pub fn resume_ex(&mut self) -> Result<(), MarkerError> {
        self.resume(ProfilingMode::CPU)
    }

    fn dispatch(&mut self, request: Request, mode: ProfilingMode) -> Result<(), MarkerError> {
        let agents = if mode.contains(ProfilingMode::CPU) {
            &mut self.cpu_agents
        } else {
            &mut self.gpu_agents
        };

        let mut called = false;
        for agent in agents.iter_mut().filter(|agent| agent.role().selected_by(mode)) {
            let hit = match request {
                Request::Stop => agent.stop(mode),
                Request::Resume => agent.resume(mode),
            };
            if hit {
                debug!("Sent {request} ({mode}) to {}", agent.name());
            }
            called |= hit;
        }

        if called {
            info!("Profiling {request} requested ({mode})");
            Ok(())
        } else {
            Err(MarkerError::FailedToAttach(mode))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type CallLog = Arc<Mutex<Vec<String>>>;

    struct FakeAgent {
        name: &'static str,
        role: AgentRole,
        loaded: bool,
        calls: CallLog,
    }

    impl FakeAgent {
        fn boxed(name: &'static str, role: AgentRole, loaded: bool, calls: &CallLog) -> Box<dyn ProfilerAgent> {
            Box::new(Self { name, role, loaded, calls: Arc::clone(calls) })
        }

        fn record(&self, what: &str, mode: ProfilingMode) -> bool {
            if self.loaded {
                self.calls.lock().unwrap().push(format!("{}:{what}:{}", self.name, mode.bits()));
            }
            self.loaded
        }
    }

    impl ProfilerAgent for FakeAgent {
        fn name(&self) -> &str {
            self.name
        }

        fn role(&self) -> AgentRole {
            self.role
        }

        fn stop(&mut self, mode: ProfilingMode) -> bool {
            self.record("stop", mode)
        }

        fn resume(&mut self, mode: ProfilingMode) -> bool {
            self.record("resume", mode)
        }
    }

    fn control(loaded: &[&str], calls: &CallLog) -> ProfileControl {
        let gpu = [
            ("cl_trace", AgentRole::Trace),
            ("hsa_trace", AgentRole::Trace),
            ("cl_profile", AgentRole::PerfCounter),
            ("hsa_profile", AgentRole::PerfCounter),
            ("occupancy", AgentRole::Occupancy),
        ]
        .into_iter()
        .map(|(name, role)| FakeAgent::boxed(name, role, loaded.contains(&name), calls))
        .collect();
        let cpu = vec![FakeAgent::boxed("cpu", AgentRole::Cpu, loaded.contains(&"cpu"), calls)];
        ProfileControl::new(gpu, cpu)
    }

    #[test]
    fn test_trace_mode_selects_trace_and_occupancy() {
        let calls = CallLog::default();
        let mut control = control(&["cl_trace", "cl_profile", "occupancy"], &calls);

        control.stop(ProfilingMode::TRACE).unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["cl_trace:stop:1", "occupancy:stop:1"]);
    }

    #[test]
    fn test_all_gpu_modes() {
        let calls = CallLog::default();
        let mut control = control(&["cl_trace", "hsa_profile"], &calls);

        control.resume(ProfilingMode::TRACE | ProfilingMode::PERF_COUNTER).unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["cl_trace:resume:3", "hsa_profile:resume:3"]);
    }

    #[test]
    fn test_perf_counter_success_does_not_hide_trace() {
        let calls = CallLog::default();
        let mut control = control(&["cl_trace"], &calls);

        // Trace agent answers, counter agents are absent: still a success
        assert!(control.stop(ProfilingMode::TRACE | ProfilingMode::PERF_COUNTER).is_ok());
    }

    #[test]
    fn test_no_agent_loaded() {
        let calls = CallLog::default();
        let mut control = control(&[], &calls);

        let err = control.stop(ProfilingMode::TRACE).unwrap_err();
        assert!(matches!(err, MarkerError::FailedToAttach(mode) if mode == ProfilingMode::TRACE));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cpu_mode_skips_gpu_agents() {
        let calls = CallLog::default();
        let mut control = control(&["cl_trace", "occupancy", "cpu"], &calls);

        control.stop(ProfilingMode::CPU | ProfilingMode::TRACE).unwrap();
        control.resume_ex().unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["cpu:stop:5", "cpu:resume:4"]);
    }

    #[test]
    fn test_cpu_mode_without_cpu_agent() {
        let calls = CallLog::default();
        let mut control = control(&["cl_trace"], &calls);
        assert!(control.stop_ex().is_err());
    }

    #[test]
    fn test_default_agents_not_loaded() {
        let mut control = ProfileControl::default();
        assert!(control.stop(ProfilingMode::ALL).is_err());
        assert!(control.resume_ex().is_err());
    }
}
