//! GPU profiler agents reached through already-loaded shared libraries
//!
//! The profiler injects its agents into the application. We never load an
//! agent ourselves: `dlopen` is called with `RTLD_NOLOAD`, so lookup only
//! succeeds if the agent is already mapped. Handles and entry points are
//! resolved on first use and cached.

#![allow(unsafe_code)] // dlopen()/dlsym() require unsafe

use super::{AgentRole, ProfilerAgent};
use crate::domain::ProfilingMode;
use log::debug;
use perfmarker_common::{
    CL_OCCUPANCY_AGENT, CL_PROFILE_AGENT, CL_TRACE_AGENT, HSA_PROFILE_AGENT, HSA_TRACE_AGENT,
};
use std::ffi::{c_void, CString};

const STOP_ENTRY_POINT: &str = "amdtCodeXLStopProfiling";
const RESUME_ENTRY_POINT: &str = "amdtCodeXLResumeProfiling";

const LIB_PREFIXES: [&str; 2] = ["RCP", "CodeXLGpuProfiler"];
/// Release, debug, internal and internal-debug builds, in lookup order
const BUILD_SUFFIXES: [&str; 4] = ["", "-d", "-Internal", "-d-Internal"];

#[cfg(target_pointer_width = "32")]
const PLATFORM_SUFFIX: &str = "32";
#[cfg(not(target_pointer_width = "32"))]
const PLATFORM_SUFFIX: &str = "";

#[cfg(windows)]
const LIB_AFFIXES: (&str, &str) = ("", ".dll");
#[cfg(not(windows))]
const LIB_AFFIXES: (&str, &str) = ("lib", ".so");

/// Every file name an agent library may have been built under
#[must_use]
pub fn library_names(base: &str) -> Vec<String> {
    let (lib_prefix, lib_suffix) = LIB_AFFIXES;
    BUILD_SUFFIXES
        .iter()
        .flat_map(|build| {
            LIB_PREFIXES.iter().map(move |prefix| {
                format!("{lib_prefix}{prefix}{base}{PLATFORM_SUFFIX}{build}{lib_suffix}")
            })
        })
        .collect()
}

/// `dlopen` handle of a library owned by the dynamic loader
#[derive(Debug, Clone, Copy)]
struct LibHandle(*mut c_void);

// SAFETY: a dlopen handle is a process-wide token, valid from any thread.
unsafe impl Send for LibHandle {}

type ControlProc = unsafe extern "C" fn();
type ControlProcWithMode = unsafe extern "C" fn(libc::c_int);

#[derive(Debug, Clone, Copy)]
enum EntryPoint {
    Plain(ControlProc),
    WithMode(ControlProcWithMode),
}

/// Agent library located by name among the process's loaded modules
#[derive(Debug)]
pub struct LoadedLibraryAgent {
    base_name: &'static str,
    role: AgentRole,
    handle: Option<LibHandle>,
    stop: Option<EntryPoint>,
    resume: Option<EntryPoint>,
}

impl LoadedLibraryAgent {
    #[must_use]
    pub fn new(base_name: &'static str, role: AgentRole) -> Self {
        Self { base_name, role, handle: None, stop: None, resume: None }
    }

    /// The five GPU profiler agents: CL/HSA trace, CL/HSA counters, CL occupancy
    #[must_use]
    pub fn gpu_profiler_agents() -> Vec<Box<dyn ProfilerAgent>> {
        vec![
            Box::new(Self::new(CL_TRACE_AGENT, AgentRole::Trace)),
            Box::new(Self::new(HSA_TRACE_AGENT, AgentRole::Trace)),
            Box::new(Self::new(CL_PROFILE_AGENT, AgentRole::PerfCounter)),
            Box::new(Self::new(HSA_PROFILE_AGENT, AgentRole::PerfCounter)),
            Box::new(Self::new(CL_OCCUPANCY_AGENT, AgentRole::Occupancy)),
        ]
    }

    fn handle(&mut self) -> Option<LibHandle> {
        if self.handle.is_none() {
            self.handle = library_names(self.base_name).iter().find_map(|name| find_loaded(name));
            if let Some(handle) = self.handle {
                debug!("Found loaded profiler agent {} ({:p})", self.base_name, handle.0);
            }
        }
        self.handle
    }

    fn entry_point(&mut self, resume: bool) -> Option<EntryPoint> {
        let cached = if resume { self.resume } else { self.stop };
        if cached.is_some() {
            return cached;
        }

        let handle = self.handle()?;
        let symbol = if resume { RESUME_ENTRY_POINT } else { STOP_ENTRY_POINT };
        let address = find_symbol(handle, symbol)?;

        // SAFETY: the agent exports these symbols with exactly these C signatures;
        // occupancy agents take the mode, all others take nothing.
        let entry = unsafe {
            if self.role == AgentRole::Occupancy {
                EntryPoint::WithMode(std::mem::transmute::<*mut c_void, ControlProcWithMode>(address))
            } else {
                EntryPoint::Plain(std::mem::transmute::<*mut c_void, ControlProc>(address))
            }
        };

        if resume {
            self.resume = Some(entry);
        } else {
            self.stop = Some(entry);
        }
        Some(entry)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn call(&mut self, resume: bool, mode: ProfilingMode) -> bool {
        let Some(entry) = self.entry_point(resume) else {
            return false;
        };
        // SAFETY: entry was resolved from a library the loader keeps mapped.
        unsafe {
            match entry {
                EntryPoint::Plain(proc_) => proc_(),
                EntryPoint::WithMode(proc_) => proc_(mode.bits() as libc::c_int),
            }
        }
        true
    }
}

impl ProfilerAgent for LoadedLibraryAgent {
    fn name(&self) -> &str {
        self.base_name
    }

    fn role(&self) -> AgentRole {
        self.role
    }

    fn stop(&mut self, mode: ProfilingMode) -> bool {
        self.call(false, mode)
    }

    fn resume(&mut self, mode: ProfilingMode) -> bool {
        self.call(true, mode)
    }
}

#[cfg(unix)]
fn find_loaded(name: &str) -> Option<LibHandle> {
    let name = CString::new(name).ok()?;
    // SAFETY: name is NUL terminated; RTLD_NOLOAD never maps a new library.
    let handle = unsafe { libc::dlopen(name.as_ptr(), libc::RTLD_NOLOAD | libc::RTLD_LAZY) };
    (!handle.is_null()).then_some(LibHandle(handle))
}

#[cfg(unix)]
fn find_symbol(handle: LibHandle, symbol: &str) -> Option<*mut c_void> {
    let symbol = CString::new(symbol).ok()?;
    // SAFETY: handle came from dlopen and symbol is NUL terminated.
    let address = unsafe { libc::dlsym(handle.0, symbol.as_ptr()) };
    (!address.is_null()).then_some(address)
}

#[cfg(not(unix))]
fn find_loaded(_name: &str) -> Option<LibHandle> {
    None
}

#[cfg(not(unix))]
fn find_symbol(_handle: LibHandle, _symbol: &str) -> Option<*mut c_void> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_name_lookup_order() {
        let names = library_names("CLTraceAgent");
        assert_eq!(names.len(), 8);
        #[cfg(all(unix, target_pointer_width = "64"))]
        {
            assert_eq!(names[0], "libRCPCLTraceAgent.so");
            assert_eq!(names[1], "libCodeXLGpuProfilerCLTraceAgent.so");
            assert_eq!(names[2], "libRCPCLTraceAgent-d.so");
            assert_eq!(names[7], "libCodeXLGpuProfilerCLTraceAgent-d-Internal.so");
        }
    }

    #[test]
    fn test_agent_not_loaded() {
        let mut agent = LoadedLibraryAgent::new(CL_TRACE_AGENT, AgentRole::Trace);
        assert!(!agent.stop(ProfilingMode::TRACE));
        assert!(!agent.resume(ProfilingMode::TRACE));
        assert_eq!(agent.name(), "CLTraceAgent");
    }

    #[test]
    fn test_gpu_agent_roles() {
        let agents = LoadedLibraryAgent::gpu_profiler_agents();
        assert_eq!(agents.len(), 5);
        assert_eq!(agents.iter().filter(|a| a.role() == AgentRole::Occupancy).count(), 1);
    }
}
