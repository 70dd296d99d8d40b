//! Thread id → marker stream mapping
//!
//! The registry has no lock of its own: it lives inside the logger's single
//! mutex, which serializes lookup, insertion and the final drain.

use super::stream::MarkerStream;
use crate::domain::{MarkerError, Tid};
use crate::params::LoggerParams;
use log::debug;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Where new streams keep their records
#[derive(Debug, Clone)]
pub enum StorageMode {
    Memory,
    /// One temporary file per thread, named from the profiler's base path
    TempFiles { params: LoggerParams, pid: u32 },
}

impl StorageMode {
    /// Pick the mode the profiler asked for
    #[must_use]
    pub fn for_params(params: &LoggerParams) -> Self {
        if params.timeout_mode {
            StorageMode::TempFiles { params: params.clone(), pid: std::process::id() }
        } else {
            StorageMode::Memory
        }
    }
}

/// All live marker streams, at most one per thread
#[derive(Debug)]
pub struct StreamRegistry {
    mode: StorageMode,
    streams: BTreeMap<Tid, MarkerStream>,
}

impl StreamRegistry {
    #[must_use]
    pub fn new(mode: StorageMode) -> Self {
        Self { mode, streams: BTreeMap::new() }
    }

    /// Existing stream for `tid`, or a new one registered on first use
    ///
    /// The stream is only inserted once its storage exists.
    ///
    /// # Errors
    /// Returns [`MarkerError::StreamAllocation`] if the temporary file cannot be created
    pub fn get_or_create(&mut self, tid: Tid) -> Result<&mut MarkerStream, MarkerError> {
        match self.streams.entry(tid) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let stream = match &self.mode {
                    StorageMode::Memory => MarkerStream::in_memory(tid),
                    StorageMode::TempFiles { params, pid } => {
                        let path = params.temp_file_for(*pid, tid);
                        debug!("Creating marker temp file {} for thread {tid}", path.display());
                        MarkerStream::temp_file(tid, path)
                            .map_err(|source| MarkerError::StreamAllocation { tid, source })?
                    }
                };
                debug!("Registered marker stream for thread {tid}");
                Ok(entry.insert(stream))
            }
        }
    }

    /// Stream for `tid` if the thread has recorded anything
    pub fn get_mut(&mut self, tid: Tid) -> Option<&mut MarkerStream> {
        self.streams.get_mut(&tid)
    }

    #[must_use]
    pub fn get(&self, tid: Tid) -> Option<&MarkerStream> {
        self.streams.get(&tid)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Drop `tid`'s stream without consolidating it, deleting any temp file
    pub fn discard(&mut self, tid: Tid) {
        if let Some(stream) = self.streams.remove(&tid) {
            debug!("Discarding marker stream for thread {tid}");
            stream.discard();
        }
    }

    /// Remove every stream, in thread id order
    pub fn drain(&mut self) -> impl Iterator<Item = MarkerStream> {
        std::mem::take(&mut self.streams).into_values()
    }
}
