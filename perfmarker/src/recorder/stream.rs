//! Per-thread marker stream
//!
//! A stream is an append-only sequence of encoded records plus the count of
//! markers currently open on its thread. Storage is chosen once per process:
//! an in-memory buffer, or a temporary file that survives the application
//! being killed by the profiler's timeout.

use crate::domain::Tid;
use log::warn;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Debug)]
enum Storage {
    Memory(String),
    /// Records are written through unbuffered so a killed process loses nothing
    TempFile { path: PathBuf, file: File },
}

/// One thread's recorded markers
#[derive(Debug)]
pub struct MarkerStream {
    tid: Tid,
    storage: Storage,
    depth: u32,
    records: usize,
}

impl MarkerStream {
    /// Stream buffered in memory until finalize
    #[must_use]
    pub fn in_memory(tid: Tid) -> Self {
        Self { tid, storage: Storage::Memory(String::new()), depth: 0, records: 0 }
    }

    /// Stream backed by a freshly truncated temporary file
    ///
    /// # Errors
    /// Returns an error if the file cannot be created
    pub fn temp_file(tid: Tid, path: PathBuf) -> io::Result<Self> {
        let file = File::create(&path)?;
        Ok(Self { tid, storage: Storage::TempFile { path, file }, depth: 0, records: 0 })
    }

    #[must_use]
    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// Number of markers begun but not yet ended
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of records appended so far
    #[must_use]
    pub fn records(&self) -> usize {
        self.records
    }

    #[must_use]
    pub fn is_disk_backed(&self) -> bool {
        matches!(self.storage, Storage::TempFile { .. })
    }

    /// Append one newline-terminated record
    ///
    /// # Errors
    /// Returns an error if the temporary file cannot be written
    pub fn append(&mut self, record: &str) -> io::Result<()> {
        debug_assert!(record.ends_with('\n'));
        match &mut self.storage {
            Storage::Memory(buffer) => buffer.push_str(record),
            Storage::TempFile { file, .. } => file.write_all(record.as_bytes())?,
        }
        self.records += 1;
        Ok(())
    }

    pub(crate) fn open_marker(&mut self) {
        self.depth += 1;
    }

    /// Returns false, leaving depth untouched, if no marker is open
    pub(crate) fn close_marker(&mut self) -> bool {
        match self.depth.checked_sub(1) {
            Some(depth) => {
                self.depth = depth;
                true
            }
            None => false,
        }
    }

    /// Consume the stream and return everything it recorded
    ///
    /// A disk-backed stream closes its file before reading it back and
    /// deletes it afterwards. Failure to delete is only logged.
    ///
    /// # Errors
    /// Returns an error if the temporary file cannot be read back
    pub fn into_content(self) -> io::Result<String> {
        match self.storage {
            Storage::Memory(buffer) => Ok(buffer),
            Storage::TempFile { path, mut file } => {
                file.flush()?;
                drop(file);
                let content = fs::read_to_string(&path)?;
                if let Err(e) = fs::remove_file(&path) {
                    warn!("Failed to delete marker temp file {}: {e}", path.display());
                }
                Ok(content)
            }
        }
    }

    /// Release the stream without reading it, deleting a temp file
    pub fn discard(self) {
        if let Storage::TempFile { path, file } = self.storage {
            drop(file);
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to delete marker temp file {}: {e}", path.display());
            }
        }
    }
}
