//! Consolidated perf-marker output
//!
//! Drains every stream into one file the timeline viewer reads:
//!
//! ```text
//! =====Perfmarker Output=====
//! <tid>
//! <record count>
//! <record count lines>
//! <tid>
//! ...
//! ```
//!
//! Only failing to create the output file aborts. Everything after that
//! (unbalanced depth, unreadable temp files, write errors) is logged and the
//! drain carries on, so every stream is released exactly once.

use super::registry::StreamRegistry;
use crate::domain::{MarkerError, Tid};
use log::warn;
use perfmarker_common::PERFMARKER_HEADER;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// What a successful finalize wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeSummary {
    /// Thread blocks written
    pub threads: usize,
    /// Records written across all blocks
    pub records: usize,
    /// Threads that still had open markers
    pub unbalanced: Vec<Tid>,
}

/// Write all streams to `path` and empty the registry
///
/// On error the registry is left untouched so the caller can retry.
///
/// # Errors
/// Returns [`MarkerError::OpenOutputFile`] if `path` cannot be created
pub fn write_consolidated(
    path: &Path,
    registry: &mut StreamRegistry,
) -> Result<FinalizeSummary, MarkerError> {
    let file = File::create(path)
        .map_err(|source| MarkerError::OpenOutputFile { path: path.to_path_buf(), source })?;
    let mut out = BufWriter::new(file);
    let mut summary = FinalizeSummary::default();

    if let Err(e) = writeln!(out, "{PERFMARKER_HEADER}") {
        warn!("Failed to write perf-marker header to {}: {e}", path.display());
    }

    for stream in registry.drain() {
        let tid = stream.tid();

        if stream.depth() != 0 {
            warn!("[Thread {tid}] Unbalanced PerfMarker detected.");
            summary.unbalanced.push(tid);
        }

        let content = stream.into_content().unwrap_or_else(|e| {
            warn!("[Thread {tid}] Failed to read back marker stream: {e}");
            String::new()
        });
        let records = count_records(&content);

        if let Err(e) = write_block(&mut out, tid, records, &content) {
            warn!("[Thread {tid}] Failed to write marker block to {}: {e}", path.display());
        }

        summary.threads += 1;
        summary.records += records;
    }

    if let Err(e) = out.flush() {
        warn!("Failed to flush {}: {e}", path.display());
    }

    Ok(summary)
}

fn write_block<W: Write>(out: &mut W, tid: Tid, records: usize, content: &str) -> io::Result<()> {
    writeln!(out, "{tid}")?;
    writeln!(out, "{records}")?;
    out.write_all(content.as_bytes())
}

/// Newline-terminated records in a stream's content
fn count_records(content: &str) -> usize {
    content.bytes().filter(|&b| b == b'\n').count()
}
