//! Consolidated perf-marker file reader
//!
//! Parses the file written at finalize back into per-thread marker records,
//! the same way the timeline viewer consumes it: check the header, then read
//! `<tid>`, `<count>` and exactly `count` records per block.

use crate::domain::{Tid, Timestamp};
use crate::recorder::unescape_whitespace;
use anyhow::{bail, Context, Result};
use perfmarker_common::{DEFAULT_GROUP, PERFMARKER_HEADER, TAG_BEGIN, TAG_END, TAG_END_EX};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Kind of marker record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Begin,
    /// Unnamed end: closes the innermost marker
    End,
    /// Named end: closes and renames the innermost marker
    EndEx,
}

/// One decoded record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerRecord {
    pub kind: MarkerKind,
    /// Unescaped name; empty for [`MarkerKind::End`]
    pub name: String,
    /// Unescaped group; the default group for [`MarkerKind::End`]
    pub group: String,
    pub timestamp: Timestamp,
}

impl MarkerRecord {
    /// Decode one encoded line
    ///
    /// # Errors
    /// Returns an error for an unknown tag, a wrong field count or a bad timestamp
    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let parse_ts = |s: &str| -> Result<Timestamp> {
            s.parse::<u64>().map(Timestamp).with_context(|| format!("Invalid timestamp {s:?}"))
        };

        match fields.as_slice() {
            [tag, name, ts, group] if *tag == TAG_BEGIN => Ok(Self {
                kind: MarkerKind::Begin,
                name: unescape_whitespace(name),
                group: unescape_whitespace(group),
                timestamp: parse_ts(ts)?,
            }),
            [tag, ts] if *tag == TAG_END => Ok(Self {
                kind: MarkerKind::End,
                name: String::new(),
                group: DEFAULT_GROUP.to_string(),
                timestamp: parse_ts(ts)?,
            }),
            [tag, ts, name, group] if *tag == TAG_END_EX => Ok(Self {
                kind: MarkerKind::EndEx,
                name: unescape_whitespace(name),
                group: unescape_whitespace(group),
                timestamp: parse_ts(ts)?,
            }),
            _ => bail!("Malformed perf-marker record: {line:?}"),
        }
    }
}

/// All records of one thread, in recording order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadBlock {
    pub tid: Tid,
    pub records: Vec<MarkerRecord>,
}

impl ThreadBlock {
    /// Deepest nesting reached
    #[must_use]
    pub fn max_depth(&self) -> u32 {
        let mut depth = 0u32;
        let mut max = 0u32;
        for record in &self.records {
            match record.kind {
                MarkerKind::Begin => {
                    depth += 1;
                    max = max.max(depth);
                }
                MarkerKind::End | MarkerKind::EndEx => depth = depth.saturating_sub(1),
            }
        }
        max
    }

    /// Every end closes an earlier begin and nothing is left open
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        let mut depth = 0u32;
        for record in &self.records {
            match record.kind {
                MarkerKind::Begin => depth += 1,
                MarkerKind::End | MarkerKind::EndEx => match depth.checked_sub(1) {
                    Some(d) => depth = d,
                    None => return false,
                },
            }
        }
        depth == 0
    }
}

/// Parsed consolidated output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerfMarkerOutput {
    pub threads: Vec<ThreadBlock>,
}

impl PerfMarkerOutput {
    /// Parse a consolidated output file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is malformed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Parse consolidated output from any buffered reader
    ///
    /// # Errors
    /// Returns an error on a missing header, a short block or a bad record
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut lines = reader.lines();

        let header = lines.next().transpose().context("Failed to read header")?;
        if header.as_deref().map(str::trim_end) != Some(PERFMARKER_HEADER) {
            bail!("Missing {PERFMARKER_HEADER:?} header");
        }

        let mut threads = Vec::new();
        while let Some(tid_line) = lines.next() {
            let tid_line = tid_line.context("Failed to read thread id")?;
            if tid_line.trim().is_empty() {
                continue;
            }
            let tid = tid_line
                .trim()
                .parse::<u64>()
                .map(Tid)
                .with_context(|| format!("Invalid thread id {tid_line:?}"))?;

            let count_line =
                lines.next().with_context(|| format!("Thread {tid}: missing record count"))??;
            let count = count_line
                .trim()
                .parse::<usize>()
                .with_context(|| format!("Thread {tid}: invalid record count {count_line:?}"))?;

            let mut records = Vec::with_capacity(count);
            for i in 0..count {
                let line = lines
                    .next()
                    .with_context(|| format!("Thread {tid}: expected {count} records, found {i}"))??;
                records.push(
                    MarkerRecord::parse(&line).with_context(|| format!("Thread {tid}, record {i}"))?,
                );
            }

            threads.push(ThreadBlock { tid, records });
        }

        Ok(Self { threads })
    }

    #[must_use]
    pub fn thread(&self, tid: Tid) -> Option<&ThreadBlock> {
        self.threads.iter().find(|block| block.tid == tid)
    }

    #[must_use]
    pub fn record_count(&self) -> usize {
        self.threads.iter().map(|block| block.records.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::EncodedEvent;

    #[test]
    fn test_parse_encoded_records() {
        let line = EncodedEvent::Begin { name: "Kernel&nbsp;Launch", group: "Default", timestamp: Timestamp(10) }
            .to_line();
        let record = MarkerRecord::parse(&line).unwrap();
        assert_eq!(record.kind, MarkerKind::Begin);
        assert_eq!(record.name, "Kernel Launch");
        assert_eq!(record.timestamp, Timestamp(10));

        let record = MarkerRecord::parse(&EncodedEvent::End { timestamp: Timestamp(11) }.to_line()).unwrap();
        assert_eq!(record.kind, MarkerKind::End);
        assert!(record.name.is_empty());
    }

    #[test]
    fn test_parse_rejects_unknown_tag() {
        assert!(MarkerRecord::parse("clSomethingElse 1 2 3").is_err());
        assert!(MarkerRecord::parse("clEndPerfMarker notanumber").is_err());
    }

    #[test]
    fn test_reader_blocks() {
        let text = "=====Perfmarker Output=====\n\
                    12\n2\nclBeginPerfMarker a 1 Default\nclEndPerfMarker 2\n\
                    13\n0\n";
        let output = PerfMarkerOutput::from_reader(text.as_bytes()).unwrap();
        assert_eq!(output.threads.len(), 2);
        assert_eq!(output.thread(Tid(12)).unwrap().records.len(), 2);
        assert!(output.thread(Tid(12)).unwrap().is_balanced());
        assert!(output.thread(Tid(13)).unwrap().records.is_empty());
        assert_eq!(output.record_count(), 2);
    }

    #[test]
    fn test_reader_short_block_fails() {
        let text = "=====Perfmarker Output=====\n12\n3\nclEndPerfMarker 2\n";
        let err = PerfMarkerOutput::from_reader(text.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("expected 3 records"));
    }

    #[test]
    fn test_reader_requires_header() {
        assert!(PerfMarkerOutput::from_reader("12\n0\n".as_bytes()).is_err());
        assert!(PerfMarkerOutput::from_reader("".as_bytes()).is_err());
    }

    #[test]
    fn test_max_depth() {
        let begin = |ts| MarkerRecord {
            kind: MarkerKind::Begin,
            name: "a".into(),
            group: DEFAULT_GROUP.into(),
            timestamp: Timestamp(ts),
        };
        let end = |ts| MarkerRecord {
            kind: MarkerKind::End,
            name: String::new(),
            group: DEFAULT_GROUP.into(),
            timestamp: Timestamp(ts),
        };
        let block = ThreadBlock { tid: Tid(1), records: vec![begin(1), begin(2), end(3), begin(4), end(5)] };
        assert_eq!(block.max_depth(), 2);
        assert!(!block.is_balanced());
    }

    #[test]
    fn test_end_before_begin_is_unbalanced() {
        let record = |kind, ts| MarkerRecord {
            kind,
            name: String::new(),
            group: DEFAULT_GROUP.into(),
            timestamp: Timestamp(ts),
        };
        let block = ThreadBlock { tid: Tid(1), records: vec![record(MarkerKind::End, 1), record(MarkerKind::Begin, 2)] };
        assert!(!block.is_balanced());

        let block = ThreadBlock { tid: Tid(1), records: vec![record(MarkerKind::Begin, 1), record(MarkerKind::EndEx, 2)] };
        assert!(block.is_balanced());
        assert!(ThreadBlock { tid: Tid(2), records: Vec::new() }.is_balanced());
    }
}
