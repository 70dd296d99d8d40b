//! # Marker Recording
//!
//! Begin/end semantics on top of the per-thread stream registry.
//!
//! ## Components
//!
//! - [`encoding`]: text layout of Begin/End records (column or separator form)
//! - [`stream`]: one thread's records plus its open-marker depth
//! - [`registry`]: thread id → stream, created lazily
//! - [`finalizer`]: drains every stream into the consolidated output file
//!
//! The functions here assume the caller holds the logger lock and has already
//! checked the lifecycle state; see [`crate::logger::ActivityLogger`].
//!
//! ## Nesting
//!
//! Each begin increments the thread's depth and each end decrements it. An end
//! that would take depth below zero is rejected with
//! [`MarkerError::UnbalancedMarker`] and writes nothing. Depth left open at
//! finalize is reported as a warning only.

pub mod encoding;
pub mod finalizer;
pub mod registry;
pub mod stream;

pub use encoding::{escape_whitespace, unescape_whitespace, EncodedEvent};
pub use finalizer::{write_consolidated, FinalizeSummary};
pub use registry::{StorageMode, StreamRegistry};
pub use stream::MarkerStream;

use crate::clock::Clock;
use crate::domain::{MarkerError, Tid};
use perfmarker_common::DEFAULT_GROUP;

/// Group to record: the default when absent or empty
fn resolve_group(group: Option<&str>) -> &str {
    match group {
        Some(group) if !group.is_empty() => group,
        _ => DEFAULT_GROUP,
    }
}

/// Record a Begin event on `tid`'s stream and open one nesting level
///
/// A thread's stream is only kept once its first record is written.
///
/// # Errors
/// - [`MarkerError::NullMarkerName`] if `name` is `None` or empty
/// - [`MarkerError::StreamAllocation`] if the thread's stream cannot be created
/// - [`MarkerError::Io`] if the record cannot be written
pub fn begin_marker(
    registry: &mut StreamRegistry,
    clock: &dyn Clock,
    tid: Tid,
    name: Option<&str>,
    group: Option<&str>,
) -> Result<(), MarkerError> {
    let name = match name {
        Some(name) if !name.is_empty() => escape_whitespace(name),
        _ => return Err(MarkerError::NullMarkerName),
    };
    let group = escape_whitespace(resolve_group(group));

    let is_new = registry.get(tid).is_none();
    let stream = registry.get_or_create(tid)?;
    let line = EncodedEvent::Begin { name: &name, group: &group, timestamp: clock.now() }.to_line();
    if let Err(e) = stream.append(&line) {
        if is_new {
            registry.discard(tid);
        }
        return Err(e.into());
    }
    stream.open_marker();
    Ok(())
}

/// Record an End event on `tid`'s stream and close one nesting level
///
/// With an empty name and the default group the innermost marker is closed
/// as-is. Otherwise the name must be non-empty and replaces the name (and
/// group) given at begin.
///
/// # Errors
/// - [`MarkerError::NullMarkerName`] if `name` is `None`, or empty with a non-default group
/// - [`MarkerError::UnbalancedMarker`] if no marker is open on `tid`
/// - [`MarkerError::Io`] if the record cannot be written
pub fn end_marker(
    registry: &mut StreamRegistry,
    clock: &dyn Clock,
    tid: Tid,
    name: Option<&str>,
    group: Option<&str>,
) -> Result<(), MarkerError> {
    let name = name.ok_or(MarkerError::NullMarkerName)?;
    let group = resolve_group(group);

    let stream = match registry.get_mut(tid) {
        Some(stream) if stream.depth() > 0 => stream,
        _ => return Err(MarkerError::UnbalancedMarker(tid)),
    };

    let line = if name.is_empty() && group == DEFAULT_GROUP {
        EncodedEvent::End { timestamp: clock.now() }.to_line()
    } else if name.is_empty() {
        return Err(MarkerError::NullMarkerName);
    } else {
        let name = escape_whitespace(name);
        let group = escape_whitespace(group);
        EncodedEvent::EndNamed { name: &name, group: &group, timestamp: clock.now() }.to_line()
    };

    stream.append(&line)?;
    stream.close_marker();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timestamp;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct StepClock(AtomicU64);

    impl Clock for StepClock {
        fn now(&self) -> Timestamp {
            Timestamp(self.0.fetch_add(10, Ordering::Relaxed))
        }
    }

    fn setup() -> (StreamRegistry, StepClock) {
        (StreamRegistry::new(StorageMode::Memory), StepClock(AtomicU64::new(100)))
    }

    fn content(registry: &mut StreamRegistry) -> String {
        registry.drain().map(|s| s.into_content().unwrap()).collect()
    }

    #[test]
    fn test_begin_uses_default_group() {
        let (mut registry, clock) = setup();
        begin_marker(&mut registry, &clock, Tid(1), Some("Kernel Launch"), None).unwrap();
        begin_marker(&mut registry, &clock, Tid(1), Some("Copy"), Some("")).unwrap();
        assert_eq!(registry.get(Tid(1)).unwrap().depth(), 2);

        let text = content(&mut registry);
        let lines: Vec<Vec<&str>> = text.lines().map(|l| l.split_whitespace().collect()).collect();
        assert_eq!(lines[0], vec!["clBeginPerfMarker", "Kernel&nbsp;Launch", "100", "Default"]);
        assert_eq!(lines[1], vec!["clBeginPerfMarker", "Copy", "110", "Default"]);
    }

    #[test]
    fn test_group_spaces_are_escaped() {
        let (mut registry, clock) = setup();
        begin_marker(&mut registry, &clock, Tid(1), Some("a"), Some("My Group")).unwrap();
        assert!(content(&mut registry).trim_end().ends_with("My&nbsp;Group"));
    }

    #[test]
    fn test_null_name_creates_no_stream() {
        let (mut registry, clock) = setup();
        let result = begin_marker(&mut registry, &clock, Tid(1), None, Some("G"));
        assert!(matches!(result, Err(MarkerError::NullMarkerName)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_empty_name_creates_no_stream() {
        let (mut registry, clock) = setup();
        let result = begin_marker(&mut registry, &clock, Tid(1), Some(""), None);
        assert!(matches!(result, Err(MarkerError::NullMarkerName)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_whitespace_names_stay_one_record() {
        let (mut registry, clock) = setup();
        begin_marker(&mut registry, &clock, Tid(1), Some("a\nb"), Some("tab\tgroup")).unwrap();
        end_marker(&mut registry, &clock, Tid(1), Some("c\r\nd"), None).unwrap();
        assert_eq!(registry.get(Tid(1)).unwrap().records(), 2);

        let text = content(&mut registry);
        let lines: Vec<Vec<&str>> = text.lines().map(|l| l.split_whitespace().collect()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], vec!["clBeginPerfMarker", "a&#10;b", "100", "tab&#9;group"]);
        assert_eq!(lines[1], vec!["clEndPerfMarkerEx", "110", "c&#13;&#10;d", "Default"]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_first_write_discards_stream() {
        use crate::params::LoggerParams;

        let dir = tempfile::tempdir().unwrap();
        let params = LoggerParams {
            timeout_mode: true,
            temp_file_base: dir.path().join("pm_"),
            output_file: dir.path().join("out.txt"),
        };
        // Every write to /dev/full fails with ENOSPC
        let path = params.temp_file_for(1, Tid(7));
        std::os::unix::fs::symlink("/dev/full", &path).unwrap();

        let mut registry = StreamRegistry::new(StorageMode::TempFiles { params, pid: 1 });
        let clock = StepClock(AtomicU64::new(100));

        let result = begin_marker(&mut registry, &clock, Tid(7), Some("a"), None);
        assert!(matches!(result, Err(MarkerError::Io(_))));
        assert!(registry.is_empty());
        assert!(std::fs::symlink_metadata(&path).is_err());
    }

    #[test]
    fn test_end_without_begin_is_unbalanced() {
        let (mut registry, clock) = setup();
        let result = end_marker(&mut registry, &clock, Tid(5), Some(""), Some(""));
        assert!(matches!(result, Err(MarkerError::UnbalancedMarker(Tid(5)))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_extra_end_writes_nothing() {
        let (mut registry, clock) = setup();
        begin_marker(&mut registry, &clock, Tid(1), Some("a"), None).unwrap();
        end_marker(&mut registry, &clock, Tid(1), Some(""), None).unwrap();
        let result = end_marker(&mut registry, &clock, Tid(1), Some(""), None);
        assert!(matches!(result, Err(MarkerError::UnbalancedMarker(_))));

        let stream = registry.get(Tid(1)).unwrap();
        assert_eq!(stream.records(), 2);
        assert_eq!(stream.depth(), 0);
    }

    #[test]
    fn test_empty_name_with_group_is_rejected() {
        let (mut registry, clock) = setup();
        begin_marker(&mut registry, &clock, Tid(1), Some("a"), Some("G")).unwrap();
        let result = end_marker(&mut registry, &clock, Tid(1), Some(""), Some("G"));
        assert!(matches!(result, Err(MarkerError::NullMarkerName)));

        let stream = registry.get(Tid(1)).unwrap();
        assert_eq!(stream.depth(), 1);
        assert_eq!(stream.records(), 1);
    }

    #[test]
    fn test_explicit_default_group_closes_unnamed() {
        let (mut registry, clock) = setup();
        begin_marker(&mut registry, &clock, Tid(1), Some("a"), None).unwrap();
        end_marker(&mut registry, &clock, Tid(1), Some(""), Some(DEFAULT_GROUP)).unwrap();

        let text = content(&mut registry);
        let last: Vec<&str> = text.lines().last().unwrap().split_whitespace().collect();
        assert_eq!(last, vec!["clEndPerfMarker", "110"]);
    }

    #[test]
    fn test_named_end_renames() {
        let (mut registry, clock) = setup();
        begin_marker(&mut registry, &clock, Tid(1), Some("a"), None).unwrap();
        end_marker(&mut registry, &clock, Tid(1), Some("Sub Op"), None).unwrap();

        let text = content(&mut registry);
        let last: Vec<&str> = text.lines().last().unwrap().split_whitespace().collect();
        assert_eq!(last, vec!["clEndPerfMarkerEx", "110", "Sub&nbsp;Op", "Default"]);
    }

    #[test]
    fn test_threads_have_independent_depth() {
        let (mut registry, clock) = setup();
        begin_marker(&mut registry, &clock, Tid(1), Some("a"), None).unwrap();
        let result = end_marker(&mut registry, &clock, Tid(2), Some(""), None);
        assert!(matches!(result, Err(MarkerError::UnbalancedMarker(Tid(2)))));
        assert_eq!(registry.get(Tid(1)).unwrap().depth(), 1);
    }
}
