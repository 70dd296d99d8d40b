use perfmarker::params::{LoggerParams, StaticParams};
use perfmarker::trace_data::{MarkerKind, PerfMarkerOutput};
use perfmarker::{ActivityLogger, ScopedMarker, Tid};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tempfile::tempdir;

const THREADS: usize = 8;
const MARKERS_PER_THREAD: usize = 50;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn logger(dir: &Path, timeout_mode: bool) -> ActivityLogger {
    ActivityLogger::builder()
        .environment(HashMap::from([("CL_AGENT".to_string(), "CLTraceAgent".to_string())]))
        .params(StaticParams(LoggerParams {
            timeout_mode,
            temp_file_base: dir.join("stream_"),
            output_file: dir.join("concurrent.amdtperfmarker"),
        }))
        .build()
}

/// Each worker nests two markers per iteration, tagging names with its index
fn record_from_threads(logger: &ActivityLogger) -> Vec<Tid> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|worker| {
                scope.spawn(move || {
                    for i in 0..MARKERS_PER_THREAD {
                        let _outer = ScopedMarker::new(logger, &format!("w{worker}-outer{i}"), None);
                        logger
                            .begin_marker(Some(&format!("w{worker}-inner{i}")), Some("Work"), None)
                            .expect("begin");
                        logger.end_marker().expect("end");
                    }
                    Tid::current()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("worker panicked")).collect()
    })
}

fn assert_isolated_blocks(output: &PerfMarkerOutput, tids: &[Tid]) {
    assert_eq!(output.threads.len(), THREADS);
    let written: HashSet<Tid> = output.threads.iter().map(|b| b.tid).collect();
    assert_eq!(written, tids.iter().copied().collect());

    for block in &output.threads {
        assert_eq!(block.records.len(), MARKERS_PER_THREAD * 4);
        assert!(block.is_balanced());
        assert_eq!(block.max_depth(), 2);

        // All names in a block come from the same worker
        let workers: HashSet<&str> = block
            .records
            .iter()
            .filter(|r| r.kind == MarkerKind::Begin)
            .map(|r| r.name.split('-').next().unwrap_or_default())
            .collect();
        assert_eq!(workers.len(), 1, "thread {} mixes workers {workers:?}", block.tid);

        let timestamps: Vec<_> = block.records.iter().map(|r| r.timestamp).collect();
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
    }
}

#[test]
fn test_threads_write_isolated_streams() {
    init_logging();
    let dir = tempdir().unwrap();
    let logger = logger(dir.path(), false);
    logger.initialize().unwrap();

    let tids = record_from_threads(&logger);

    let summary = logger.finalize().unwrap().unwrap();
    assert_eq!(summary.threads, THREADS);
    assert_eq!(summary.records, THREADS * MARKERS_PER_THREAD * 4);
    assert!(summary.unbalanced.is_empty());

    let output = PerfMarkerOutput::from_file(dir.path().join("concurrent.amdtperfmarker")).unwrap();
    assert_isolated_blocks(&output, &tids);

    // Blocks are written in thread id order
    let order: Vec<Tid> = output.threads.iter().map(|b| b.tid).collect();
    let mut sorted = order.clone();
    sorted.sort();
    assert_eq!(order, sorted);
}

#[test]
fn test_threads_with_temp_file_streams() {
    init_logging();
    let dir = tempdir().unwrap();
    let logger = logger(dir.path(), true);
    logger.initialize().unwrap();

    let tids = record_from_threads(&logger);
    logger.finalize().unwrap();

    let output = PerfMarkerOutput::from_file(dir.path().join("concurrent.amdtperfmarker")).unwrap();
    assert_isolated_blocks(&output, &tids);

    // Only the consolidated file remains
    let remaining: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(remaining.len(), 1);
}

#[test]
fn test_unbalanced_end_on_other_thread_is_rejected() {
    let dir = tempdir().unwrap();
    let logger = logger(dir.path(), false);
    logger.initialize().unwrap();

    logger.begin_marker(Some("main"), None, None).unwrap();
    std::thread::scope(|scope| {
        scope.spawn(|| {
            let err = logger.end_marker().unwrap_err();
            assert!(matches!(err, perfmarker::MarkerError::UnbalancedMarker(_)));
        });
    });
    assert_eq!(logger.depth_of(Tid::current()), Some(1));
}
