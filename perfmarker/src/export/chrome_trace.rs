use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::io::Write;

use crate::trace_data::{MarkerKind, PerfMarkerOutput};

/// Chrome Trace Event format
/// Spec: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU/preview
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChromeTraceEvent {
    /// Marker name
    name: String,
    /// Marker group
    cat: String,
    /// Phase: "B" = begin, "E" = end, "M" = metadata
    ph: String,
    /// Timestamp in microseconds
    ts: f64,
    /// Process ID
    pid: u32,
    /// Thread ID
    tid: u64,
    /// Optional arguments (metadata)
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<HashMap<String, JsonValue>>,
}

/// Chrome Trace Format container
#[derive(Debug, Serialize)]
struct ChromeTrace {
    #[serde(rename = "traceEvents")]
    trace_events: Vec<ChromeTraceEvent>,
    #[serde(rename = "displayTimeUnit")]
    display_time_unit: String,
}

/// Converts consolidated perf-marker output into a Chrome trace
///
/// Begin records become `B` events and both end forms become `E` events; a
/// named end keeps its replacement name in `args.renamed_to`. Timestamps are
/// relative to the earliest marker in the file.
pub struct ChromeTraceExporter {
    events: Vec<ChromeTraceEvent>,
    pid: u32,
}

impl ChromeTraceExporter {
    /// Build the event list for every thread block in `output`
    #[must_use]
    pub fn from_output(output: &PerfMarkerOutput, pid: u32) -> Self {
        let start_ns = output
            .threads
            .iter()
            .flat_map(|block| block.records.iter())
            .map(|record| record.timestamp)
            .min();

        let mut events = Vec::with_capacity(output.record_count() + output.threads.len());

        for block in &output.threads {
            let tid = block.tid.0;

            let mut args = HashMap::new();
            args.insert("name".to_string(), serde_json::json!(format!("Thread {tid}")));
            events.push(ChromeTraceEvent {
                name: "thread_name".to_string(),
                cat: String::new(),
                ph: "M".to_string(), // Metadata
                ts: 0.0,
                pid,
                tid,
                args: Some(args),
            });

            // Begin names, so unnamed ends can carry the name they close
            let mut open: Vec<(String, String)> = Vec::new();

            for record in &block.records {
                let ts = start_ns.map_or(0.0, |start| {
                    record.timestamp.as_micros_f64() - start.as_micros_f64()
                });

                let event = match record.kind {
                    MarkerKind::Begin => {
                        open.push((record.name.clone(), record.group.clone()));
                        ChromeTraceEvent {
                            name: record.name.clone(),
                            cat: record.group.clone(),
                            ph: "B".to_string(), // Begin
                            ts,
                            pid,
                            tid,
                            args: None,
                        }
                    }
                    MarkerKind::End => {
                        let (name, cat) = open.pop().unwrap_or_default();
                        ChromeTraceEvent { name, cat, ph: "E".to_string(), ts, pid, tid, args: None }
                    }
                    MarkerKind::EndEx => {
                        let (name, cat) = open.pop().unwrap_or_default();
                        let mut args = HashMap::new();
                        args.insert("renamed_to".to_string(), serde_json::json!(record.name));
                        args.insert("renamed_group".to_string(), serde_json::json!(record.group));
                        ChromeTraceEvent { name, cat, ph: "E".to_string(), ts, pid, tid, args: Some(args) }
                    }
                };
                events.push(event);
            }
        }

        Self { events, pid }
    }

    /// Export the trace to any writer (file, stdout, buffer, etc.)
    ///
    /// # Example
    /// ```
    /// use perfmarker::export::ChromeTraceExporter;
    /// use perfmarker::trace_data::PerfMarkerOutput;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let text = "=====Perfmarker Output=====\n7\n2\nclBeginPerfMarker a 100 Default\nclEndPerfMarker 300\n";
    /// let output = PerfMarkerOutput::from_reader(text.as_bytes())?;
    ///
    /// let mut buffer = Vec::new();
    /// ChromeTraceExporter::from_output(&output, 1).export(&mut buffer)?;
    /// # Ok(())
    /// # }
    /// # example().unwrap();
    /// ```
    ///
    /// # Errors
    /// Returns an error if serialization or writing fails
    pub fn export<W: Write>(&self, writer: W) -> Result<()> {
        let trace = ChromeTrace {
            trace_events: self.events.clone(),
            display_time_unit: "ms".to_string(),
        };

        serde_json::to_writer_pretty(writer, &trace).context("Failed to write trace JSON")?;

        Ok(())
    }

    /// Number of events, including thread-name metadata
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }
}
