// crates/nimbus-core/src/observe.rs
// ============================================================================
// Module: Observability Sinks
// Description: Log and metric sink abstractions with stderr and test impls.
// Purpose: Provide metric events and log records without hard dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! This module exposes thin sink interfaces for structured logs and metrics.
//! It is intentionally dependency-light so deployments can plug in Prometheus
//! or OpenTelemetry without redesign: the stderr sink writes one JSON object
//! per line, the in-memory sinks capture events for tests and for the
//! Prometheus text exposition served by the metrics listener.
//! Labels are treated as untrusted and must not carry raw parameters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default latency buckets in milliseconds for tool-execution histograms.
pub const TOOL_LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000];

// ============================================================================
// SECTION: Log Levels
// ============================================================================

/// Severity levels for log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Fine-grained diagnostics.
    Debug,
    /// Routine operational records.
    Info,
    /// Unexpected but recoverable conditions.
    Warn,
    /// Failures that end an invocation.
    Error,
}

impl LogLevel {
    /// Returns a stable label for the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Parses a level name, defaulting to `Info` for unknown input.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "debug" | "trace" => Self::Debug,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }
}

// ============================================================================
// SECTION: Log Records
// ============================================================================

/// A single structured log record.
///
/// # Invariants
/// - `fields` carries only serializable metadata, never raw secrets.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    /// Record severity.
    pub level: LogLevel,
    /// Stable event label (for example `tool_started`).
    pub event: String,
    /// Wall-clock timestamp in milliseconds since the epoch.
    pub timestamp_ms: u128,
    /// Structured fields attached to the record.
    pub fields: BTreeMap<String, Value>,
}

impl LogRecord {
    /// Builds a record with the current timestamp.
    #[must_use]
    pub fn new(level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            level,
            event: event.into(),
            timestamp_ms: crate::context::epoch_millis(),
            fields: BTreeMap::new(),
        }
    }

    /// Attaches a structured field to the record.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// Structured log sink.
pub trait LogSink: Send + Sync {
    /// Records a structured log record.
    fn record(&self, record: &LogRecord);
}

/// Log sink that writes JSON lines to stderr, filtered by minimum level.
pub struct StderrLogSink {
    /// Minimum severity to emit.
    min_level: LogLevel,
}

impl StderrLogSink {
    /// Creates a stderr sink with the given minimum level.
    #[must_use]
    pub const fn new(min_level: LogLevel) -> Self {
        Self {
            min_level,
        }
    }
}

impl LogSink for StderrLogSink {
    fn record(&self, record: &LogRecord) {
        if record.level < self.min_level {
            return;
        }
        if let Ok(payload) = serde_json::to_string(record) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// No-op log sink.
pub struct NoopLogSink;

impl LogSink for NoopLogSink {
    fn record(&self, _record: &LogRecord) {}
}

/// In-memory log sink for test capture.
#[derive(Default)]
pub struct MemoryLogSink {
    /// Captured records in arrival order.
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogSink {
    /// Creates an empty capture sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the captured records.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().map(|records| records.clone()).unwrap_or_default()
    }

    /// Returns captured records matching the given event label.
    #[must_use]
    pub fn events(&self, event: &str) -> Vec<LogRecord> {
        self.records().into_iter().filter(|record| record.event == event).collect()
    }
}

impl LogSink for MemoryLogSink {
    fn record(&self, record: &LogRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

// ============================================================================
// SECTION: Metric Sink
// ============================================================================

/// Tags attached to metric observations.
pub type MetricTags = BTreeMap<String, String>;

/// Metrics sink for counters, gauges, histograms, and timings.
pub trait MetricsSink: Send + Sync {
    /// Increments a counter by `value`.
    fn counter(&self, name: &str, value: u64, tags: &MetricTags);
    /// Sets a gauge to `value`.
    fn gauge(&self, name: &str, value: f64, tags: &MetricTags);
    /// Records a histogram observation.
    fn histogram(&self, name: &str, value: f64, tags: &MetricTags);
    /// Records a duration observation.
    fn timing(&self, name: &str, value: Duration, tags: &MetricTags);
}

/// No-op metrics sink.
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn counter(&self, _name: &str, _value: u64, _tags: &MetricTags) {}

    fn gauge(&self, _name: &str, _value: f64, _tags: &MetricTags) {}

    fn histogram(&self, _name: &str, _value: f64, _tags: &MetricTags) {}

    fn timing(&self, _name: &str, _value: Duration, _tags: &MetricTags) {}
}

/// Metrics sink that forwards observations to a log sink as records.
pub struct LogMetrics {
    /// Downstream log sink.
    sink: Arc<dyn LogSink>,
}

impl LogMetrics {
    /// Creates a metrics sink backed by the given log sink.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
        }
    }

    /// Emits one metric record through the log sink.
    fn emit(&self, kind: &str, name: &str, value: Value, tags: &MetricTags) {
        let record = LogRecord::new(LogLevel::Debug, "metric")
            .field("kind", Value::from(kind))
            .field("name", Value::from(name))
            .field("value", value)
            .field("tags", serde_json::to_value(tags).unwrap_or(Value::Null));
        self.sink.record(&record);
    }
}

impl MetricsSink for LogMetrics {
    fn counter(&self, name: &str, value: u64, tags: &MetricTags) {
        self.emit("counter", name, Value::from(value), tags);
    }

    fn gauge(&self, name: &str, value: f64, tags: &MetricTags) {
        self.emit("gauge", name, Value::from(value), tags);
    }

    fn histogram(&self, name: &str, value: f64, tags: &MetricTags) {
        self.emit("histogram", name, Value::from(value), tags);
    }

    fn timing(&self, name: &str, value: Duration, tags: &MetricTags) {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        self.emit("timing", name, Value::from(millis), tags);
    }
}

// ============================================================================
// SECTION: In-Memory Metrics
// ============================================================================

/// A single observation key: metric name plus rendered tag set.
type SeriesKey = (String, String);

/// Aggregated state for one histogram series.
#[derive(Debug, Clone, Default)]
struct HistogramSeries {
    /// Observation count.
    count: u64,
    /// Observation sum.
    sum: f64,
    /// Cumulative counts per latency bucket.
    buckets: Vec<u64>,
}

/// Mutable aggregate state behind [`InMemoryMetrics`].
#[derive(Debug, Default)]
struct MetricsState {
    /// Counter totals by series.
    counters: BTreeMap<SeriesKey, u64>,
    /// Gauge values by series.
    gauges: BTreeMap<SeriesKey, f64>,
    /// Histogram aggregates by series.
    histograms: BTreeMap<SeriesKey, HistogramSeries>,
}

/// In-memory metrics aggregation for tests and Prometheus exposition.
#[derive(Default)]
pub struct InMemoryMetrics {
    /// Guarded aggregate state.
    state: Mutex<MetricsState>,
}

impl InMemoryMetrics {
    /// Creates an empty aggregate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value of a counter series, zero when absent.
    #[must_use]
    pub fn counter_value(&self, name: &str, tags: &MetricTags) -> u64 {
        let key = (name.to_string(), render_tags(tags));
        self.state
            .lock()
            .ok()
            .and_then(|state| state.counters.get(&key).copied())
            .unwrap_or_default()
    }

    /// Renders the aggregate in Prometheus text exposition format.
    ///
    /// Metric names are normalized by replacing `.` with `_`.
    #[must_use]
    pub fn render_prometheus(&self) -> String {
        let Ok(state) = self.state.lock() else {
            return String::new();
        };
        let mut out = String::new();
        for ((name, tags), value) in &state.counters {
            render_line(&mut out, name, tags, &value.to_string());
        }
        for ((name, tags), value) in &state.gauges {
            render_line(&mut out, name, tags, &value.to_string());
        }
        for ((name, tags), series) in &state.histograms {
            render_line(&mut out, &format!("{name}.count"), tags, &series.count.to_string());
            render_line(&mut out, &format!("{name}.sum"), tags, &series.sum.to_string());
        }
        out
    }
}

impl MetricsSink for InMemoryMetrics {
    fn counter(&self, name: &str, value: u64, tags: &MetricTags) {
        if let Ok(mut state) = self.state.lock() {
            let key = (name.to_string(), render_tags(tags));
            *state.counters.entry(key).or_insert(0) += value;
        }
    }

    fn gauge(&self, name: &str, value: f64, tags: &MetricTags) {
        if let Ok(mut state) = self.state.lock() {
            let key = (name.to_string(), render_tags(tags));
            state.gauges.insert(key, value);
        }
    }

    fn histogram(&self, name: &str, value: f64, tags: &MetricTags) {
        if let Ok(mut state) = self.state.lock() {
            let key = (name.to_string(), render_tags(tags));
            let series = state.histograms.entry(key).or_insert_with(|| HistogramSeries {
                count: 0,
                sum: 0.0,
                buckets: vec![0; TOOL_LATENCY_BUCKETS_MS.len()],
            });
            series.count += 1;
            series.sum += value;
            for (index, bound) in TOOL_LATENCY_BUCKETS_MS.iter().enumerate() {
                #[allow(
                    clippy::cast_precision_loss,
                    reason = "Bucket bounds are small integers."
                )]
                if value <= *bound as f64 {
                    series.buckets[index] += 1;
                }
            }
        }
    }

    fn timing(&self, name: &str, value: Duration, tags: &MetricTags) {
        #[allow(
            clippy::cast_precision_loss,
            reason = "Millisecond magnitudes fit comfortably in f64."
        )]
        self.histogram(name, value.as_millis() as f64, tags);
    }
}

/// Renders a tag map as a stable `k="v"` label list.
fn render_tags(tags: &MetricTags) -> String {
    let rendered: Vec<String> =
        tags.iter().map(|(key, value)| format!("{key}=\"{value}\"")).collect();
    rendered.join(",")
}

/// Writes one Prometheus exposition line.
fn render_line(out: &mut String, name: &str, tags: &str, value: &str) {
    let normalized = name.replace('.', "_");
    if tags.is_empty() {
        out.push_str(&format!("{normalized} {value}\n"));
    } else {
        out.push_str(&format!("{normalized}{{{tags}}} {value}\n"));
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions."
    )]

    use std::time::Duration;

    use serde_json::json;

    use super::InMemoryMetrics;
    use super::LogLevel;
    use super::LogRecord;
    use super::LogSink;
    use super::MemoryLogSink;
    use super::MetricTags;
    use super::MetricsSink;

    #[test]
    fn memory_sink_captures_in_order() {
        let sink = MemoryLogSink::new();
        sink.record(&LogRecord::new(LogLevel::Info, "tool_started").field("tool", json!("a")));
        sink.record(&LogRecord::new(LogLevel::Error, "tool_failed").field("tool", json!("a")));
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event, "tool_started");
        assert_eq!(sink.events("tool_failed").len(), 1);
    }

    #[test]
    fn counters_aggregate_by_series() {
        let metrics = InMemoryMetrics::new();
        let mut tags = MetricTags::new();
        tags.insert("tool".to_string(), "list_instances".to_string());
        metrics.counter("tool.executions.started", 1, &tags);
        metrics.counter("tool.executions.started", 1, &tags);
        metrics.counter("tool.executions.started", 1, &MetricTags::new());
        assert_eq!(metrics.counter_value("tool.executions.started", &tags), 2);
        assert_eq!(metrics.counter_value("tool.executions.started", &MetricTags::new()), 1);
    }

    #[test]
    fn prometheus_rendering_normalizes_names() {
        let metrics = InMemoryMetrics::new();
        let mut tags = MetricTags::new();
        tags.insert("tool".to_string(), "reboot".to_string());
        metrics.counter("tool.executions.failed", 3, &tags);
        metrics.timing("tool.execution.duration", Duration::from_millis(42), &tags);
        let rendered = metrics.render_prometheus();
        assert!(rendered.contains("tool_executions_failed{tool=\"reboot\"} 3"));
        assert!(rendered.contains("tool_execution_duration_count{tool=\"reboot\"} 1"));
    }

    #[test]
    fn level_parse_defaults_to_info() {
        assert_eq!(LogLevel::parse("warn"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("nonsense"), LogLevel::Info);
    }

    #[test]
    fn log_metrics_forward_observations_as_records() {
        let sink = std::sync::Arc::new(MemoryLogSink::new());
        let metrics = super::LogMetrics::new(sink.clone());
        let mut tags = MetricTags::new();
        tags.insert("tool".to_string(), "reboot".to_string());
        metrics.counter("tool.executions.started", 1, &tags);
        metrics.timing("tool.execution.duration", Duration::from_millis(7), &tags);
        let records = sink.events("metric");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].fields.get("kind"), Some(&json!("counter")));
        assert_eq!(records[1].fields.get("kind"), Some(&json!("timing")));
        assert_eq!(records[1].fields.get("value"), Some(&json!(7)));
    }
}
