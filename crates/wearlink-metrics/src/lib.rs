//! Metrics for wearlink device sessions.
//!
//! Every metric the workspace emits is declared here as a [`Metric`] constant
//! so names, units and label keys live in one place. Crates emit through the
//! re-exported `metrics` facade; installing a recorder is up to the host.
//!
//! # Example
//!
//! ```rust,ignore
//! use wearlink_metrics::{describe_metrics, metric_defs, SessionLabels};
//!
//! describe_metrics();
//!
//! let labels = SessionLabels::new("AA:BB:CC:DD:EE:FF", "huawei");
//! metrics::counter!(metric_defs::REQUEST_SENT.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use wearlink_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const FRAMES: Metric = Metric::counter("wearlink.example.frames")
///     .with_description("Frames seen")
///     .with_unit(Unit::Count)
///     .with_labels(&["device"]);
///
/// assert_eq!(FRAMES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// Metric name, dot separated.
    pub name: &'static str,
    pub kind: MetricKind,
    pub description: &'static str,
    pub unit: Option<Unit>,
    /// Label keys the metric is emitted with.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Labels present on every session-scoped metric.
    pub const SESSION_LABELS: &[&str] = &["device", "protocol"];

    // ========================================================================
    // Requests
    // ========================================================================

    /// Requests whose frames were written to the transport.
    pub const REQUEST_SENT: Metric = Metric::counter("wearlink.request.sent")
        .with_description("Requests written to the transport")
        .with_unit(Unit::Count)
        .with_labels(&["device", "protocol", "service", "command"]);

    /// Requests that completed successfully.
    pub const REQUEST_COMPLETED: Metric = Metric::counter("wearlink.request.completed")
        .with_description("Requests completed successfully")
        .with_unit(Unit::Count)
        .with_labels(&["device", "protocol"]);

    /// Requests that failed, by reason.
    pub const REQUEST_FAILED: Metric = Metric::counter("wearlink.request.failed")
        .with_description("Requests that failed")
        .with_unit(Unit::Count)
        .with_labels(&["device", "protocol", "reason"]);

    /// Time from send to response.
    pub const REQUEST_LATENCY: Metric = Metric::histogram("wearlink.request.latency_ms")
        .with_description("Time from sending a request to its response")
        .with_unit(Unit::Milliseconds)
        .with_labels(&["device", "protocol"]);

    /// Requests waiting behind the queue head.
    pub const REQUEST_QUEUE_DEPTH: Metric = Metric::gauge("wearlink.request.queue_depth")
        .with_description("Requests waiting in the session queue")
        .with_unit(Unit::Count)
        .with_labels(&["device", "protocol"]);

    // ========================================================================
    // Handshake
    // ========================================================================

    pub const HANDSHAKE_COMPLETED: Metric = Metric::counter("wearlink.handshake.completed")
        .with_description("Handshakes that reached the ready state")
        .with_unit(Unit::Count)
        .with_labels(&["device", "protocol"]);

    pub const HANDSHAKE_FAILED: Metric = Metric::counter("wearlink.handshake.failed")
        .with_description("Handshakes that failed")
        .with_unit(Unit::Count)
        .with_labels(&["device", "protocol", "reason"]);

    // ========================================================================
    // Link
    // ========================================================================

    pub const LINK_FRAMES_TX: Metric = Metric::counter("wearlink.link.frames_tx")
        .with_description("Frames written to the transport")
        .with_unit(Unit::Count)
        .with_labels(&["device", "protocol"]);

    pub const LINK_BYTES_TX: Metric = Metric::counter("wearlink.link.bytes_tx")
        .with_description("Bytes written to the transport")
        .with_unit(Unit::Bytes)
        .with_labels(&["device", "protocol"]);

    pub const LINK_BYTES_RX: Metric = Metric::counter("wearlink.link.bytes_rx")
        .with_description("Bytes received from the transport")
        .with_unit(Unit::Bytes)
        .with_labels(&["device", "protocol"]);

    /// Frames or packets dropped during reassembly or decoding.
    pub const LINK_RX_ERRORS: Metric = Metric::counter("wearlink.link.rx_errors")
        .with_description("Inbound frames or packets that could not be decoded")
        .with_unit(Unit::Count)
        .with_labels(&["device", "protocol"]);

    /// Inbound packets that matched no request.
    pub const LINK_UNSOLICITED: Metric = Metric::counter("wearlink.link.unsolicited")
        .with_description("Inbound packets that matched no outstanding request")
        .with_unit(Unit::Count)
        .with_labels(&["device", "protocol"]);

    // ========================================================================
    // Command Multiplexer
    // ========================================================================

    pub const MUX_INBOUND: Metric = Metric::counter("wearlink.mux.inbound")
        .with_description("Inbound commands routed to a service")
        .with_unit(Unit::Count)
        .with_labels(&["device", "protocol", "service"]);

    /// Inbound commands that reached no service.
    pub const MUX_DROPPED: Metric = Metric::counter("wearlink.mux.dropped")
        .with_description("Inbound commands dropped (unknown type or malformed)")
        .with_unit(Unit::Count)
        .with_labels(&["device", "protocol", "reason"]);

    pub const MUX_OUTBOUND: Metric = Metric::counter("wearlink.mux.outbound")
        .with_description("Outbound commands written to the channel")
        .with_unit(Unit::Count)
        .with_labels(&["device", "protocol"]);

    // ========================================================================
    // Records
    // ========================================================================

    pub const RECORDS_DELIVERED: Metric = Metric::counter("wearlink.records.delivered")
        .with_description("Decoded records handed to the telemetry sink")
        .with_unit(Unit::Count)
        .with_labels(&["device", "protocol", "schema"]);

    pub const RECORDS_REJECTED: Metric = Metric::counter("wearlink.records.rejected")
        .with_description("Record buffers that failed to decode")
        .with_unit(Unit::Count)
        .with_labels(&["device", "protocol"]);

    /// Returns a slice of all defined metrics.
    pub const ALL: &[&Metric] = &[
        &REQUEST_SENT,
        &REQUEST_COMPLETED,
        &REQUEST_FAILED,
        &REQUEST_LATENCY,
        &REQUEST_QUEUE_DEPTH,
        &HANDSHAKE_COMPLETED,
        &HANDSHAKE_FAILED,
        &LINK_FRAMES_TX,
        &LINK_BYTES_TX,
        &LINK_BYTES_RX,
        &LINK_RX_ERRORS,
        &LINK_UNSOLICITED,
        &MUX_INBOUND,
        &MUX_DROPPED,
        &MUX_OUTBOUND,
        &RECORDS_DELIVERED,
        &RECORDS_REJECTED,
    ];
}

/// Labels identifying one device session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionLabels {
    /// Device address or other stable identifier.
    pub device: String,
    /// Protocol family spoken by the device.
    pub protocol: String,
}

impl SessionLabels {
    pub fn new(device: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            protocol: protocol.into(),
        }
    }

    /// Converts the labels to the metrics crate label format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![
            ("device", self.device.clone()),
            ("protocol", self.protocol.clone()),
        ]
    }

    /// Returns labels with additional key-value pairs.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Describes all metrics. Call once after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
