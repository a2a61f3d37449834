//! The Service contract and the context services run in.

use std::any::Any;
use std::time::{SystemTime, UNIX_EPOCH};

use prost::Message;
use wearlink_common::Preferences;
use wearlink_metrics::{metric_defs, SessionLabels};
use wearlink_record::Record;

use crate::envelope::Command;
use crate::error::MuxError;
use crate::telemetry::{DeviceEvent, TelemetrySink};

/// A capability-scoped handler for one command type.
///
/// Services never write to the channel themselves. Everything they send is
/// queued on the [`ServiceContext`] and flushed in order once the callback
/// returns.
pub trait Service: Send + 'static {
    /// Command type routed to this service. Unique within a registry.
    fn command_type(&self) -> u8;

    /// Short name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Called once per connection, in registry order, after the handshake.
    fn initialize(&mut self, _ctx: &mut ServiceContext<'_>) {}

    /// Handle one inbound command of this service's type.
    fn handle_command(
        &mut self,
        command: &Command,
        ctx: &mut ServiceContext<'_>,
    ) -> Result<(), MuxError>;

    /// A preference changed. Return `true` to claim the key.
    fn on_send_configuration(&mut self, _key: &str, _ctx: &mut ServiceContext<'_>) -> bool {
        false
    }

    /// The host clock changed or a time sync was requested.
    fn on_set_time(&mut self, _ctx: &mut ServiceContext<'_>) {}

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ============================================================================
// Clock
// ============================================================================

/// Host time as seen by services.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> u64;

    fn utc_offset_minutes(&self) -> i32 {
        0
    }

    /// Whether the host displays a 24-hour clock.
    fn system_24h(&self) -> bool {
        true
    }
}

/// Wall clock in UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock {
    pub unix: u64,
    pub utc_offset_minutes: i32,
    pub system_24h: bool,
}

impl FixedClock {
    pub fn new(unix: u64) -> Self {
        Self {
            unix,
            utc_offset_minutes: 0,
            system_24h: true,
        }
    }
}

impl Clock for FixedClock {
    fn now_unix(&self) -> u64 {
        self.unix
    }

    fn utc_offset_minutes(&self) -> i32 {
        self.utc_offset_minutes
    }

    fn system_24h(&self) -> bool {
        self.system_24h
    }
}

// ============================================================================
// Context
// ============================================================================

/// Everything a service may touch during one callback.
pub struct ServiceContext<'a> {
    prefs: &'a dyn Preferences,
    clock: &'a dyn Clock,
    sink: &'a mut dyn TelemetrySink,
    labels: &'a SessionLabels,
    outbox: Vec<Command>,
    events: Vec<DeviceEvent>,
}

impl<'a> ServiceContext<'a> {
    pub fn new(
        prefs: &'a dyn Preferences,
        clock: &'a dyn Clock,
        sink: &'a mut dyn TelemetrySink,
        labels: &'a SessionLabels,
    ) -> Self {
        Self {
            prefs,
            clock,
            sink,
            labels,
            outbox: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn prefs(&self) -> &dyn Preferences {
        self.prefs
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock
    }

    pub fn labels(&self) -> &SessionLabels {
        self.labels
    }

    /// Queue a raw command.
    pub fn send(&mut self, command_type: u8, subtype: u8, payload: impl Into<Vec<u8>>) {
        self.outbox.push(Command::new(command_type, subtype, payload));
    }

    /// Queue a command carrying a protobuf payload.
    pub fn send_message<M: Message>(&mut self, command_type: u8, subtype: u8, message: &M) {
        self.send(command_type, subtype, message.encode_to_vec());
    }

    pub fn emit(&mut self, event: DeviceEvent) {
        self.events.push(event);
    }

    /// Hand a decoded record to the telemetry sink.
    pub fn deliver(&mut self, record: Record) {
        metrics::counter!(
            metric_defs::RECORDS_DELIVERED.name,
            &self.labels.with(&[("schema", record.schema().name().to_string())])
        )
        .increment(1);
        self.sink.deliver(record);
    }

    /// Commands queued so far.
    pub fn outbox(&self) -> &[Command] {
        &self.outbox
    }

    pub fn events(&self) -> &[DeviceEvent] {
        &self.events
    }

    pub(crate) fn into_parts(self) -> (Vec<Command>, Vec<DeviceEvent>) {
        (self.outbox, self.events)
    }
}
