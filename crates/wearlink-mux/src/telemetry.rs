//! Outputs of the multiplexer toward the host: decoded records and events.

use tokio::sync::mpsc;
use wearlink_record::Record;

/// Receives decoded records. Ownership moves on delivery.
pub trait TelemetrySink: Send {
    fn deliver(&mut self, record: Record);
}

impl TelemetrySink for Vec<Record> {
    fn deliver(&mut self, record: Record) {
        self.push(record);
    }
}

impl TelemetrySink for mpsc::UnboundedSender<Record> {
    fn deliver(&mut self, record: Record) {
        // A closed receiver means the host stopped listening.
        let _ = self.send(record);
    }
}

/// Sink that discards every record.
#[derive(Debug, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn deliver(&mut self, _record: Record) {}
}

/// Something the device asked the host to do, or reported.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Start or stop ringing the phone.
    FindPhone { start: bool },
    Battery { level: u8, charging: bool },
    DeviceInfo {
        serial: String,
        firmware: String,
        model: String,
    },
    RealtimeStats {
        heart_rate: u32,
        steps: u32,
        calories: u32,
    },
    NotificationAction {
        id: u32,
        action: crate::proto::ActionKind,
        reply: Option<String>,
    },
    CallAction(crate::proto::CallCommand),
    /// The device turned notification forwarding on or off.
    NotificationSubscription { enabled: bool },
    MediaButton(crate::proto::MediaKey),
    /// The device changed the phone's volume, in percent.
    SetVolume(u8),
    /// The device needs the calendar sent again.
    CalendarSyncRequested,
    /// The device reported its alarm table.
    AlarmsReported(Vec<crate::proto::Alarm>),
}
