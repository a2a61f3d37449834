//! Protobuf payloads carried inside command envelopes.
//!
//! Field numbers are part of the wire contract with the device; never reuse
//! one for a different meaning.

use prost::{Enumeration, Message};

// ============================================================================
// System
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct Battery {
    #[prost(uint32, tag = "1")]
    pub level: u32,
    #[prost(bool, tag = "2")]
    pub charging: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeviceInfo {
    #[prost(string, tag = "1")]
    pub serial: String,
    #[prost(string, tag = "2")]
    pub firmware: String,
    #[prost(string, tag = "3")]
    pub model: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Clock {
    /// Seconds since the Unix epoch, UTC.
    #[prost(uint64, tag = "1")]
    pub unix_seconds: u64,
    /// Local offset from UTC in minutes.
    #[prost(sint32, tag = "2")]
    pub utc_offset_minutes: i32,
    #[prost(bool, tag = "3")]
    pub is_24h: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct Language {
    #[prost(string, tag = "1")]
    pub code: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum WristSide {
    Left = 0,
    Right = 1,
}

#[derive(Clone, PartialEq, Message)]
pub struct WearLocation {
    #[prost(enumeration = "WristSide", tag = "1")]
    pub side: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct Find {
    #[prost(bool, tag = "1")]
    pub start: bool,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct HeartRateConfig {
    /// Automatic measurement interval in minutes; 0 disables it.
    #[prost(uint32, tag = "1")]
    pub interval_minutes: u32,
    /// High heart rate alert in bpm; 0 disables it.
    #[prost(uint32, tag = "2")]
    pub alert_high: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct SpO2Config {
    #[prost(bool, tag = "1")]
    pub automatic: bool,
    /// Low saturation alert in percent; 0 disables it.
    #[prost(uint32, tag = "2")]
    pub alert_low: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct RealtimeStats {
    #[prost(uint32, tag = "1")]
    pub heart_rate: u32,
    #[prost(uint32, tag = "2")]
    pub steps: u32,
    #[prost(uint32, tag = "3")]
    pub calories: u32,
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct Notification {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(string, tag = "2")]
    pub app: String,
    #[prost(string, tag = "3")]
    pub title: String,
    #[prost(string, tag = "4")]
    pub body: String,
    #[prost(uint64, tag = "5")]
    pub timestamp: u64,
    #[prost(bool, tag = "6")]
    pub wake_screen: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct NotificationId {
    #[prost(uint32, tag = "1")]
    pub id: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum ActionKind {
    Dismiss = 0,
    Open = 1,
    Reply = 2,
    Mute = 3,
}

#[derive(Clone, PartialEq, Message)]
pub struct NotificationAction {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(enumeration = "ActionKind", tag = "2")]
    pub kind: i32,
    #[prost(string, tag = "3")]
    pub reply: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum CallPhase {
    Idle = 0,
    Incoming = 1,
    Outgoing = 2,
    Active = 3,
    Ended = 4,
}

#[derive(Clone, PartialEq, Message)]
pub struct CallState {
    #[prost(enumeration = "CallPhase", tag = "1")]
    pub phase: i32,
    #[prost(string, tag = "2")]
    pub number: String,
    #[prost(string, tag = "3")]
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum CallCommand {
    Accept = 0,
    Reject = 1,
    Silence = 2,
}

#[derive(Clone, PartialEq, Message)]
pub struct CallAction {
    #[prost(enumeration = "CallCommand", tag = "1")]
    pub command: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct CannedReplies {
    #[prost(string, repeated, tag = "1")]
    pub replies: Vec<String>,
}

/// Device -> host: turn notification forwarding on or off.
#[derive(Clone, PartialEq, Message)]
pub struct NotificationSubscription {
    #[prost(bool, tag = "1")]
    pub enable: bool,
    /// Opaque device flags, echoed in the status.
    #[prost(uint32, tag = "2")]
    pub flags: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum ReplyStatus {
    Ack = 0,
    Nak = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum SubscriptionResult {
    Accepted = 0,
    Rejected = 1,
}

#[derive(Clone, PartialEq, Message)]
pub struct SubscriptionStatus {
    #[prost(enumeration = "ReplyStatus", tag = "1")]
    pub status: i32,
    #[prost(enumeration = "SubscriptionResult", tag = "2")]
    pub result: i32,
    #[prost(bool, tag = "3")]
    pub enable: bool,
    #[prost(uint32, tag = "4")]
    pub flags: u32,
}

// ============================================================================
// Weather
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct CurrentWeather {
    #[prost(string, tag = "1")]
    pub location: String,
    #[prost(sint32, tag = "2")]
    pub temperature_c: i32,
    #[prost(uint32, tag = "3")]
    pub condition: u32,
    #[prost(uint32, tag = "4")]
    pub humidity: u32,
    #[prost(uint64, tag = "5")]
    pub timestamp: u64,
}

// ============================================================================
// Calendar
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct CalendarEvent {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(string, tag = "2")]
    pub title: String,
    #[prost(uint64, tag = "3")]
    pub start: u64,
    #[prost(uint64, tag = "4")]
    pub end: u64,
    #[prost(bool, tag = "5")]
    pub all_day: bool,
    #[prost(string, tag = "6")]
    pub location: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct CalendarSync {
    #[prost(message, repeated, tag = "1")]
    pub events: Vec<CalendarEvent>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CalendarEventId {
    #[prost(uint64, tag = "1")]
    pub id: u64,
}

// ============================================================================
// Schedule
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct Alarm {
    #[prost(uint32, tag = "1")]
    pub slot: u32,
    #[prost(bool, tag = "2")]
    pub enabled: bool,
    #[prost(uint32, tag = "3")]
    pub hour: u32,
    #[prost(uint32, tag = "4")]
    pub minute: u32,
    /// Bit 0 is Monday.
    #[prost(uint32, tag = "5")]
    pub repeat_days: u32,
    #[prost(string, tag = "6")]
    pub label: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct AlarmList {
    #[prost(message, repeated, tag = "1")]
    pub alarms: Vec<Alarm>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Reminder {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(uint64, tag = "3")]
    pub at: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ReminderList {
    #[prost(message, repeated, tag = "1")]
    pub reminders: Vec<Reminder>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WorldClocks {
    /// IANA zone names.
    #[prost(string, repeated, tag = "1")]
    pub zones: Vec<String>,
}

// ============================================================================
// Music
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum PlaybackState {
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

#[derive(Clone, PartialEq, Message)]
pub struct MusicInfo {
    #[prost(enumeration = "PlaybackState", tag = "1")]
    pub state: i32,
    #[prost(string, tag = "2")]
    pub track: String,
    #[prost(string, tag = "3")]
    pub artist: String,
    #[prost(string, tag = "4")]
    pub album: String,
    #[prost(uint32, tag = "5")]
    pub duration_s: u32,
    #[prost(uint32, tag = "6")]
    pub position_s: u32,
    #[prost(uint32, tag = "7")]
    pub volume: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum MediaKey {
    PlayPause = 0,
    Next = 1,
    Previous = 2,
    VolumeUp = 3,
    VolumeDown = 4,
}

#[derive(Clone, PartialEq, Message)]
pub struct MediaButton {
    #[prost(enumeration = "MediaKey", tag = "1")]
    pub key: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct Volume {
    #[prost(uint32, tag = "1")]
    pub level: u32,
}
