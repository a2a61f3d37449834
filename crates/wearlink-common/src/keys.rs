//! Preference keys.

/// Whether the device measures SpO2 automatically (bool, default false).
pub const SPO_AUTOMATIC_ENABLE: &str = "spo_automatic_enable";
/// Clock format: `auto`, `24h` or `12h` (default `auto`).
pub const TIMEFORMAT: &str = "timeformat";
/// Date pattern such as `MM/dd/yyyy` or `dd.MM.yyyy` (default `MM/dd/yyyy`).
pub const DATEFORMAT: &str = "dateformat";
/// Push the current time after connecting (bool, default true).
pub const DATETIME_SYNC_ON_CONNECT: &str = "datetime_synconconnect";
/// Heart rate measurement interval in minutes, 0 disables (int).
pub const HEARTRATE_MEASUREMENT_INTERVAL: &str = "heartrate_measurement_interval";
/// High heart rate alert threshold in bpm, 0 disables (int).
pub const HEARTRATE_ALERT_HIGH_THRESHOLD: &str = "heartrate_alert_threshold";
/// Low SpO2 alert threshold in percent, 0 disables (int).
pub const SPO2_LOW_ALERT_THRESHOLD: &str = "spo2_low_alert_threshold";
/// Wrist the device is worn on: `left` or `right`.
pub const WEAR_LOCATION: &str = "wearlocation";
/// Device language tag such as `en_US`.
pub const LANGUAGE: &str = "language";
/// Turn the screen on for incoming notifications (bool).
pub const SCREEN_ON_ON_NOTIFICATIONS: &str = "screen_on_on_notifications";
/// Keep calendar events in sync with the device (bool, default false).
pub const SYNC_CALENDAR: &str = "sync_calendar";
