//! Capability services shipped with the multiplexer.

pub mod calendar;
pub mod health;
pub mod music;
pub mod notification;
pub mod schedule;
pub mod system;
pub mod weather;

pub use calendar::CalendarService;
pub use health::HealthService;
pub use music::MusicService;
pub use notification::NotificationService;
pub use schedule::ScheduleService;
pub use system::SystemService;
pub use weather::WeatherService;

use tracing::debug;

use crate::envelope::Command;

/// Log a subtype this service does not know.
pub(crate) fn unhandled(service: &str, command: &Command) {
    debug!(
        "{}: unhandled subtype {} ({} bytes)",
        service,
        command.subtype,
        command.payload.len()
    );
}
