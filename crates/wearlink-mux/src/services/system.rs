//! Device-wide settings: clock, battery, language, find phone/device.

use std::any::Any;

use tracing::debug;
use wearlink_common::{keys, TimeFormat};

use crate::envelope::Command;
use crate::error::MuxError;
use crate::proto;
use crate::service::{Service, ServiceContext};
use crate::telemetry::DeviceEvent;

pub const COMMAND_TYPE: u8 = 2;

pub const BATTERY: u8 = 1;
pub const DEVICE_INFO: u8 = 2;
pub const CLOCK: u8 = 3;
pub const LANGUAGE: u8 = 15;
pub const FIND_PHONE: u8 = 17;
pub const FIND_DEVICE: u8 = 18;
pub const WEAR_LOCATION: u8 = 20;

/// Last battery report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryState {
    pub level: u8,
    pub charging: bool,
}

#[derive(Debug, Default)]
pub struct SystemService {
    battery: Option<BatteryState>,
    firmware: Option<String>,
}

impl SystemService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn battery(&self) -> Option<BatteryState> {
        self.battery
    }

    pub fn firmware(&self) -> Option<&str> {
        self.firmware.as_deref()
    }

    /// Send the host's clock and time format.
    pub fn set_current_time(&mut self, ctx: &mut ServiceContext<'_>) {
        let clock = ctx.clock();
        let message = proto::Clock {
            unix_seconds: clock.now_unix(),
            utc_offset_minutes: clock.utc_offset_minutes(),
            is_24h: TimeFormat::from_preferences(ctx.prefs()).is_24h(clock.system_24h()),
        };
        debug!("system: setting time to {}", message.unix_seconds);
        ctx.send_message(COMMAND_TYPE, CLOCK, &message);
    }

    /// Start or stop ringing the device.
    pub fn find_device(&mut self, start: bool, ctx: &mut ServiceContext<'_>) {
        ctx.send_message(COMMAND_TYPE, FIND_DEVICE, &proto::Find { start });
    }

    fn send_language(&self, ctx: &mut ServiceContext<'_>) {
        let code = ctx.prefs().get_string(keys::LANGUAGE, "en_US");
        ctx.send_message(COMMAND_TYPE, LANGUAGE, &proto::Language { code });
    }

    fn send_wear_location(&self, ctx: &mut ServiceContext<'_>) {
        let side = match ctx.prefs().get_string(keys::WEAR_LOCATION, "left").as_str() {
            "right" => proto::WristSide::Right,
            _ => proto::WristSide::Left,
        };
        ctx.send_message(
            COMMAND_TYPE,
            WEAR_LOCATION,
            &proto::WearLocation { side: side as i32 },
        );
    }
}

impl Service for SystemService {
    fn command_type(&self) -> u8 {
        COMMAND_TYPE
    }

    fn name(&self) -> &'static str {
        "system"
    }

    fn initialize(&mut self, ctx: &mut ServiceContext<'_>) {
        ctx.send(COMMAND_TYPE, DEVICE_INFO, Vec::new());
        ctx.send(COMMAND_TYPE, BATTERY, Vec::new());
    }

    fn handle_command(
        &mut self,
        command: &Command,
        ctx: &mut ServiceContext<'_>,
    ) -> Result<(), MuxError> {
        match command.subtype {
            BATTERY => {
                let battery: proto::Battery = command.decode_payload()?;
                let state = BatteryState {
                    level: battery.level.min(100) as u8,
                    charging: battery.charging,
                };
                self.battery = Some(state);
                ctx.emit(DeviceEvent::Battery {
                    level: state.level,
                    charging: state.charging,
                });
            }
            DEVICE_INFO => {
                let info: proto::DeviceInfo = command.decode_payload()?;
                debug!("system: firmware {} on {}", info.firmware, info.model);
                self.firmware = Some(info.firmware.clone());
                ctx.emit(DeviceEvent::DeviceInfo {
                    serial: info.serial,
                    firmware: info.firmware,
                    model: info.model,
                });
            }
            FIND_PHONE => {
                let find: proto::Find = command.decode_payload()?;
                ctx.emit(DeviceEvent::FindPhone { start: find.start });
            }
            _ => super::unhandled(self.name(), command),
        }
        Ok(())
    }

    fn on_send_configuration(&mut self, key: &str, ctx: &mut ServiceContext<'_>) -> bool {
        match key {
            keys::TIMEFORMAT => self.set_current_time(ctx),
            keys::LANGUAGE => self.send_language(ctx),
            keys::WEAR_LOCATION => self.send_wear_location(ctx),
            _ => return false,
        }
        true
    }

    fn on_set_time(&mut self, ctx: &mut ServiceContext<'_>) {
        self.set_current_time(ctx);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::Harness;
    use prost::Message;
    use wearlink_common::MemoryPreferences;

    #[test]
    fn test_set_time_follows_time_format() {
        let mut harness = Harness::with_prefs(MemoryPreferences::new().with(keys::TIMEFORMAT, "12h"));
        let mut service = SystemService::new();
        let (_, outbox, _) = harness.run(|ctx| service.on_set_time(ctx));

        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].key(), (COMMAND_TYPE, CLOCK));
        let clock: proto::Clock = outbox[0].decode_payload().unwrap();
        assert_eq!(clock.unix_seconds, 1_700_000_000);
        assert!(!clock.is_24h);
    }

    #[test]
    fn test_battery_report() {
        let mut harness = Harness::new();
        let mut service = SystemService::new();
        let payload = proto::Battery {
            level: 87,
            charging: true,
        }
        .encode_to_vec();
        let (result, _, events) = harness.run(|ctx| {
            service.handle_command(&Command::new(COMMAND_TYPE, BATTERY, payload), ctx)
        });

        assert!(result.is_ok());
        assert_eq!(
            events,
            vec![DeviceEvent::Battery {
                level: 87,
                charging: true
            }]
        );
        assert_eq!(service.battery().unwrap().level, 87);
    }

    #[test]
    fn test_find_phone_event() {
        let mut harness = Harness::new();
        let mut service = SystemService::new();
        let payload = proto::Find { start: true }.encode_to_vec();
        let (_, _, events) = harness.run(|ctx| {
            service.handle_command(&Command::new(COMMAND_TYPE, FIND_PHONE, payload), ctx)
        });
        assert_eq!(events, vec![DeviceEvent::FindPhone { start: true }]);
    }

    #[test]
    fn test_claims_its_config_keys() {
        let mut harness =
            Harness::with_prefs(MemoryPreferences::new().with(keys::WEAR_LOCATION, "right"));
        let mut service = SystemService::new();

        let (claimed, outbox, _) =
            harness.run(|ctx| service.on_send_configuration(keys::WEAR_LOCATION, ctx));
        assert!(claimed);
        let location: proto::WearLocation = outbox[0].decode_payload().unwrap();
        assert_eq!(location.side(), proto::WristSide::Right);

        let (claimed, outbox, _) =
            harness.run(|ctx| service.on_send_configuration(keys::SYNC_CALENDAR, ctx));
        assert!(!claimed);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_garbage_battery_payload_is_error() {
        let mut harness = Harness::new();
        let mut service = SystemService::new();
        let (result, _, events) = harness.run(|ctx| {
            service.handle_command(&Command::new(COMMAND_TYPE, BATTERY, vec![0xFF]), ctx)
        });
        assert!(matches!(
            result,
            Err(MuxError::Envelope(crate::error::EnvelopeError::Protobuf(_)))
        ));
        assert!(events.is_empty());
    }
}
