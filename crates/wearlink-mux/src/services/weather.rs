use std::any::Any;

use tracing::debug;

use crate::envelope::Command;
use crate::error::MuxError;
use crate::proto;
use crate::service::{Service, ServiceContext};

pub const COMMAND_TYPE: u8 = 10;

/// Host pushes conditions; the device may ask for them on the same subtype.
pub const CURRENT: u8 = 0;

/// Current weather conditions.
#[derive(Debug, Default)]
pub struct WeatherService {
    current: Option<proto::CurrentWeather>,
}

impl WeatherService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send_weather(&mut self, weather: proto::CurrentWeather, ctx: &mut ServiceContext<'_>) {
        ctx.send_message(COMMAND_TYPE, CURRENT, &weather);
        self.current = Some(weather);
    }

    fn resend(&self, ctx: &mut ServiceContext<'_>) {
        match &self.current {
            Some(weather) => ctx.send_message(COMMAND_TYPE, CURRENT, weather),
            None => debug!("weather: nothing to send yet"),
        }
    }
}

impl Service for WeatherService {
    fn command_type(&self) -> u8 {
        COMMAND_TYPE
    }

    fn name(&self) -> &'static str {
        "weather"
    }

    fn initialize(&mut self, ctx: &mut ServiceContext<'_>) {
        self.resend(ctx);
    }

    fn handle_command(
        &mut self,
        command: &Command,
        ctx: &mut ServiceContext<'_>,
    ) -> Result<(), MuxError> {
        match command.subtype {
            CURRENT => self.resend(ctx),
            _ => super::unhandled(self.name(), command),
        }
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::Harness;

    #[test]
    fn test_device_request_resends_last_conditions() {
        let mut harness = Harness::new();
        let mut service = WeatherService::new();
        let request = Command::new(COMMAND_TYPE, CURRENT, vec![]);

        let (_, outbox, _) = harness.run(|ctx| service.handle_command(&request, ctx));
        assert!(outbox.is_empty());

        let weather = proto::CurrentWeather {
            location: "Porto".to_string(),
            temperature_c: -3,
            condition: 2,
            humidity: 80,
            timestamp: 1_700_000_000,
        };
        let (_, outbox, _) = harness.run(|ctx| {
            service.send_weather(weather.clone(), ctx);
            service.handle_command(&request, ctx)
        });
        assert_eq!(outbox.len(), 2);
        let sent: proto::CurrentWeather = outbox[1].decode_payload().unwrap();
        assert_eq!(sent, weather);
    }
}
