//! Health: automatic measurements, realtime stats and activity records.

use std::any::Any;

use tracing::{debug, warn};
use wearlink_common::keys;
use wearlink_metrics::metric_defs;
use wearlink_record::{monitoring, SchemaRegistry};

use crate::envelope::Command;
use crate::error::MuxError;
use crate::proto;
use crate::service::{Service, ServiceContext};
use crate::telemetry::DeviceEvent;

pub const COMMAND_TYPE: u8 = 8;

pub const SPO2_CONFIG: u8 = 9;
pub const HEART_RATE_CONFIG: u8 = 11;
/// Payload is one binary record.
pub const ACTIVITY_RECORD: u8 = 20;
pub const REALTIME_START: u8 = 45;
pub const REALTIME_STOP: u8 = 46;
pub const REALTIME_STATS: u8 = 47;

pub struct HealthService {
    schemas: SchemaRegistry,
    realtime: bool,
    records: u64,
}

impl HealthService {
    /// Decode activity records with the monitoring schema.
    pub fn new() -> Self {
        Self::with_schemas(SchemaRegistry::with(monitoring::schema()))
    }

    /// Decode activity records with a custom schema table.
    pub fn with_schemas(schemas: SchemaRegistry) -> Self {
        Self {
            schemas,
            realtime: false,
            records: 0,
        }
    }

    pub fn realtime_enabled(&self) -> bool {
        self.realtime
    }

    /// Records delivered to the sink so far.
    pub fn records_delivered(&self) -> u64 {
        self.records
    }

    pub fn enable_realtime_stats(&mut self, enable: bool, ctx: &mut ServiceContext<'_>) {
        if self.realtime == enable {
            return;
        }
        self.realtime = enable;
        let subtype = if enable { REALTIME_START } else { REALTIME_STOP };
        ctx.send(COMMAND_TYPE, subtype, Vec::new());
    }

    fn send_heart_rate_config(&self, ctx: &mut ServiceContext<'_>) {
        let prefs = ctx.prefs();
        let message = proto::HeartRateConfig {
            interval_minutes: clamp_u32(prefs.get_int(keys::HEARTRATE_MEASUREMENT_INTERVAL, 0)),
            alert_high: clamp_u32(prefs.get_int(keys::HEARTRATE_ALERT_HIGH_THRESHOLD, 0)),
        };
        ctx.send_message(COMMAND_TYPE, HEART_RATE_CONFIG, &message);
    }

    fn send_spo2_config(&self, ctx: &mut ServiceContext<'_>) {
        let prefs = ctx.prefs();
        let message = proto::SpO2Config {
            automatic: prefs.get_bool(keys::SPO_AUTOMATIC_ENABLE, false),
            alert_low: clamp_u32(prefs.get_int(keys::SPO2_LOW_ALERT_THRESHOLD, 0)),
        };
        ctx.send_message(COMMAND_TYPE, SPO2_CONFIG, &message);
    }

    fn on_activity_record(&mut self, payload: &[u8], ctx: &mut ServiceContext<'_>) {
        match self.schemas.decode_any(payload) {
            Ok(record) => {
                self.records += 1;
                ctx.deliver(record);
            }
            Err(e) => {
                warn!("health: dropping activity record: {}", e);
                metrics::counter!(metric_defs::RECORDS_REJECTED.name, &ctx.labels().to_labels())
                    .increment(1);
            }
        }
    }
}

impl Default for HealthService {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_u32(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

impl Service for HealthService {
    fn command_type(&self) -> u8 {
        COMMAND_TYPE
    }

    fn name(&self) -> &'static str {
        "health"
    }

    fn initialize(&mut self, ctx: &mut ServiceContext<'_>) {
        self.realtime = false;
        self.send_heart_rate_config(ctx);
        self.send_spo2_config(ctx);
    }

    fn handle_command(
        &mut self,
        command: &Command,
        ctx: &mut ServiceContext<'_>,
    ) -> Result<(), MuxError> {
        match command.subtype {
            ACTIVITY_RECORD => self.on_activity_record(&command.payload, ctx),
            REALTIME_STATS => {
                let stats: proto::RealtimeStats = command.decode_payload()?;
                if !self.realtime {
                    debug!("health: realtime stats while disabled");
                }
                ctx.emit(DeviceEvent::RealtimeStats {
                    heart_rate: stats.heart_rate,
                    steps: stats.steps,
                    calories: stats.calories,
                });
            }
            _ => super::unhandled(self.name(), command),
        }
        Ok(())
    }

    fn on_send_configuration(&mut self, key: &str, ctx: &mut ServiceContext<'_>) -> bool {
        match key {
            keys::HEARTRATE_MEASUREMENT_INTERVAL | keys::HEARTRATE_ALERT_HIGH_THRESHOLD => {
                self.send_heart_rate_config(ctx)
            }
            keys::SPO_AUTOMATIC_ENABLE | keys::SPO2_LOW_ALERT_THRESHOLD => {
                self.send_spo2_config(ctx)
            }
            _ => return false,
        }
        true
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::Harness;
    use wearlink_common::MemoryPreferences;
    use wearlink_record::{encode, monitoring::field, RecordBuilder};

    fn activity_bytes(heart_rate: u8) -> Vec<u8> {
        let record = RecordBuilder::new(monitoring::schema())
            .set(field::HEART_RATE, heart_rate)
            .unwrap()
            .set(field::TIMESTAMP, 1_000_000_000u32)
            .unwrap()
            .build()
            .unwrap();
        encode(&record)
    }

    #[test]
    fn test_initialize_sends_measurement_config() {
        let prefs = MemoryPreferences::new()
            .with(keys::HEARTRATE_MEASUREMENT_INTERVAL, 10i64)
            .with(keys::SPO_AUTOMATIC_ENABLE, true);
        let mut harness = Harness::with_prefs(prefs);
        let mut service = HealthService::new();
        let (_, outbox, _) = harness.run(|ctx| service.initialize(ctx));

        let keys: Vec<_> = outbox.iter().map(Command::key).collect();
        assert_eq!(
            keys,
            vec![
                (COMMAND_TYPE, HEART_RATE_CONFIG),
                (COMMAND_TYPE, SPO2_CONFIG)
            ]
        );
        let hr: proto::HeartRateConfig = outbox[0].decode_payload().unwrap();
        assert_eq!(hr.interval_minutes, 10);
        let spo2: proto::SpO2Config = outbox[1].decode_payload().unwrap();
        assert!(spo2.automatic);
    }

    #[test]
    fn test_activity_record_delivered() {
        let mut harness = Harness::new();
        let mut service = HealthService::new();
        let command = Command::new(COMMAND_TYPE, ACTIVITY_RECORD, activity_bytes(72));
        let (result, _, _) = harness.run(|ctx| service.handle_command(&command, ctx));

        assert!(result.is_ok());
        assert_eq!(harness.records.len(), 1);
        assert_eq!(harness.records[0].global_id(), monitoring::GLOBAL_ID);
        assert_eq!(harness.records[0].unsigned(field::HEART_RATE), Some(72));
        assert_eq!(service.records_delivered(), 1);
    }

    #[test]
    fn test_bad_activity_record_dropped() {
        let mut harness = Harness::new();
        let mut service = HealthService::new();
        let command = Command::new(COMMAND_TYPE, ACTIVITY_RECORD, vec![0x01, 0x02]);
        let (result, _, _) = harness.run(|ctx| service.handle_command(&command, ctx));

        assert!(result.is_ok());
        assert!(harness.records.is_empty());
        assert_eq!(service.records_delivered(), 0);
    }

    #[test]
    fn test_realtime_toggle_sends_once() {
        let mut harness = Harness::new();
        let mut service = HealthService::new();
        let (_, outbox, _) = harness.run(|ctx| {
            service.enable_realtime_stats(true, ctx);
            service.enable_realtime_stats(true, ctx);
            service.enable_realtime_stats(false, ctx);
        });
        let subtypes: Vec<u8> = outbox.iter().map(|c| c.subtype).collect();
        assert_eq!(subtypes, vec![REALTIME_START, REALTIME_STOP]);
        assert!(!service.realtime_enabled());
    }

    #[test]
    fn test_spo2_config_claimed() {
        let mut harness = Harness::new();
        let mut service = HealthService::new();
        let (claimed, outbox, _) =
            harness.run(|ctx| service.on_send_configuration(keys::SPO2_LOW_ALERT_THRESHOLD, ctx));
        assert!(claimed);
        assert_eq!(outbox[0].key(), (COMMAND_TYPE, SPO2_CONFIG));
    }
}
