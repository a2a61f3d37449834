//! Alarms, reminders and world clocks.

use std::any::Any;

use tracing::warn;

use crate::envelope::Command;
use crate::error::MuxError;
use crate::proto;
use crate::service::{Service, ServiceContext};
use crate::telemetry::DeviceEvent;

pub const COMMAND_TYPE: u8 = 17;

/// Host asks for the alarm table; the device answers on the same subtype.
pub const ALARMS_GET: u8 = 0;
pub const ALARMS_SET: u8 = 1;
pub const REMINDERS: u8 = 6;
pub const WORLD_CLOCKS: u8 = 7;

/// Alarm slots the device offers.
pub const MAX_ALARMS: usize = 10;
pub const MAX_REMINDERS: usize = 50;
pub const MAX_WORLD_CLOCKS: usize = 20;

#[derive(Debug, Default)]
pub struct ScheduleService {
    alarms: Vec<proto::Alarm>,
    reminders: Vec<proto::Reminder>,
    world_clocks: Vec<String>,
}

impl ScheduleService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alarms(&self) -> &[proto::Alarm] {
        &self.alarms
    }

    /// Replace the alarm table. Slots are renumbered in order.
    pub fn set_alarms(&mut self, alarms: Vec<proto::Alarm>, ctx: &mut ServiceContext<'_>) {
        self.alarms = truncate("alarms", alarms, MAX_ALARMS);
        for (slot, alarm) in self.alarms.iter_mut().enumerate() {
            alarm.slot = slot as u32;
        }
        let message = proto::AlarmList {
            alarms: self.alarms.clone(),
        };
        ctx.send_message(COMMAND_TYPE, ALARMS_SET, &message);
    }

    pub fn set_reminders(&mut self, reminders: Vec<proto::Reminder>, ctx: &mut ServiceContext<'_>) {
        self.reminders = truncate("reminders", reminders, MAX_REMINDERS);
        let message = proto::ReminderList {
            reminders: self.reminders.clone(),
        };
        ctx.send_message(COMMAND_TYPE, REMINDERS, &message);
    }

    pub fn set_world_clocks(&mut self, zones: Vec<String>, ctx: &mut ServiceContext<'_>) {
        self.world_clocks = truncate("world clocks", zones, MAX_WORLD_CLOCKS);
        let message = proto::WorldClocks {
            zones: self.world_clocks.clone(),
        };
        ctx.send_message(COMMAND_TYPE, WORLD_CLOCKS, &message);
    }
}

fn truncate<T>(what: &str, mut items: Vec<T>, max: usize) -> Vec<T> {
    if items.len() > max {
        warn!("schedule: {} {} exceed {} slots, extra dropped", items.len(), what, max);
        items.truncate(max);
    }
    items
}

impl Service for ScheduleService {
    fn command_type(&self) -> u8 {
        COMMAND_TYPE
    }

    fn name(&self) -> &'static str {
        "schedule"
    }

    fn initialize(&mut self, ctx: &mut ServiceContext<'_>) {
        ctx.send(COMMAND_TYPE, ALARMS_GET, Vec::new());
    }

    fn handle_command(
        &mut self,
        command: &Command,
        ctx: &mut ServiceContext<'_>,
    ) -> Result<(), MuxError> {
        match command.subtype {
            ALARMS_GET => {
                let list: proto::AlarmList = command.decode_payload()?;
                self.alarms = truncate("alarms", list.alarms, MAX_ALARMS);
                ctx.emit(DeviceEvent::AlarmsReported(self.alarms.clone()));
            }
            _ => super::unhandled(self.name(), command),
        }
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
