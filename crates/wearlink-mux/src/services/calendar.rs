//! Calendar event sync.

use std::any::Any;

use tracing::debug;
use wearlink_common::keys;

use crate::envelope::Command;
use crate::error::MuxError;
use crate::proto;
use crate::service::{Service, ServiceContext};
use crate::telemetry::DeviceEvent;

pub const COMMAND_TYPE: u8 = 14;

/// Full list of upcoming events. The device sends it empty to ask for one.
pub const SYNC: u8 = 1;
pub const ADD: u8 = 2;
pub const DELETE: u8 = 3;

/// Events the device can hold.
pub const MAX_EVENTS: usize = 50;

#[derive(Debug, Default)]
pub struct CalendarService {
    events: Vec<proto::CalendarEvent>,
}

impl CalendarService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the host's event list without sending it.
    pub fn set_events(&mut self, events: Vec<proto::CalendarEvent>) {
        self.events = events;
    }

    pub fn add_event(&mut self, event: proto::CalendarEvent, ctx: &mut ServiceContext<'_>) {
        self.events.retain(|e| e.id != event.id);
        if self.sync_enabled(ctx) {
            ctx.send_message(COMMAND_TYPE, ADD, &event);
        }
        self.events.push(event);
    }

    pub fn delete_event(&mut self, id: u64, ctx: &mut ServiceContext<'_>) {
        self.events.retain(|e| e.id != id);
        if self.sync_enabled(ctx) {
            ctx.send_message(COMMAND_TYPE, DELETE, &proto::CalendarEventId { id });
        }
    }

    /// Send every event that has not ended yet, earliest first.
    pub fn sync(&mut self, ctx: &mut ServiceContext<'_>) {
        if !self.sync_enabled(ctx) {
            return;
        }
        let now = ctx.clock().now_unix();
        let mut upcoming: Vec<_> = self.events.iter().filter(|e| e.end >= now).cloned().collect();
        upcoming.sort_by_key(|e| e.start);
        upcoming.truncate(MAX_EVENTS);
        debug!("calendar: syncing {} events", upcoming.len());
        ctx.send_message(COMMAND_TYPE, SYNC, &proto::CalendarSync { events: upcoming });
    }

    fn sync_enabled(&self, ctx: &ServiceContext<'_>) -> bool {
        ctx.prefs().get_bool(keys::SYNC_CALENDAR, false)
    }
}

impl Service for CalendarService {
    fn command_type(&self) -> u8 {
        COMMAND_TYPE
    }

    fn name(&self) -> &'static str {
        "calendar"
    }

    fn handle_command(
        &mut self,
        command: &Command,
        ctx: &mut ServiceContext<'_>,
    ) -> Result<(), MuxError> {
        match command.subtype {
            SYNC => {
                ctx.emit(DeviceEvent::CalendarSyncRequested);
                self.sync(ctx);
            }
            _ => super::unhandled(self.name(), command),
        }
        Ok(())
    }

    fn on_send_configuration(&mut self, key: &str, ctx: &mut ServiceContext<'_>) -> bool {
        if key != keys::SYNC_CALENDAR {
            return false;
        }
        if self.sync_enabled(ctx) {
            self.sync(ctx);
        } else {
            // Clear what the device still holds.
            ctx.send_message(COMMAND_TYPE, SYNC, &proto::CalendarSync::default());
        }
        true
    }

    fn on_set_time(&mut self, ctx: &mut ServiceContext<'_>) {
        self.sync(ctx);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
