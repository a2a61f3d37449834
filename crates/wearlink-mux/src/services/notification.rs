//! Notifications, call state and canned replies.

use std::any::Any;
use std::collections::BTreeSet;

use tracing::debug;
use wearlink_common::keys;

use crate::envelope::Command;
use crate::error::MuxError;
use crate::proto::{self, ActionKind, CallPhase, ReplyStatus, SubscriptionResult};
use crate::service::{Service, ServiceContext};
use crate::telemetry::DeviceEvent;

pub const COMMAND_TYPE: u8 = 7;

pub const POST: u8 = 0;
pub const DELETE: u8 = 1;
/// Device -> host: the user acted on a notification.
pub const ACTION: u8 = 4;
pub const CALL_STATE: u8 = 6;
/// Device -> host: accept, reject or silence a call.
pub const CALL_ACTION: u8 = 7;
/// Both directions: the device asks, the host answers with the list.
pub const CANNED_REPLIES: u8 = 9;
/// Device -> host: enable or disable forwarding; the host answers with a status.
pub const SUBSCRIPTION: u8 = 10;

#[derive(Debug)]
pub struct NotificationService {
    active: BTreeSet<u32>,
    canned_replies: Vec<String>,
    subscribed: bool,
}

impl Default for NotificationService {
    fn default() -> Self {
        Self {
            active: BTreeSet::new(),
            canned_replies: Vec::new(),
            subscribed: true,
        }
    }
}

impl NotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the device currently accepts notifications.
    pub fn subscribed(&self) -> bool {
        self.subscribed
    }

    /// Ids posted and not yet deleted or dismissed.
    pub fn active(&self) -> impl Iterator<Item = u32> + '_ {
        self.active.iter().copied()
    }

    /// Forward a notification. Dropped while the device is unsubscribed.
    pub fn post(&mut self, mut notification: proto::Notification, ctx: &mut ServiceContext<'_>) {
        if !self.subscribed {
            debug!("notification: device unsubscribed, dropping {}", notification.id);
            return;
        }
        notification.wake_screen = ctx.prefs().get_bool(keys::SCREEN_ON_ON_NOTIFICATIONS, false);
        self.active.insert(notification.id);
        ctx.send_message(COMMAND_TYPE, POST, &notification);
    }

    pub fn delete(&mut self, id: u32, ctx: &mut ServiceContext<'_>) {
        self.active.remove(&id);
        ctx.send_message(COMMAND_TYPE, DELETE, &proto::NotificationId { id });
    }

    pub fn set_call_state(
        &mut self,
        phase: CallPhase,
        number: &str,
        name: &str,
        ctx: &mut ServiceContext<'_>,
    ) {
        let message = proto::CallState {
            phase: phase as i32,
            number: number.to_string(),
            name: name.to_string(),
        };
        ctx.send_message(COMMAND_TYPE, CALL_STATE, &message);
    }

    pub fn set_canned_replies(&mut self, replies: Vec<String>, ctx: &mut ServiceContext<'_>) {
        self.canned_replies = replies;
        self.send_canned_replies(ctx);
    }

    fn subscribe(&mut self, request: proto::NotificationSubscription, ctx: &mut ServiceContext<'_>) {
        debug!("notification: device subscription {}", request.enable);
        self.subscribed = request.enable;
        ctx.emit(DeviceEvent::NotificationSubscription {
            enabled: request.enable,
        });
        let status = proto::SubscriptionStatus {
            status: ReplyStatus::Ack as i32,
            result: SubscriptionResult::Accepted as i32,
            enable: request.enable,
            flags: request.flags,
        };
        ctx.send_message(COMMAND_TYPE, SUBSCRIPTION, &status);
    }

    fn send_canned_replies(&self, ctx: &mut ServiceContext<'_>) {
        let message = proto::CannedReplies {
            replies: self.canned_replies.clone(),
        };
        ctx.send_message(COMMAND_TYPE, CANNED_REPLIES, &message);
    }
}

impl Service for NotificationService {
    fn command_type(&self) -> u8 {
        COMMAND_TYPE
    }

    fn name(&self) -> &'static str {
        "notification"
    }

    fn initialize(&mut self, ctx: &mut ServiceContext<'_>) {
        self.active.clear();
        self.subscribed = true;
        if !self.canned_replies.is_empty() {
            self.send_canned_replies(ctx);
        }
    }

    fn handle_command(
        &mut self,
        command: &Command,
        ctx: &mut ServiceContext<'_>,
    ) -> Result<(), MuxError> {
        match command.subtype {
            ACTION => {
                let action: proto::NotificationAction = command.decode_payload()?;
                let kind = action.kind();
                if kind == ActionKind::Dismiss {
                    self.active.remove(&action.id);
                }
                let reply = (kind == ActionKind::Reply && !action.reply.is_empty())
                    .then_some(action.reply);
                ctx.emit(DeviceEvent::NotificationAction {
                    id: action.id,
                    action: kind,
                    reply,
                });
            }
            CALL_ACTION => {
                let action: proto::CallAction = command.decode_payload()?;
                ctx.emit(DeviceEvent::CallAction(action.command()));
            }
            CANNED_REPLIES => {
                debug!(
                    "notification: device asked for {} canned replies",
                    self.canned_replies.len()
                );
                self.send_canned_replies(ctx);
            }
            SUBSCRIPTION => {
                let request: proto::NotificationSubscription = command.decode_payload()?;
                self.subscribe(request, ctx);
            }
            _ => super::unhandled(self.name(), command),
        }
        Ok(())
    }

    fn on_send_configuration(&mut self, key: &str, _ctx: &mut ServiceContext<'_>) -> bool {
        // Read again on the next post.
        key == keys::SCREEN_ON_ON_NOTIFICATIONS
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
