//! Now-playing info pushed to the device, media buttons coming back.

use std::any::Any;

use crate::envelope::Command;
use crate::error::MuxError;
use crate::proto::{self, PlaybackState};
use crate::service::{Service, ServiceContext};
use crate::telemetry::DeviceEvent;

pub const COMMAND_TYPE: u8 = 18;

/// Host -> device now-playing info. An empty request from the device asks
/// for it again.
pub const INFO: u8 = 0;
/// Device -> host media button.
pub const MEDIA_KEY: u8 = 1;
/// Both directions, percent.
pub const VOLUME: u8 = 2;

#[derive(Debug, Default)]
pub struct MusicService {
    info: proto::MusicInfo,
}

impl MusicService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self) -> &proto::MusicInfo {
        &self.info
    }

    pub fn set_track(
        &mut self,
        track: &str,
        artist: &str,
        album: &str,
        duration_s: u32,
        ctx: &mut ServiceContext<'_>,
    ) {
        self.info.track = track.to_string();
        self.info.artist = artist.to_string();
        self.info.album = album.to_string();
        self.info.duration_s = duration_s;
        self.info.position_s = 0;
        self.send_info(ctx);
    }

    pub fn set_state(&mut self, state: PlaybackState, position_s: u32, ctx: &mut ServiceContext<'_>) {
        self.info.set_state(state);
        self.info.position_s = position_s;
        self.send_info(ctx);
    }

    /// The phone's volume changed.
    pub fn set_phone_volume(&mut self, level: u8, ctx: &mut ServiceContext<'_>) {
        let level = u32::from(level.min(100));
        self.info.volume = level;
        ctx.send_message(COMMAND_TYPE, VOLUME, &proto::Volume { level });
    }

    fn send_info(&self, ctx: &mut ServiceContext<'_>) {
        ctx.send_message(COMMAND_TYPE, INFO, &self.info);
    }
}

impl Service for MusicService {
    fn command_type(&self) -> u8 {
        COMMAND_TYPE
    }

    fn name(&self) -> &'static str {
        "music"
    }

    fn handle_command(
        &mut self,
        command: &Command,
        ctx: &mut ServiceContext<'_>,
    ) -> Result<(), MuxError> {
        match command.subtype {
            INFO => self.send_info(ctx),
            MEDIA_KEY => {
                let button: proto::MediaButton = command.decode_payload()?;
                ctx.emit(DeviceEvent::MediaButton(button.key()));
            }
            VOLUME => {
                let volume: proto::Volume = command.decode_payload()?;
                let level = volume.level.min(100);
                self.info.volume = level;
                ctx.emit(DeviceEvent::SetVolume(level as u8));
            }
            _ => super::unhandled(self.name(), command),
        }
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
