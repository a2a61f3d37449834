//! Carries command envelopes over an authenticated device session.
//!
//! Each envelope travels as the body of one [`ENVELOPE`] packet under
//! [`TAG_ENVELOPE`]. Outbound envelopes are posted through the session queue,
//! so they are rejected until the handshake completes and encrypted after it.
//! [`SessionLink`] follows the session state: when the session turns ready
//! the multiplexer initializes its services, and unsolicited envelope packets
//! are dispatched to them.

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use wearlink_engine::{Request, SessionHandle, SessionState};
use wearlink_packet::{Packet, Tlv};

use crate::channel::CommandChannel;
use crate::envelope::EnvelopeCodec;
use crate::error::MuxError;
use crate::mux::{CommandMultiplexer, Dispatch};
use crate::telemetry::DeviceEvent;

pub const ENVELOPE_SERVICE_ID: u8 = 0x30;
pub const ENVELOPE_COMMAND_ID: u8 = 0x01;
pub const ENVELOPE: (u8, u8) = (ENVELOPE_SERVICE_ID, ENVELOPE_COMMAND_ID);

pub const TAG_ENVELOPE: u8 = 0x01;

/// Wrap one encoded envelope in a session request that expects no response.
pub fn envelope_request(envelope: Vec<u8>) -> Request {
    Request::raw(
        "envelope",
        ENVELOPE_SERVICE_ID,
        ENVELOPE_COMMAND_ID,
        Tlv::new().put_bytes(TAG_ENVELOPE, envelope),
    )
    .no_response()
}

/// The envelope a packet carries, if it is an envelope packet.
pub fn envelope_payload(packet: &Packet) -> Option<&[u8]> {
    if packet.key() != ENVELOPE {
        return None;
    }
    packet.tlv.get_bytes(TAG_ENVELOPE)
}

/// [`CommandChannel`] writing through a driven session.
#[derive(Debug, Clone)]
pub struct SessionChannel {
    handle: SessionHandle,
}

impl SessionChannel {
    pub fn new(handle: SessionHandle) -> Self {
        Self { handle }
    }
}

impl CommandChannel for SessionChannel {
    fn write(&mut self, bytes: Vec<u8>) -> Result<(), MuxError> {
        self.handle
            .post(envelope_request(bytes))
            .map_err(|e| MuxError::Channel(e.to_string()))
    }
}

// ============================================================================
// Link
// ============================================================================

/// Couples a multiplexer to the session carrying its channel.
pub struct SessionLink<C, E> {
    mux: CommandMultiplexer<C, E>,
    states: watch::Receiver<SessionState>,
    unsolicited: mpsc::UnboundedReceiver<Packet>,
    events: Option<mpsc::UnboundedSender<DeviceEvent>>,
}

impl<C: CommandChannel, E: EnvelopeCodec> SessionLink<C, E> {
    /// `states` and `unsolicited` come from the
    /// [`SessionDriver`](wearlink_engine::SessionDriver) owning the session.
    pub fn new(
        mux: CommandMultiplexer<C, E>,
        states: watch::Receiver<SessionState>,
        unsolicited: mpsc::UnboundedReceiver<Packet>,
    ) -> Self {
        Self {
            mux,
            states,
            unsolicited,
            events: None,
        }
    }

    /// Forward service events here instead of keeping them on the multiplexer.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<DeviceEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn mux(&self) -> &CommandMultiplexer<C, E> {
        &self.mux
    }

    pub fn mux_mut(&mut self) -> &mut CommandMultiplexer<C, E> {
        &mut self.mux
    }

    /// Apply a session state, initializing the services when it turns ready.
    pub fn on_state(&mut self, state: SessionState) {
        if self.mux.on_session_state(state) && !self.mux.is_initialized() {
            if let Err(e) = self.mux.initialize() {
                warn!(
                    "SessionLink[{}]: initialization failed: {}",
                    self.mux.labels().device,
                    e
                );
            }
        }
        self.forward_events();
    }

    /// Dispatch an unsolicited packet if it carries an envelope.
    pub fn on_packet(&mut self, packet: &Packet) -> Option<Dispatch> {
        let Some(envelope) = envelope_payload(packet) else {
            debug!(
                "SessionLink[{}]: ignoring unsolicited {}",
                self.mux.labels().device,
                packet
            );
            return None;
        };
        if !self.mux.is_session_ready() {
            warn!(
                "SessionLink[{}]: envelope before the session is ready, dropping",
                self.mux.labels().device
            );
            return None;
        }
        let outcome = self.mux.dispatch_inbound(envelope);
        self.forward_events();
        Some(outcome)
    }

    fn forward_events(&mut self) {
        let Some(events) = &self.events else {
            return;
        };
        for event in self.mux.drain_events() {
            // A closed receiver means the host stopped listening.
            let _ = events.send(event);
        }
    }

    /// Follow the session until it ends, then hand the multiplexer back.
    pub async fn run(mut self) -> CommandMultiplexer<C, E> {
        let initial = *self.states.borrow_and_update();
        self.on_state(initial);

        loop {
            tokio::select! {
                biased;
                changed = self.states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *self.states.borrow_and_update();
                    self.on_state(state);
                }
                packet = self.unsolicited.recv() => match packet {
                    Some(packet) => {
                        self.on_packet(&packet);
                    }
                    None => break,
                },
            }
        }

        debug!("SessionLink[{}]: session ended", self.mux.labels().device);
        self.on_state(SessionState::Closed);
        self.mux
    }
}
