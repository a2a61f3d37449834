//! Simulated device for engine integration tests.

#![allow(dead_code)]

use std::collections::HashSet;

use tokio::sync::mpsc::UnboundedReceiver;
use wearlink_common::EngineConfig;
use wearlink_engine::commands::{device_config, fitness};
use wearlink_engine::commands::device_config::LinkParams;
use wearlink_engine::{
    Blake2KeyAgreement, ChannelTransport, DeviceSession, HandshakeError, SessionParams,
};
use wearlink_packet::{
    challenge_digest, derive_session_key, slice_packet, verify_digest, Packet, SessionKey,
    SliceReassembler, Tlv, DEVICE_OK, TAG_ERROR,
};

pub const SECRET: &[u8] = b"wearlink-test-secret";

pub type TestSession = DeviceSession<ChannelTransport>;

/// Device side of the link.
pub struct SimulatedDevice {
    pub link: LinkParams,
    secret: Vec<u8>,
    reassembler: SliceReassembler,
    pub key: Option<SessionKey>,
    /// Every packet received, decrypted.
    pub received: Vec<Packet>,
    /// Answer ordinary requests with a success status.
    pub auto_ack: bool,
    /// Commands never answered.
    pub silent: HashSet<(u8, u8)>,
    /// Encrypt replies once a key is established.
    pub encrypt_replies: bool,
    /// Answer LinkParams with this packet body instead.
    pub link_params_override: Option<Tlv>,
    /// Whether the session's auth digest verified.
    pub client_verified: Option<bool>,
}

impl SimulatedDevice {
    pub fn new(secret: &[u8]) -> Self {
        let mut server_nonce = vec![0x00, 0x02];
        server_nonce.extend_from_slice(&[0xC3; 16]);
        let mut silent = HashSet::new();
        silent.insert(fitness::ENABLE_AUTOMATIC_SPO);
        SimulatedDevice {
            link: LinkParams {
                protocol_version: 2,
                slice_size: 64,
                mtu: 247,
                auth_version: 2,
                server_nonce,
                auth_mode: 2,
                bond_state: 1,
            },
            secret: secret.to_vec(),
            reassembler: SliceReassembler::default(),
            key: None,
            received: Vec::new(),
            auto_ack: false,
            silent,
            encrypt_replies: true,
            link_params_override: None,
            client_verified: None,
        }
    }

    /// Take one frame from the session; returns reply bytes.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Vec<Vec<u8>> {
        self.reassembler.push(frame);
        let mut replies = Vec::new();
        while let Some(result) = self.reassembler.next_packet() {
            let packet = Packet::decode(&result.expect("session framing"))
                .expect("session packet")
                .decrypt(self.key.as_ref())
                .expect("session encryption");
            if let Some(reply) = self.answer(&packet) {
                replies.push(reply);
            }
            self.received.push(packet);
        }
        replies
    }

    fn answer(&mut self, packet: &Packet) -> Option<Vec<u8>> {
        match packet.key() {
            device_config::LINK_PARAMS => {
                let tlv = self
                    .link_params_override
                    .clone()
                    .unwrap_or_else(|| self.link.to_tlv());
                Some(self.frames(Packet::new(packet.service_id, packet.command_id, tlv)))
            }
            device_config::AUTH => {
                let digest = packet.tlv.get_bytes(device_config::TAG_AUTH_DIGEST)?;
                let client_nonce = packet.tlv.get_bytes(device_config::TAG_AUTH_NONCE)?;
                let key = derive_session_key(
                    &self.secret,
                    self.link.auth_mode,
                    client_nonce,
                    &self.link.server_nonce,
                );
                self.client_verified =
                    Some(verify_digest(&key, client_nonce, &self.link.server_nonce, digest).is_ok());
                let answer = challenge_digest(&key, &self.link.server_nonce, client_nonce);
                let reply = Packet::new(
                    packet.service_id,
                    packet.command_id,
                    Tlv::new().put_bytes(device_config::TAG_AUTH_DIGEST, answer.to_vec()),
                );
                let bytes = self.frames(reply);
                self.key = Some(key);
                Some(bytes)
            }
            key if self.auto_ack && !self.silent.contains(&key) => {
                Some(self.ack(packet.service_id, packet.command_id))
            }
            _ => None,
        }
    }

    /// Slice a packet, encrypting it when a key is set.
    pub fn frames(&self, packet: Packet) -> Vec<u8> {
        let packet = match (&self.key, self.encrypt_replies) {
            (Some(key), true) => packet.encrypt(key).expect("device encryption"),
            _ => packet,
        };
        slice_packet(&packet.encode(), self.link.slice_size as usize)
            .expect("device framing")
            .concat()
    }

    pub fn ack(&self, service: u8, command: u8) -> Vec<u8> {
        self.frames(Packet::new(
            service,
            command,
            Tlv::new().put_u32(TAG_ERROR, DEVICE_OK),
        ))
    }

    pub fn device_error(&self, service: u8, command: u8, code: u32) -> Vec<u8> {
        self.frames(Packet::new(service, command, Tlv::new().put_u32(TAG_ERROR, code)))
    }

    /// Drain frames the session wrote and feed replies back.
    pub fn pump(&mut self, session: &mut TestSession, outbound: &mut UnboundedReceiver<Vec<u8>>) {
        loop {
            let mut replies = Vec::new();
            while let Ok(frame) = outbound.try_recv() {
                replies.extend(self.handle_frame(&frame));
            }
            if replies.is_empty() {
                break;
            }
            for reply in replies {
                session.on_receive(&reply);
            }
        }
    }

    /// Number of packets received with this (service, command).
    pub fn count(&self, key: (u8, u8)) -> usize {
        self.received.iter().filter(|p| p.key() == key).count()
    }
}

pub fn new_session() -> (TestSession, UnboundedReceiver<Vec<u8>>) {
    let (transport, outbound) = ChannelTransport::pair();
    (DeviceSession::new(transport, EngineConfig::default()), outbound)
}

/// Session that has completed the handshake with `device`.
pub fn ready_session(
    device: &mut SimulatedDevice,
) -> (TestSession, UnboundedReceiver<Vec<u8>>, SessionParams) {
    let (mut session, mut outbound) = new_session();
    let params = run_handshake(&mut session, &mut outbound, device).expect("handshake");
    (session, outbound, params)
}

pub fn run_handshake(
    session: &mut TestSession,
    outbound: &mut UnboundedReceiver<Vec<u8>>,
    device: &mut SimulatedDevice,
) -> Result<SessionParams, HandshakeError> {
    let mut handle = session.start_handshake(Blake2KeyAgreement::new(SECRET));
    device.pump(session, outbound);
    handle
        .try_result()
        .unwrap_or(Err(HandshakeError::Timeout))
}
