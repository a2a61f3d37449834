//! Authenticated handshake against a simulated device.

mod support;

use std::time::Instant;

use support::*;
use wearlink_engine::commands::{device_config, fitness};
use wearlink_engine::{
    Blake2KeyAgreement, HandshakeError, KeyAgreement, RequestError, ResponseKind, SessionState,
};
use wearlink_packet::{CryptoError, SessionKey, Tlv};

/// Key agreement that always fails.
struct BrokenAgreement;

impl KeyAgreement for BrokenAgreement {
    fn derive_key(&mut self, _: u8, _: &[u8], _: &[u8]) -> Result<SessionKey, CryptoError> {
        Err(CryptoError::KeyAgreement("no secure element".to_string()))
    }
}

#[test]
fn test_handshake_negotiates_parameters() {
    let mut device = SimulatedDevice::new(SECRET);
    let (session, _outbound, params) = ready_session(&mut device);

    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(params.protocol_version(), 2);
    assert_eq!(params.slice_size(), 64);
    assert_eq!(params.mtu(), 247);
    assert_eq!(params.auth_version(), 2);
    assert_eq!(params.auth_mode(), 2);
    assert_eq!(params.bond_state(), 1);
    assert_eq!(params.client_nonce.len(), 16);
    assert_eq!(session.params(), Some(&params));
    assert_eq!(device.client_verified, Some(true));
}

#[test]
fn test_requests_after_handshake_are_encrypted() {
    let mut device = SimulatedDevice::new(SECRET);
    device.auto_ack = true;
    let (mut session, mut outbound, _) = ready_session(&mut device);

    let prefs = wearlink_common::MemoryPreferences::new();
    let mut handle = session.submit(device_config::set_date_format(prefs.clone(), true));

    let frame = outbound.try_recv().unwrap();
    let mut reassembler = wearlink_packet::SliceReassembler::default();
    reassembler.push(&frame);
    let wire = wearlink_packet::Packet::decode(&reassembler.next_packet().unwrap().unwrap()).unwrap();
    assert!(wire.is_encrypted());

    for reply in device.handle_frame(&frame) {
        session.on_receive(&reply);
    }
    assert_eq!(handle.try_result(), Some(Ok(wearlink_engine::Response::Ack)));
    assert_eq!(device.count(device_config::DATE_FORMAT), 1);
}

#[test]
fn test_requests_before_ready_rejected() {
    let (mut session, mut outbound) = new_session();
    let mut early = session.submit(fitness::set_automatic_spo(
        &wearlink_common::MemoryPreferences::new(),
    ));
    assert_eq!(early.try_result(), Some(Err(RequestError::NotReady)));
    assert!(outbound.try_recv().is_err());

    let _handshake = session.start_handshake(Blake2KeyAgreement::new(SECRET));
    assert_eq!(session.state(), SessionState::Handshaking);
    let mut during = session.submit(device_config::get_link_params());
    assert_eq!(during.try_result(), Some(Err(RequestError::NotReady)));
}

#[test]
fn test_wrong_secret_fails_digest() {
    let mut device = SimulatedDevice::new(b"some other secret");
    let (mut session, mut outbound) = new_session();

    let result = run_handshake(&mut session, &mut outbound, &mut device);
    assert_eq!(result, Err(HandshakeError::Crypto(CryptoError::DigestMismatch)));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(device.client_verified, Some(false));
    assert!(session.params().is_none());
}

#[test]
fn test_key_agreement_failure_aborts() {
    let mut device = SimulatedDevice::new(SECRET);
    let (mut session, mut outbound) = new_session();

    let mut handle = session.start_handshake(BrokenAgreement);
    device.pump(&mut session, &mut outbound);

    assert_eq!(
        handle.try_result(),
        Some(Err(HandshakeError::Crypto(CryptoError::KeyAgreement(
            "no secure element".to_string()
        ))))
    );
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(device.count(device_config::AUTH), 0);

    let mut after = session.submit(device_config::set_date_format(
        wearlink_common::MemoryPreferences::new(),
        true,
    ));
    assert_eq!(after.try_result(), Some(Err(RequestError::NotReady)));
    assert!(outbound.try_recv().is_err());
    assert_eq!(device.count(device_config::DATE_FORMAT), 0);
}

#[test]
fn test_dispatch_resumes_only_after_new_handshake() {
    let mut broken_device = SimulatedDevice::new(SECRET);
    let (mut broken, mut broken_outbound) = new_session();
    let _ = broken.start_handshake(BrokenAgreement);
    broken_device.pump(&mut broken, &mut broken_outbound);
    assert_eq!(broken.state(), SessionState::Failed);

    let mut device = SimulatedDevice::new(SECRET);
    device.auto_ack = true;
    let (mut session, mut outbound) = new_session();
    let mut handshake = session.start_handshake(Blake2KeyAgreement::new(SECRET));
    let mut early = session.submit(device_config::set_date_format(
        wearlink_common::MemoryPreferences::new(),
        true,
    ));
    assert_eq!(early.try_result(), Some(Err(RequestError::NotReady)));

    device.pump(&mut session, &mut outbound);
    assert!(matches!(handshake.try_result(), Some(Ok(_))));
    assert_eq!(device.count(device_config::DATE_FORMAT), 0);

    let mut handle = session.submit(device_config::set_date_format(
        wearlink_common::MemoryPreferences::new(),
        true,
    ));
    device.pump(&mut session, &mut outbound);
    assert_eq!(handle.try_result(), Some(Ok(wearlink_engine::Response::Ack)));
    assert_eq!(device.count(device_config::DATE_FORMAT), 1);
    assert!(broken_outbound.try_recv().is_err());
}

#[test]
fn test_link_params_wrong_shape() {
    let mut device = SimulatedDevice::new(SECRET);
    device.link_params_override = Some(Tlv::new().put_u8(device_config::TAG_PROTOCOL_VERSION, 2));
    let (mut session, mut outbound) = new_session();

    let result = run_handshake(&mut session, &mut outbound, &mut device);
    assert_eq!(
        result,
        Err(HandshakeError::ResponseTypeMismatch {
            expected: ResponseKind::LinkParams,
            actual: ResponseKind::Raw,
        })
    );
    assert_eq!(session.state(), SessionState::Failed);
}

#[test]
fn test_handshake_timeout() {
    let (mut session, mut outbound) = new_session();
    let mut handle = session.start_handshake(Blake2KeyAgreement::new(SECRET));
    assert!(outbound.try_recv().is_ok());

    let before = Instant::now() + session.config().response_timeout();
    assert_eq!(session.poll_timeouts(before), 0);

    let after = Instant::now() + session.config().handshake_timeout();
    assert_eq!(session.poll_timeouts(after), 1);
    assert_eq!(handle.try_result(), Some(Err(HandshakeError::Timeout)));
    assert_eq!(session.state(), SessionState::Failed);
}

#[test]
fn test_failed_session_cannot_retry() {
    let mut device = SimulatedDevice::new(b"wrong");
    let (mut session, mut outbound) = new_session();
    let _ = run_handshake(&mut session, &mut outbound, &mut device);

    let mut retry = session.start_handshake(Blake2KeyAgreement::new(SECRET));
    assert_eq!(
        retry.try_result(),
        Some(Err(HandshakeError::InvalidState(SessionState::Failed)))
    );
}

#[test]
fn test_disconnect_aborts_handshake() {
    let (mut session, _outbound) = new_session();
    let mut handle = session.start_handshake(Blake2KeyAgreement::new(SECRET));
    session.disconnect();

    assert_eq!(handle.try_result(), Some(Err(HandshakeError::SessionClosed)));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_transport_failure_fails_handshake() {
    let (mut session, outbound) = new_session();
    drop(outbound);
    let mut handle = session.start_handshake(Blake2KeyAgreement::new(SECRET));
    assert!(matches!(
        handle.try_result(),
        Some(Err(HandshakeError::Transport(_)))
    ));
    assert_eq!(session.state(), SessionState::Failed);
}
