//! Authenticated session handshake.
//!
//! 1. LinkParams (self-queued, plaintext): the device reports protocol
//!    version, auth mode, slice size, MTU, bond state and an 18-byte server
//!    nonce.
//! 2. Auth (self-queued, plaintext): a [`KeyAgreement`] derives the session
//!    key; we send our nonce and a digest over both nonces, and the device
//!    answers with its own digest, which must verify.
//!
//! Only then does the session become ready. Any failure leaves it failed;
//! nonces are single-use, so the caller reconnects with a new session.

use tracing::{debug, trace, warn};
use wearlink_metrics::metric_defs;
use wearlink_packet::{
    challenge_digest, derive_session_key, random_bytes, verify_digest, CryptoError, PacketError,
    SessionKey,
};

use crate::commands::device_config::{self, LinkParams};
use crate::request::{completion, Completer, Completion};
use crate::session::Waiter;
use crate::{DeviceSession, HandshakeError, Request, RequestError, Response, ResponseKind};
use crate::{SessionParams, SessionState, Transport};

/// Client nonce length.
pub const CLIENT_NONCE_LEN: usize = 16;

/// Completion of a handshake.
pub type HandshakeHandle = Completion<SessionParams, HandshakeError>;

/// Derives the session key from the negotiated nonces.
pub trait KeyAgreement: Send {
    fn derive_key(
        &mut self,
        auth_mode: u8,
        client_nonce: &[u8],
        server_nonce: &[u8],
    ) -> Result<SessionKey, CryptoError>;
}

impl<K: KeyAgreement + ?Sized> KeyAgreement for Box<K> {
    fn derive_key(
        &mut self,
        auth_mode: u8,
        client_nonce: &[u8],
        server_nonce: &[u8],
    ) -> Result<SessionKey, CryptoError> {
        (**self).derive_key(auth_mode, client_nonce, server_nonce)
    }
}

/// Shared secret hashed with the auth mode and both nonces (BLAKE2s).
#[derive(Clone)]
pub struct Blake2KeyAgreement {
    secret: Vec<u8>,
}

impl Blake2KeyAgreement {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Blake2KeyAgreement {
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for Blake2KeyAgreement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blake2KeyAgreement").finish_non_exhaustive()
    }
}

impl KeyAgreement for Blake2KeyAgreement {
    fn derive_key(
        &mut self,
        auth_mode: u8,
        client_nonce: &[u8],
        server_nonce: &[u8],
    ) -> Result<SessionKey, CryptoError> {
        if self.secret.is_empty() {
            return Err(CryptoError::KeyAgreement("empty shared secret".to_string()));
        }
        Ok(derive_session_key(
            &self.secret,
            auth_mode,
            client_nonce,
            server_nonce,
        ))
    }
}

/// Handshake step a self-queued request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandshakeStep {
    LinkParams,
    Auth,
}

impl HandshakeStep {
    fn expected(self) -> ResponseKind {
        match self {
            HandshakeStep::LinkParams => ResponseKind::LinkParams,
            HandshakeStep::Auth => ResponseKind::Auth,
        }
    }
}

/// State of a running handshake.
pub(crate) struct Handshake {
    agreement: Box<dyn KeyAgreement>,
    completer: Completer<SessionParams, HandshakeError>,
    client_nonce: [u8; CLIENT_NONCE_LEN],
    link: Option<LinkParams>,
    key: Option<SessionKey>,
}

impl Handshake {
    /// Report the session closing to the waiter.
    pub(crate) fn abort(self) {
        self.completer.complete(Err(HandshakeError::SessionClosed));
    }
}

impl std::fmt::Debug for Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshake")
            .field("link", &self.link)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> DeviceSession<T> {
    /// Start the handshake. Only valid on a new session.
    pub fn start_handshake(&mut self, agreement: impl KeyAgreement + 'static) -> HandshakeHandle {
        let (completer, handle) = completion();
        if self.state != SessionState::Disconnected {
            warn!(
                "DeviceSession[{}]: handshake requested in state {}",
                self.labels.device, self.state
            );
            completer.complete(Err(HandshakeError::InvalidState(self.state)));
            return handle;
        }

        debug!("DeviceSession[{}]: starting handshake", self.labels.device);
        self.state = SessionState::Handshaking;
        self.handshake = Some(Handshake {
            agreement: Box::new(agreement),
            completer,
            client_nonce: random_bytes(),
            link: None,
            key: None,
        });
        self.send_handshake_request(device_config::get_link_params(), HandshakeStep::LinkParams);
        handle
    }

    fn send_handshake_request(&mut self, request: Request, step: HandshakeStep) {
        match self.build(request.self_queued()) {
            Ok(built) => {
                let timeout = self.config.handshake_timeout();
                self.enqueue(built, Waiter::Handshake(step), timeout);
            }
            Err(e) => {
                if let Some(handshake) = self.handshake.take() {
                    self.fail_handshake(handshake, e.into());
                }
            }
        }
    }

    /// Advance the handshake with the result of one of its requests.
    pub(crate) fn on_handshake_step(
        &mut self,
        step: HandshakeStep,
        result: Result<Response, RequestError>,
    ) {
        // Aborted by disconnect or an earlier failure.
        let Some(mut handshake) = self.handshake.take() else {
            return;
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => return self.fail_handshake(handshake, e.into()),
        };

        match (step, response) {
            (HandshakeStep::LinkParams, Response::LinkParams(link)) => {
                trace!(
                    "DeviceSession[{}]: server nonce {}",
                    self.labels.device,
                    hex::encode(&link.server_nonce)
                );
                let key = match handshake.agreement.derive_key(
                    link.auth_mode,
                    &handshake.client_nonce,
                    &link.server_nonce,
                ) {
                    Ok(key) => key,
                    Err(e) => return self.fail_handshake(handshake, e.into()),
                };
                let digest = challenge_digest(&key, &handshake.client_nonce, &link.server_nonce);
                let client_nonce = handshake.client_nonce.to_vec();
                debug!(
                    "DeviceSession[{}]: link params v{} auth mode {} slice {} mtu {}",
                    self.labels.device,
                    link.protocol_version,
                    link.auth_mode,
                    link.slice_size,
                    link.mtu
                );
                handshake.link = Some(link);
                handshake.key = Some(key);
                self.handshake = Some(handshake);
                self.send_handshake_request(
                    device_config::auth(digest.to_vec(), client_nonce),
                    HandshakeStep::Auth,
                );
            }
            (HandshakeStep::Auth, Response::Auth { digest }) => {
                let (Some(link), Some(key)) = (handshake.link.take(), handshake.key.take()) else {
                    let err = PacketError::invalid_format("auth answer before link params");
                    return self.fail_handshake(handshake, HandshakeError::Packet(err));
                };
                if let Err(e) =
                    verify_digest(&key, &link.server_nonce, &handshake.client_nonce, &digest)
                {
                    return self.fail_handshake(handshake, e.into());
                }
                let params = SessionParams {
                    link,
                    client_nonce: handshake.client_nonce.to_vec(),
                };
                self.complete_handshake(handshake, params, key);
            }
            (step, response) => {
                let err = HandshakeError::ResponseTypeMismatch {
                    expected: step.expected(),
                    actual: response.kind(),
                };
                self.fail_handshake(handshake, err);
            }
        }
    }

    fn complete_handshake(&mut self, handshake: Handshake, params: SessionParams, key: SessionKey) {
        debug!(
            "DeviceSession[{}]: handshake complete, auth version {}",
            self.labels.device,
            params.auth_version()
        );
        metrics::counter!(metric_defs::HANDSHAKE_COMPLETED.name, &self.labels.to_labels())
            .increment(1);
        self.params = Some(params.clone());
        self.key = Some(key);
        self.state = SessionState::Ready;
        handshake.completer.complete(Ok(params));
    }

    fn fail_handshake(&mut self, handshake: Handshake, err: HandshakeError) {
        warn!("DeviceSession[{}]: handshake failed: {}", self.labels.device, err);
        metrics::counter!(
            metric_defs::HANDSHAKE_FAILED.name,
            &self.labels.with(&[("reason", err.reason().to_string())])
        )
        .increment(1);
        if self.state == SessionState::Handshaking {
            self.state = SessionState::Failed;
        }
        self.drop_handshake_requests();
        self.reset_link();
        handshake.completer.complete(Err(err));
    }
}
