//! Error types for wearlink-engine.

use thiserror::Error;
use wearlink_packet::{CryptoError, PacketError};

use crate::{ResponseKind, SessionState};

/// Errors raised by a transport write.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The link is gone.
    #[error("Transport closed")]
    Closed,

    /// The write failed.
    #[error("Transport write failed: {0}")]
    Write(String),
}

/// Why a single request failed.
///
/// Every variant is local to one request; the session keeps running.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    /// The request could not be serialized, encrypted or sliced.
    #[error("Request creation failed: {0}")]
    Creation(PacketError),

    /// The device answered with a different response variant.
    #[error("Response type mismatch: expected {expected}, got {actual}")]
    ResponseTypeMismatch {
        /// Variant the request declared.
        expected: ResponseKind,
        /// Variant the device sent.
        actual: ResponseKind,
    },

    /// The response could not be decrypted.
    #[error("Crypto error: {0}")]
    Crypto(CryptoError),

    /// No response arrived within the response window.
    #[error("Request timed out")]
    Timeout,

    /// The session was closed before the request resolved.
    #[error("Session closed")]
    SessionClosed,

    /// The session has not finished its handshake.
    #[error("Session not ready")]
    NotReady,

    /// Writing the request failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Another request in the same transaction failed to build.
    #[error("Transaction aborted")]
    BatchAborted,
}

impl RequestError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            RequestError::Creation(_) => "creation",
            RequestError::ResponseTypeMismatch { .. } => "mismatch",
            RequestError::Crypto(_) => "crypto",
            RequestError::Timeout => "timeout",
            RequestError::SessionClosed => "closed",
            RequestError::NotReady => "not_ready",
            RequestError::Transport(_) => "transport",
            RequestError::BatchAborted => "batch_aborted",
        }
    }
}

/// Why the session handshake failed.
///
/// A failed handshake leaves the session [`SessionState::Failed`]; the caller
/// reconnects with a new session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// A handshake step got an unexpected response.
    #[error("Response type mismatch: expected {expected}, got {actual}")]
    ResponseTypeMismatch {
        expected: ResponseKind,
        actual: ResponseKind,
    },

    /// Key agreement or digest verification failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A handshake step was not answered in time.
    #[error("Handshake timed out")]
    Timeout,

    /// The session was closed during the handshake.
    #[error("Session closed")]
    SessionClosed,

    /// Writing a handshake request failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A handshake packet could not be built or parsed.
    #[error("Packet error: {0}")]
    Packet(PacketError),

    /// The handshake was started from a state other than disconnected.
    #[error("Cannot start handshake in state {0}")]
    InvalidState(SessionState),
}

impl HandshakeError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            HandshakeError::ResponseTypeMismatch { .. } => "mismatch",
            HandshakeError::Crypto(_) => "crypto",
            HandshakeError::Timeout => "timeout",
            HandshakeError::SessionClosed => "closed",
            HandshakeError::Transport(_) => "transport",
            HandshakeError::Packet(_) => "packet",
            HandshakeError::InvalidState(_) => "invalid_state",
        }
    }
}

impl From<RequestError> for HandshakeError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Creation(PacketError::Crypto(e)) => HandshakeError::Crypto(e),
            RequestError::Creation(e) => HandshakeError::Packet(e),
            RequestError::ResponseTypeMismatch { expected, actual } => {
                HandshakeError::ResponseTypeMismatch { expected, actual }
            }
            RequestError::Crypto(e) => HandshakeError::Crypto(e),
            RequestError::Timeout => HandshakeError::Timeout,
            RequestError::Transport(e) => HandshakeError::Transport(e),
            RequestError::SessionClosed | RequestError::NotReady | RequestError::BatchAborted => {
                HandshakeError::SessionClosed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_maps_to_handshake_error() {
        assert_eq!(
            HandshakeError::from(RequestError::Timeout),
            HandshakeError::Timeout
        );
        assert_eq!(
            HandshakeError::from(RequestError::Creation(PacketError::Crypto(
                CryptoError::MissingKey
            ))),
            HandshakeError::Crypto(CryptoError::MissingKey)
        );
        assert_eq!(
            HandshakeError::from(RequestError::ResponseTypeMismatch {
                expected: ResponseKind::LinkParams,
                actual: ResponseKind::Raw,
            }),
            HandshakeError::ResponseTypeMismatch {
                expected: ResponseKind::LinkParams,
                actual: ResponseKind::Raw,
            }
        );
    }

    #[test]
    fn test_error_display() {
        let err = RequestError::ResponseTypeMismatch {
            expected: ResponseKind::Ack,
            actual: ResponseKind::DeviceError,
        };
        assert_eq!(
            err.to_string(),
            "Response type mismatch: expected ack, got device_error"
        );
        assert_eq!(err.reason(), "mismatch");
    }
}
