//! Error types for wearlink-mux.

use thiserror::Error;

/// Errors decoding a command envelope.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Fewer bytes than the header or declared payload needs.
    #[error("Envelope truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// Bytes left over after the declared payload.
    #[error("Envelope has {0} trailing bytes")]
    TrailingBytes(usize),

    /// A type or subtype does not fit in one byte.
    #[error("Envelope {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: u32 },

    /// Payload too large for the length field.
    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Protobuf decoding failed.
    #[error("Protobuf decode error: {0}")]
    Protobuf(String),
}

impl From<prost::DecodeError> for EnvelopeError {
    fn from(err: prost::DecodeError) -> Self {
        EnvelopeError::Protobuf(err.to_string())
    }
}

/// Errors raised by the command multiplexer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MuxError {
    /// An envelope could not be encoded or decoded.
    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// Two services claimed the same command type.
    #[error("Duplicate service for command type {0}")]
    DuplicateService(u8),

    /// The session has not completed its handshake.
    #[error("Session not ready")]
    NotReady,

    /// Services were already initialized on this connection.
    #[error("Services already initialized")]
    AlreadyInitialized,

    /// Writing to the command channel failed.
    #[error("Channel error: {0}")]
    Channel(String),

    /// No service of the requested kind is registered.
    #[error("Service not registered: {0}")]
    ServiceNotRegistered(&'static str),
}
