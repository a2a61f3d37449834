//! Error types for wearlink-packet.

use thiserror::Error;

/// Errors that can occur during packet operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PacketError {
    /// Invalid packet format.
    #[error("Invalid packet format: {0}")]
    InvalidFormat(String),

    /// Decode error at a specific offset.
    #[error("Decode error at offset {offset}: {message}")]
    DecodeError {
        /// Byte offset where the error occurred.
        offset: usize,
        /// Description of the error.
        message: String,
    },

    /// Packet too large.
    #[error("Packet too large: {size} bytes (max {max})")]
    TooLarge {
        /// Actual size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Frame checksum mismatch.
    #[error("Checksum mismatch: expected {expected:04X}, got {actual:04X}")]
    ChecksumMismatch {
        /// Checksum carried by the frame.
        expected: u16,
        /// Checksum computed over the frame.
        actual: u16,
    },

    /// A slice arrived out of sequence.
    #[error("Slice out of order: expected {expected}, got {actual}")]
    OutOfOrderSlice {
        /// Index the reassembler was waiting for.
        expected: u8,
        /// Index carried by the slice.
        actual: u8,
    },

    /// Unknown slice flag.
    #[error("Invalid slice flag: {0}")]
    InvalidSliceFlag(u8),

    /// Missing required TLV tag.
    #[error("Missing required tag: 0x{0:02X}")]
    MissingTag(u8),

    /// The device answered with an error code.
    #[error("Device returned error 0x{0:06X}")]
    DeviceError(u32),

    /// Payload encryption or decryption failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl PacketError {
    /// Create a decode error at a specific offset.
    pub fn decode_at(offset: usize, message: impl Into<String>) -> Self {
        PacketError::DecodeError {
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        PacketError::InvalidFormat(message.into())
    }
}

/// Errors raised by payload cryptography.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encrypt(String),

    /// Decryption or authentication failed.
    #[error("Decryption failed: {0}")]
    Decrypt(String),

    /// Nonce has the wrong length.
    #[error("Invalid nonce length: {0} (expected 12)")]
    InvalidNonce(usize),

    /// No session key is available.
    #[error("No session key established")]
    MissingKey,

    /// Key agreement could not produce a key.
    #[error("Key agreement failed: {0}")]
    KeyAgreement(String),

    /// A peer's challenge digest did not verify.
    #[error("Challenge digest mismatch")]
    DigestMismatch,
}
