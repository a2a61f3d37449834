//! Command envelopes.
//!
//! Two layouts share one [`EnvelopeCodec`] contract:
//!
//! - [`ProtobufEnvelope`]: a protobuf message with `type = 1`, `subtype = 2`
//!   and `payload = 3`
//! - [`TaggedEnvelope`]: `type u8 | subtype u8 | length u16 LE | payload`

use bytes::{Buf, BufMut, BytesMut};
use prost::Message;

use crate::error::EnvelopeError;

/// One decoded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub command_type: u8,
    pub subtype: u8,
    pub payload: Vec<u8>,
}

impl Command {
    pub fn new(command_type: u8, subtype: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            command_type,
            subtype,
            payload: payload.into(),
        }
    }

    /// Routing key: (type, subtype).
    pub fn key(&self) -> (u8, u8) {
        (self.command_type, self.subtype)
    }

    /// Decode the payload as a protobuf message.
    pub fn decode_payload<M: Message + Default>(&self) -> Result<M, EnvelopeError> {
        Ok(M::decode(self.payload.as_slice())?)
    }
}

/// Encodes and decodes command envelopes.
pub trait EnvelopeCodec: Send {
    fn encode(&self, command: &Command) -> Result<Vec<u8>, EnvelopeError>;

    fn decode(&self, data: &[u8]) -> Result<Command, EnvelopeError>;
}

impl<T: EnvelopeCodec + ?Sized> EnvelopeCodec for Box<T> {
    fn encode(&self, command: &Command) -> Result<Vec<u8>, EnvelopeError> {
        (**self).encode(command)
    }

    fn decode(&self, data: &[u8]) -> Result<Command, EnvelopeError> {
        (**self).decode(data)
    }
}

// ============================================================================
// Protobuf
// ============================================================================

/// Wire form of [`ProtobufEnvelope`].
#[derive(Clone, PartialEq, Message)]
pub struct CommandEnvelope {
    #[prost(uint32, tag = "1")]
    pub r#type: u32,
    #[prost(uint32, tag = "2")]
    pub subtype: u32,
    #[prost(bytes = "vec", tag = "3")]
    pub payload: Vec<u8>,
}

/// Envelope carried as an embedded protobuf message.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtobufEnvelope;

impl EnvelopeCodec for ProtobufEnvelope {
    fn encode(&self, command: &Command) -> Result<Vec<u8>, EnvelopeError> {
        let envelope = CommandEnvelope {
            r#type: command.command_type as u32,
            subtype: command.subtype as u32,
            payload: command.payload.clone(),
        };
        Ok(envelope.encode_to_vec())
    }

    fn decode(&self, data: &[u8]) -> Result<Command, EnvelopeError> {
        let envelope = CommandEnvelope::decode(data)?;
        Ok(Command {
            command_type: narrow("type", envelope.r#type)?,
            subtype: narrow("subtype", envelope.subtype)?,
            payload: envelope.payload,
        })
    }
}

fn narrow(field: &'static str, value: u32) -> Result<u8, EnvelopeError> {
    u8::try_from(value).map_err(|_| EnvelopeError::OutOfRange { field, value })
}

// ============================================================================
// Tagged binary
// ============================================================================

/// Size of the tagged header.
pub const TAGGED_HEADER_LEN: usize = 4;

/// Envelope with a fixed binary header.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaggedEnvelope;

impl EnvelopeCodec for TaggedEnvelope {
    fn encode(&self, command: &Command) -> Result<Vec<u8>, EnvelopeError> {
        let len = u16::try_from(command.payload.len())
            .map_err(|_| EnvelopeError::PayloadTooLarge(command.payload.len()))?;
        let mut buf = BytesMut::with_capacity(TAGGED_HEADER_LEN + command.payload.len());
        buf.put_u8(command.command_type);
        buf.put_u8(command.subtype);
        buf.put_u16_le(len);
        buf.put_slice(&command.payload);
        Ok(buf.to_vec())
    }

    fn decode(&self, data: &[u8]) -> Result<Command, EnvelopeError> {
        if data.len() < TAGGED_HEADER_LEN {
            return Err(EnvelopeError::Truncated {
                needed: TAGGED_HEADER_LEN,
                available: data.len(),
            });
        }
        let mut buf = data;
        let command_type = buf.get_u8();
        let subtype = buf.get_u8();
        let len = buf.get_u16_le() as usize;
        if buf.remaining() < len {
            return Err(EnvelopeError::Truncated {
                needed: TAGGED_HEADER_LEN + len,
                available: data.len(),
            });
        }
        if buf.remaining() > len {
            return Err(EnvelopeError::TrailingBytes(buf.remaining() - len));
        }
        Ok(Command {
            command_type,
            subtype,
            payload: buf[..len].to_vec(),
        })
    }
}
