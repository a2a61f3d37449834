//! Wearable Command Packets
//!
//! This crate provides the byte-level pieces of the request/response link:
//!
//! - [`Tlv`]: tag-length-value bodies with 7-bit varint lengths
//! - [`Packet`]: `service_id | command_id | TLV*`, with optional encrypted bodies
//! - [`slice_packet`] and [`SliceReassembler`]: transport framing with CRC-16
//!   and splitting into negotiated slice sizes
//! - payload encryption and session key material
//!
//! # Example
//!
//! ```rust,ignore
//! use wearlink_packet::{slice_packet, Packet, SliceReassembler, Tlv};
//!
//! let packet = Packet::new(0x01, 0x01, Tlv::new().put_empty(0x01));
//! for frame in slice_packet(&packet.encode(), 20)? {
//!     transport.send(&frame)?;
//! }
//!
//! let mut reassembler = SliceReassembler::default();
//! reassembler.push(&received);
//! while let Some(bytes) = reassembler.next_packet() {
//!     let packet = Packet::decode(&bytes?)?;
//! }
//! ```

mod crc;
mod crypto;
mod error;
mod frame;
mod packet;
mod tlv;

pub use crc::*;
pub use crypto::*;
pub use error::*;
pub use frame::*;
pub use packet::*;
pub use tlv::*;
