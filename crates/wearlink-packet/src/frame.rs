//! Transport framing and slice reassembly.
//!
//! Every transport write carries one frame:
//!
//! ```text
//! +------+---------+------+---------+-----------+---------+
//! | 0x5A | len u16 | flag | [index] | data[...] | crc u16 |
//! +------+---------+------+---------+-----------+---------+
//! ```
//!
//! `len` (big endian) counts the flag, the optional index and the data. The
//! index is present for sliced frames only. The CRC-16/CCITT-FALSE (big
//! endian) covers everything before it. Packets larger than the negotiated
//! slice size are split into a first slice, middle slices and a last slice
//! with consecutive indices starting at zero.

use bytes::{Buf, BufMut, BytesMut};

use crate::{crc16, PacketError};

/// Start-of-frame marker.
pub const MAGIC: u8 = 0x5A;

/// Bytes of framing around the data of a sliced frame.
pub const FRAME_OVERHEAD: usize = 1 + 2 + 1 + 1 + 2;

/// Default limit for a reassembled packet.
pub const DEFAULT_REASSEMBLY_LIMIT: usize = 64 * 1024;

/// Position of a frame within a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceFlag {
    /// The frame carries the whole packet.
    Whole,
    /// First slice of a packet.
    First,
    /// Neither first nor last.
    Middle,
    /// Last slice of a packet.
    Last,
}

impl SliceFlag {
    pub fn to_byte(self) -> u8 {
        match self {
            SliceFlag::Whole => 0,
            SliceFlag::First => 1,
            SliceFlag::Middle => 2,
            SliceFlag::Last => 3,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, PacketError> {
        match byte {
            0 => Ok(SliceFlag::Whole),
            1 => Ok(SliceFlag::First),
            2 => Ok(SliceFlag::Middle),
            3 => Ok(SliceFlag::Last),
            other => Err(PacketError::InvalidSliceFlag(other)),
        }
    }
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub flag: SliceFlag,
    /// Slice index (zero for whole frames).
    pub index: u8,
    pub data: Vec<u8>,
}

impl Frame {
    /// Serialize the frame with its checksum.
    ///
    /// Fails when the flag, index and data do not fit the 16-bit length field.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let sliced = self.flag != SliceFlag::Whole;
        let header = 1 + sliced as usize;
        let len = u16::try_from(header + self.data.len()).map_err(|_| PacketError::TooLarge {
            size: self.data.len(),
            max: u16::MAX as usize - header,
        })?;
        let mut buf = Vec::with_capacity(len as usize + 5);
        buf.put_u8(MAGIC);
        buf.put_u16(len);
        buf.put_u8(self.flag.to_byte());
        if sliced {
            buf.put_u8(self.index);
        }
        buf.extend_from_slice(&self.data);
        let crc = crc16(&buf);
        buf.put_u16(crc);
        Ok(buf)
    }
}

/// Split a serialized packet into frames of at most `slice_size` data bytes.
pub fn slice_packet(packet: &[u8], slice_size: usize) -> Result<Vec<Vec<u8>>, PacketError> {
    if slice_size == 0 {
        return Err(PacketError::invalid_format("slice size must be positive"));
    }
    if packet.len() <= slice_size {
        let frame = Frame {
            flag: SliceFlag::Whole,
            index: 0,
            data: packet.to_vec(),
        };
        return Ok(vec![frame.encode()?]);
    }

    let count = packet.len().div_ceil(slice_size);
    let max = slice_size * (u8::MAX as usize + 1);
    if count > u8::MAX as usize + 1 || slice_size + 2 > u16::MAX as usize {
        return Err(PacketError::TooLarge {
            size: packet.len(),
            max,
        });
    }

    packet
        .chunks(slice_size)
        .enumerate()
        .map(|(i, chunk)| {
            let flag = match i {
                0 => SliceFlag::First,
                i if i + 1 == count => SliceFlag::Last,
                _ => SliceFlag::Middle,
            };
            Frame {
                flag,
                index: i as u8,
                data: chunk.to_vec(),
            }
            .encode()
        })
        .collect()
}

// ============================================================================
// Frame Codec
// ============================================================================

/// Accumulates transport bytes and yields complete frames.
#[derive(Debug, Default)]
pub struct FrameCodec {
    buffer: BytesMut,
}

impl FrameCodec {
    /// Create a new frame codec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode a complete frame from the buffer.
    ///
    /// Returns `None` if more data is needed. A frame with a bad checksum is
    /// consumed and reported as an error.
    pub fn decode(&mut self) -> Option<Result<Frame, PacketError>> {
        // Discard anything before the next marker
        let skip = self
            .buffer
            .iter()
            .position(|b| *b == MAGIC)
            .unwrap_or(self.buffer.len());
        if skip > 0 {
            log::debug!("discarding {} bytes before frame marker", skip);
            self.buffer.advance(skip);
        }

        if self.buffer.len() < 3 {
            return None;
        }
        let len = u16::from_be_bytes([self.buffer[1], self.buffer[2]]) as usize;
        if len == 0 {
            self.buffer.advance(3);
            return Some(Err(PacketError::invalid_format("empty frame")));
        }
        if self.buffer.len() < 3 + len + 2 {
            return None;
        }

        let raw = self.buffer.split_to(3 + len + 2);
        let expected = u16::from_be_bytes([raw[3 + len], raw[4 + len]]);
        let actual = crc16(&raw[..3 + len]);
        if expected != actual {
            return Some(Err(PacketError::ChecksumMismatch { expected, actual }));
        }

        let body = &raw[3..3 + len];
        let flag = match SliceFlag::from_byte(body[0]) {
            Ok(flag) => flag,
            Err(e) => return Some(Err(e)),
        };
        let frame = match flag {
            SliceFlag::Whole => Frame {
                flag,
                index: 0,
                data: body[1..].to_vec(),
            },
            _ if body.len() < 2 => {
                return Some(Err(PacketError::decode_at(3, "sliced frame without index")))
            }
            _ => Frame {
                flag,
                index: body[1],
                data: body[2..].to_vec(),
            },
        };
        Some(Ok(frame))
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

// ============================================================================
// Slice Reassembly
// ============================================================================

#[derive(Debug)]
struct Partial {
    next_index: u8,
    data: BytesMut,
}

/// Rebuilds packets from frames.
///
/// Slices must arrive in order. An out-of-order slice, a checksum failure or
/// an oversize packet drops the partial packet; later slices of the dropped
/// packet are reported as out of order until the next first slice.
#[derive(Debug)]
pub struct SliceReassembler {
    codec: FrameCodec,
    partial: Option<Partial>,
    limit: usize,
}

impl Default for SliceReassembler {
    fn default() -> Self {
        Self::new(DEFAULT_REASSEMBLY_LIMIT)
    }
}

impl SliceReassembler {
    /// Create a reassembler that rejects packets larger than `limit`.
    pub fn new(limit: usize) -> Self {
        SliceReassembler {
            codec: FrameCodec::new(),
            partial: None,
            limit,
        }
    }

    /// Feed transport bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.codec.push(data);
    }

    /// Whether a sliced packet is partially assembled.
    pub fn in_progress(&self) -> bool {
        self.partial.is_some()
    }

    /// Drop all buffered state.
    pub fn reset(&mut self) {
        self.codec.clear();
        self.partial = None;
    }

    /// Return the next complete packet, if any.
    pub fn next_packet(&mut self) -> Option<Result<Vec<u8>, PacketError>> {
        loop {
            let frame = match self.codec.decode()? {
                Ok(frame) => frame,
                Err(e) => {
                    self.partial = None;
                    return Some(Err(e));
                }
            };
            match self.accept(frame) {
                Ok(Some(packet)) => return Some(Ok(packet)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }

    fn accept(&mut self, frame: Frame) -> Result<Option<Vec<u8>>, PacketError> {
        match frame.flag {
            SliceFlag::Whole => {
                if self.partial.take().is_some() {
                    log::warn!("whole frame interrupted a sliced packet");
                }
                self.check_limit(frame.data.len())?;
                Ok(Some(frame.data))
            }
            SliceFlag::First => {
                if self.partial.take().is_some() {
                    log::warn!("new first slice interrupted a sliced packet");
                }
                if frame.index != 0 {
                    return Err(PacketError::OutOfOrderSlice {
                        expected: 0,
                        actual: frame.index,
                    });
                }
                self.check_limit(frame.data.len())?;
                self.partial = Some(Partial {
                    next_index: 1,
                    data: BytesMut::from(&frame.data[..]),
                });
                Ok(None)
            }
            SliceFlag::Middle | SliceFlag::Last => {
                let mut partial = self.partial.take().ok_or(PacketError::OutOfOrderSlice {
                    expected: 0,
                    actual: frame.index,
                })?;
                if frame.index != partial.next_index {
                    return Err(PacketError::OutOfOrderSlice {
                        expected: partial.next_index,
                        actual: frame.index,
                    });
                }
                self.check_limit(partial.data.len() + frame.data.len())?;
                partial.data.extend_from_slice(&frame.data);

                if frame.flag == SliceFlag::Last {
                    return Ok(Some(partial.data.to_vec()));
                }
                partial.next_index = partial.next_index.wrapping_add(1);
                self.partial = Some(partial);
                Ok(None)
            }
        }
    }

    fn check_limit(&self, size: usize) -> Result<(), PacketError> {
        if size > self.limit {
            return Err(PacketError::TooLarge {
                size,
                max: self.limit,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(frames: &[Vec<u8>]) -> Vec<Result<Vec<u8>, PacketError>> {
        let mut reassembler = SliceReassembler::default();
        let mut out = Vec::new();
        for frame in frames {
            reassembler.push(frame);
            while let Some(result) = reassembler.next_packet() {
                out.push(result);
            }
        }
        out
    }

    #[test]
    fn test_whole_frame_layout() {
        let frames = slice_packet(&[0x01, 0x01], 16).unwrap();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(&frame[..6], &[0x5A, 0x00, 0x03, 0x00, 0x01, 0x01]);
        let crc = crc16(&frame[..6]);
        assert_eq!(&frame[6..], &crc.to_be_bytes());
    }

    #[test]
    fn test_slicing_flags_and_indices() {
        let packet: Vec<u8> = (0..10).collect();
        let frames = slice_packet(&packet, 4).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0][3..5], &[1, 0]);
        assert_eq!(&frames[1][3..5], &[2, 1]);
        assert_eq!(&frames[2][3..5], &[3, 2]);
        assert_eq!(&frames[2][1..3], &[0x00, 0x04]);
    }

    #[test]
    fn test_reassembly() {
        let packet: Vec<u8> = (0..=255).collect();
        let frames = slice_packet(&packet, 20).unwrap();
        let results = reassemble(&frames);
        assert_eq!(results, vec![Ok(packet)]);
    }

    #[test]
    fn test_reassembly_across_split_writes() {
        let packet: Vec<u8> = (0..50).collect();
        let stream: Vec<u8> = slice_packet(&packet, 8).unwrap().concat();
        let chunks: Vec<Vec<u8>> = stream.chunks(5).map(<[u8]>::to_vec).collect();
        assert_eq!(reassemble(&chunks), vec![Ok(packet)]);
    }

    #[test]
    fn test_out_of_order_slice_rejected() {
        let packet: Vec<u8> = (0..12).collect();
        let mut frames = slice_packet(&packet, 4).unwrap();
        frames.swap(1, 2);
        let results = reassemble(&frames);
        assert_eq!(
            results,
            vec![
                Err(PacketError::OutOfOrderSlice {
                    expected: 1,
                    actual: 2
                }),
                Err(PacketError::OutOfOrderSlice {
                    expected: 0,
                    actual: 1
                }),
            ]
        );
    }

    #[test]
    fn test_bad_crc_rejected_and_stream_recovers() {
        let mut bad = slice_packet(&[0x01, 0x02], 16).unwrap().remove(0);
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        let good = slice_packet(&[0x03, 0x04], 16).unwrap().remove(0);

        let results = reassemble(&[bad, good]);
        assert!(matches!(results[0], Err(PacketError::ChecksumMismatch { .. })));
        assert_eq!(results[1], Ok(vec![0x03, 0x04]));
    }

    #[test]
    fn test_garbage_before_marker_skipped() {
        let mut stream = vec![0x00, 0x11];
        stream.extend(slice_packet(&[0x09], 16).unwrap().concat());
        assert_eq!(reassemble(&[stream]), vec![Ok(vec![0x09])]);
    }

    #[test]
    fn test_oversize_packet_rejected() {
        let packet = vec![0u8; 40];
        let frames = slice_packet(&packet, 16).unwrap();
        let mut reassembler = SliceReassembler::new(32);
        let mut results = Vec::new();
        for frame in &frames {
            reassembler.push(frame);
            while let Some(result) = reassembler.next_packet() {
                results.push(result);
            }
        }
        assert!(matches!(results[0], Err(PacketError::TooLarge { max: 32, .. })));
        assert!(!reassembler.in_progress());
    }

    #[test]
    fn test_whole_frame_over_length_field_rejected() {
        let packet = vec![0u8; u16::MAX as usize];
        let result = slice_packet(&packet, packet.len());
        assert_eq!(
            result,
            Err(PacketError::TooLarge {
                size: u16::MAX as usize,
                max: u16::MAX as usize - 1,
            })
        );

        let fits = vec![0u8; u16::MAX as usize - 1];
        let frames = slice_packet(&fits, fits.len()).unwrap();
        assert_eq!(&frames[0][1..3], &[0xFF, 0xFF]);
    }

    #[test]
    fn test_sliced_frame_over_length_field_rejected() {
        let frame = Frame {
            flag: SliceFlag::Middle,
            index: 3,
            data: vec![0u8; u16::MAX as usize - 1],
        };
        assert!(matches!(frame.encode(), Err(PacketError::TooLarge { .. })));
    }

    #[test]
    fn test_zero_slice_size() {
        assert!(slice_packet(&[1], 0).is_err());
    }
}
