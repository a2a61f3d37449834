//! Tag-length-value bodies.
//!
//! Each entry is `tag u8 | length varint | value`. The length is a
//! big-endian base-128 varint: every byte but the last has its high bit set.
//! Integer values are big-endian and use the smallest width the reader
//! expects (`u8`, `u16`, `u32`).

use bytes::BufMut;

use crate::PacketError;

// ============================================================================
// Varint
// ============================================================================

/// Append a length as a big-endian 7-bit varint.
pub fn put_varint(buf: &mut impl BufMut, value: usize) {
    let mut groups = [0u8; 10];
    let mut n = 0;
    let mut rest = value;
    loop {
        groups[n] = (rest & 0x7F) as u8;
        n += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let continuation = if i == 0 { 0 } else { 0x80 };
        buf.put_u8(groups[i] | continuation);
    }
}

/// Read a varint starting at `offset`; returns the value and bytes consumed.
pub fn read_varint(data: &[u8], offset: usize) -> Result<(usize, usize), PacketError> {
    let mut value = 0usize;
    for (i, byte) in data[offset.min(data.len())..].iter().enumerate() {
        if i == 4 {
            return Err(PacketError::decode_at(offset, "varint too long"));
        }
        value = (value << 7) | (byte & 0x7F) as usize;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(PacketError::decode_at(offset, "truncated varint"))
}

// ============================================================================
// TLV
// ============================================================================

/// An ordered list of TLV entries.
///
/// Tags may repeat; lookups return the first match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tlv {
    entries: Vec<(u8, Vec<u8>)>,
}

impl Tlv {
    /// Create an empty TLV body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes.
    pub fn put_bytes(mut self, tag: u8, value: impl Into<Vec<u8>>) -> Self {
        self.entries.push((tag, value.into()));
        self
    }

    /// Append a tag with no value.
    pub fn put_empty(self, tag: u8) -> Self {
        self.put_bytes(tag, Vec::new())
    }

    pub fn put_u8(self, tag: u8, value: u8) -> Self {
        self.put_bytes(tag, vec![value])
    }

    pub fn put_u16(self, tag: u8, value: u16) -> Self {
        self.put_bytes(tag, value.to_be_bytes().to_vec())
    }

    pub fn put_u32(self, tag: u8, value: u32) -> Self {
        self.put_bytes(tag, value.to_be_bytes().to_vec())
    }

    /// Append a boolean as a single 0/1 byte.
    pub fn put_bool(self, tag: u8, value: bool) -> Self {
        self.put_u8(tag, value as u8)
    }

    /// Whether a tag is present.
    pub fn contains(&self, tag: u8) -> bool {
        self.entries.iter().any(|(t, _)| *t == tag)
    }

    /// Value bytes of the first entry with this tag.
    pub fn get_bytes(&self, tag: u8) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_slice())
    }

    /// Like [`get_bytes`](Self::get_bytes) but missing tags are an error.
    pub fn require_bytes(&self, tag: u8) -> Result<&[u8], PacketError> {
        self.get_bytes(tag).ok_or(PacketError::MissingTag(tag))
    }

    pub fn get_u8(&self, tag: u8) -> Result<u8, PacketError> {
        match self.require_bytes(tag)? {
            [b] => Ok(*b),
            other => Err(wrong_width(tag, 1, other.len())),
        }
    }

    pub fn get_u16(&self, tag: u8) -> Result<u16, PacketError> {
        let value = self.require_bytes(tag)?;
        let bytes: [u8; 2] = value
            .try_into()
            .map_err(|_| wrong_width(tag, 2, value.len()))?;
        Ok(u16::from_be_bytes(bytes))
    }

    /// Read an unsigned integer of one to four bytes.
    pub fn get_u32(&self, tag: u8) -> Result<u32, PacketError> {
        let value = self.require_bytes(tag)?;
        if value.is_empty() || value.len() > 4 {
            return Err(wrong_width(tag, 4, value.len()));
        }
        Ok(value.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32))
    }

    pub fn get_bool(&self, tag: u8) -> Result<bool, PacketError> {
        Ok(self.get_u8(tag)? != 0)
    }

    /// Iterate over entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &[u8])> {
        self.entries.iter().map(|(t, v)| (*t, v.as_slice()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize all entries.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Serialize all entries into an existing buffer.
    pub fn encode_into(&self, buf: &mut impl BufMut) {
        for (tag, value) in &self.entries {
            buf.put_u8(*tag);
            put_varint(buf, value.len());
            buf.put_slice(value);
        }
    }

    fn encoded_len(&self) -> usize {
        self.entries.iter().map(|(_, v)| 2 + v.len()).sum()
    }

    /// Parse a TLV body. `base` is added to offsets in errors.
    pub fn decode(data: &[u8], base: usize) -> Result<Self, PacketError> {
        let mut entries = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let tag = data[offset];
            let (len, consumed) = read_varint(data, offset + 1)
                .map_err(|_| PacketError::decode_at(base + offset + 1, "bad TLV length"))?;
            let start = offset + 1 + consumed;
            let end = start + len;
            if end > data.len() {
                return Err(PacketError::decode_at(
                    base + start,
                    format!("tag 0x{:02X} needs {} bytes, {} left", tag, len, data.len() - start),
                ));
            }
            entries.push((tag, data[start..end].to_vec()));
            offset = end;
        }
        Ok(Tlv { entries })
    }
}

fn wrong_width(tag: u8, expected: usize, actual: usize) -> PacketError {
    PacketError::invalid_format(format!(
        "tag 0x{:02X}: expected {} byte(s), got {}",
        tag, expected, actual
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint(value: usize) -> Vec<u8> {
        let mut buf = Vec::new();
        put_varint(&mut buf, value);
        buf
    }

    #[test]
    fn test_varint_encoding() {
        assert_eq!(varint(0), vec![0x00]);
        assert_eq!(varint(0x7F), vec![0x7F]);
        assert_eq!(varint(0x80), vec![0x81, 0x00]);
        assert_eq!(varint(300), vec![0x82, 0x2C]);
        assert_eq!(read_varint(&[0x82, 0x2C], 0).unwrap(), (300, 2));
    }

    #[test]
    fn test_varint_errors() {
        assert!(read_varint(&[0x81], 0).is_err());
        assert!(read_varint(&[0x81, 0x81, 0x81, 0x81, 0x01], 0).is_err());
        assert!(read_varint(&[], 0).is_err());
    }

    #[test]
    fn test_tlv_encode() {
        let tlv = Tlv::new().put_u8(0x01, 5).put_u16(0x02, 0x0102).put_empty(0x03);
        assert_eq!(
            tlv.encode(),
            vec![0x01, 0x01, 0x05, 0x02, 0x02, 0x01, 0x02, 0x03, 0x00]
        );
    }

    #[test]
    fn test_tlv_decode_and_accessors() {
        let data = [0x01, 0x01, 0x05, 0x02, 0x02, 0x01, 0x02, 0x09, 0x03, 0x01, 0x00, 0x00];
        let tlv = Tlv::decode(&data, 0).unwrap();
        assert_eq!(tlv.len(), 3);
        assert_eq!(tlv.get_u8(0x01).unwrap(), 5);
        assert_eq!(tlv.get_u16(0x02).unwrap(), 0x0102);
        assert_eq!(tlv.get_u32(0x09).unwrap(), 0x010000);
        assert_eq!(tlv.get_u8(0x04), Err(PacketError::MissingTag(0x04)));
        assert!(tlv.get_u16(0x01).is_err());
    }

    #[test]
    fn test_tlv_long_value() {
        let value = vec![0xAB; 200];
        let tlv = Tlv::new().put_bytes(0x10, value.clone());
        let encoded = tlv.encode();
        assert_eq!(&encoded[..3], &[0x10, 0x81, 0x48]);
        assert_eq!(Tlv::decode(&encoded, 0).unwrap().get_bytes(0x10), Some(&value[..]));
    }

    #[test]
    fn test_tlv_truncated_value() {
        let err = Tlv::decode(&[0x01, 0x04, 0xAA], 2).unwrap_err();
        assert!(matches!(err, PacketError::DecodeError { offset: 4, .. }));
    }
}
