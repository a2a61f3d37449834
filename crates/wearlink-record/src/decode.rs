//! Record decoding and encoding.
//!
//! ## Record Format
//!
//! | Field      | Size (bytes) | Description                                  |
//! |------------|--------------|----------------------------------------------|
//! | arch       | 1            | 0 = little endian, 1 = big endian            |
//! | global_id  | 2            | Global message number                        |
//! | count      | 1            | Number of field entries that follow          |
//! | field      | 1            | Field number                                 |
//! | base_type  | 1            | FIT base type code                           |
//! | size       | 1            | Size of the field data in bytes              |
//! | data       | size         | Field value                                  |

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::{BuildError, DecodeError, FieldValue, Record, RecordSchema, WireType};

/// Size of the fixed record header.
pub const HEADER_LEN: usize = 4;

/// Byte order of multi-byte values in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Little endian (architecture byte 0).
    #[default]
    Little,
    /// Big endian (architecture byte 1).
    Big,
}

impl ByteOrder {
    fn from_arch(arch: u8) -> Result<Self, DecodeError> {
        match arch {
            0 => Ok(ByteOrder::Little),
            1 => Ok(ByteOrder::Big),
            other => Err(DecodeError::InvalidArchitecture(other)),
        }
    }

    fn arch(self) -> u8 {
        match self {
            ByteOrder::Little => 0,
            ByteOrder::Big => 1,
        }
    }

    fn read(self, bytes: &[u8]) -> u64 {
        match self {
            ByteOrder::Little => bytes
                .iter()
                .rev()
                .fold(0u64, |acc, b| (acc << 8) | *b as u64),
            ByteOrder::Big => bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64),
        }
    }

    fn write(self, value: u64, width: usize, buf: &mut Vec<u8>) {
        let le = value.to_le_bytes();
        match self {
            ByteOrder::Little => buf.extend_from_slice(&le[..width]),
            ByteOrder::Big => buf.extend(le[..width].iter().rev()),
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let available = self.data.len() - self.offset;
        if n > available {
            return Err(DecodeError::truncated_at(self.offset, n - available));
        }
        let slice = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }
}

/// Read the global message number from a buffer without decoding it.
pub fn peek_global_id(data: &[u8]) -> Result<u16, DecodeError> {
    if data.len() < HEADER_LEN {
        return Err(DecodeError::truncated_at(0, HEADER_LEN - data.len()));
    }
    let order = ByteOrder::from_arch(data[0])?;
    Ok(order.read(&data[1..3]) as u16)
}

/// Decode a buffer into a record using the given schema.
///
/// Decoding is all-or-nothing: on any error no record is produced.
pub fn decode(schema: &Arc<RecordSchema>, data: &[u8]) -> Result<Record, DecodeError> {
    let global_id = peek_global_id(data)?;
    if global_id != schema.id() {
        return Err(DecodeError::SchemaMismatch {
            expected: schema.id(),
            actual: global_id,
        });
    }

    let order = ByteOrder::from_arch(data[0])?;
    let field_count = data[3];
    let mut reader = Reader {
        data,
        offset: HEADER_LEN,
    };
    let mut seen = BTreeSet::new();
    let mut values = BTreeMap::new();

    for _ in 0..field_count {
        let field_offset = reader.offset;
        let number = reader.u8()?;
        let code = reader.u8()?;
        let size = reader.u8()? as usize;

        let wire_type = WireType::from_code(code).ok_or(DecodeError::UnknownWireType {
            field: number,
            code,
            offset: field_offset,
        })?;
        let raw = reader.take(size)?;

        if !seen.insert(number) {
            return Err(DecodeError::DuplicateField(number));
        }
        if let Some(width) = wire_type.width() {
            if size != width {
                return Err(DecodeError::BadFieldSize {
                    field: number,
                    wire_type,
                    size,
                });
            }
        }

        match schema.field(number) {
            None => {
                log::trace!(
                    "{}: skipping undeclared field {} ({})",
                    schema.name(),
                    number,
                    wire_type
                );
                continue;
            }
            Some(def) if def.wire_type != wire_type => {
                return Err(DecodeError::WireTypeMismatch {
                    field: number,
                    expected: def.wire_type,
                    actual: wire_type,
                });
            }
            Some(_) => {}
        }

        if let Some(value) = decode_value(number, wire_type, raw, order)? {
            values.insert(number, value);
        }
    }

    if reader.remaining() != 0 {
        return Err(DecodeError::TrailingBytes {
            offset: reader.offset,
            count: reader.remaining(),
        });
    }

    Ok(Record::new(Arc::clone(schema), values))
}

/// Decode one field value. Invalid sentinels yield `None`.
fn decode_value(
    field: u8,
    wire_type: WireType,
    raw: &[u8],
    order: ByteOrder,
) -> Result<Option<FieldValue>, DecodeError> {
    match wire_type {
        WireType::String => {
            let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
            let text = std::str::from_utf8(&raw[..end]).map_err(|_| DecodeError::InvalidUtf8(field))?;
            if text.is_empty() {
                Ok(None)
            } else {
                Ok(Some(FieldValue::Text(text.to_string())))
            }
        }
        WireType::Byte => {
            if raw.is_empty() || raw.iter().all(|b| *b == 0xFF) {
                Ok(None)
            } else {
                Ok(Some(FieldValue::Bytes(raw.to_vec())))
            }
        }
        _ => {
            let bits = order.read(raw);
            if wire_type.invalid_bits() == Some(bits) {
                return Ok(None);
            }
            if wire_type.is_signed() {
                let shift = 64 - 8 * raw.len() as u32;
                Ok(Some(FieldValue::Signed(((bits << shift) as i64) >> shift)))
            } else {
                Ok(Some(FieldValue::Unsigned(bits)))
            }
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a record in little-endian layout.
pub fn encode(record: &Record) -> Vec<u8> {
    encode_with_order(record, ByteOrder::Little)
}

/// Encode a record with an explicit byte order.
///
/// Records can only be built through validated paths, so every value fits
/// its wire type.
pub fn encode_with_order(record: &Record, order: ByteOrder) -> Vec<u8> {
    let schema = record.schema();
    let mut buf = Vec::with_capacity(HEADER_LEN + record.len() * 8);
    buf.push(order.arch());
    order.write(schema.id() as u64, 2, &mut buf);
    buf.push(record.len() as u8);

    for (number, value) in record.fields() {
        let Some(def) = schema.field(number) else {
            continue;
        };
        buf.push(number);
        buf.push(def.wire_type.code());
        match value {
            FieldValue::Text(text) => {
                buf.push((text.len() + 1) as u8);
                buf.extend_from_slice(text.as_bytes());
                buf.push(0);
            }
            FieldValue::Bytes(bytes) => {
                buf.push(bytes.len() as u8);
                buf.extend_from_slice(bytes);
            }
            FieldValue::Unsigned(_) | FieldValue::Signed(_) => {
                let width = def.wire_type.width().unwrap_or(8);
                buf.push(width as u8);
                order.write(value.raw_bits().unwrap_or_default(), width, &mut buf);
            }
        }
    }

    buf
}

/// Assembles a record from typed values, validating them against the schema.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    schema: Arc<RecordSchema>,
    values: BTreeMap<u8, FieldValue>,
}

impl RecordBuilder {
    /// Start a record for the given schema.
    pub fn new(schema: Arc<RecordSchema>) -> Self {
        RecordBuilder {
            schema,
            values: BTreeMap::new(),
        }
    }

    /// Set a field value.
    pub fn set(mut self, field: u8, value: impl Into<FieldValue>) -> Result<Self, BuildError> {
        let def = self
            .schema
            .field(field)
            .ok_or(BuildError::UnknownField(field))?;
        let value = value.into();
        if !fits(def.wire_type, &value) {
            return Err(BuildError::IncompatibleValue {
                field,
                wire_type: def.wire_type,
            });
        }
        self.values.insert(field, value);
        Ok(self)
    }

    /// Finish the record.
    pub fn build(self) -> Result<Record, BuildError> {
        if self.values.len() > u8::MAX as usize {
            return Err(BuildError::TooManyFields(self.values.len()));
        }
        Ok(Record::new(self.schema, self.values))
    }
}

/// Whether a value can be encoded with a wire type and decoded back unchanged.
fn fits(wire_type: WireType, value: &FieldValue) -> bool {
    match (wire_type, value) {
        (WireType::String, FieldValue::Text(text)) => {
            !text.is_empty() && !text.contains('\0') && text.len() < u8::MAX as usize
        }
        (WireType::Byte, FieldValue::Bytes(bytes)) => {
            !bytes.is_empty() && bytes.len() <= u8::MAX as usize && !bytes.iter().all(|b| *b == 0xFF)
        }
        (_, FieldValue::Signed(v)) if wire_type.is_signed() => {
            let width = wire_type.width().unwrap_or(8) as u32;
            let min = i64::MIN >> (64 - 8 * width);
            let max = i64::MAX >> (64 - 8 * width);
            *v >= min && *v < max
        }
        (_, FieldValue::Unsigned(v)) if wire_type.is_integer() && !wire_type.is_signed() => {
            let width = wire_type.width().unwrap_or(8) as u32;
            let max = u64::MAX >> (64 - 8 * width);
            *v <= max && wire_type.invalid_bits() != Some(*v)
        }
        _ => false,
    }
}
