//! Error types for record decoding and schema construction.

use thiserror::Error;

use crate::WireType;

/// Errors that can occur while decoding a record buffer.
///
/// Every variant is recoverable: the offending buffer is dropped and the
/// caller continues with the next one.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer declares a different global message number than the schema.
    #[error("schema mismatch: expected global message {expected}, got {actual}")]
    SchemaMismatch {
        /// Global message number of the schema used for decoding.
        expected: u16,
        /// Global message number declared by the buffer.
        actual: u16,
    },

    /// No schema is registered for the declared global message number.
    #[error("no schema registered for global message {0}")]
    UnknownSchema(u16),

    /// The buffer ended before a complete item could be read.
    #[error("truncated buffer at offset {offset}: need {needed} more bytes")]
    Truncated {
        /// Offset at which the read started.
        offset: usize,
        /// Number of bytes that were required.
        needed: usize,
    },

    /// Bytes remain after the last declared field.
    #[error("{count} trailing bytes after offset {offset}")]
    TrailingBytes {
        /// Offset of the first unexpected byte.
        offset: usize,
        /// Number of unexpected bytes.
        count: usize,
    },

    /// The architecture byte is neither little nor big endian.
    #[error("invalid architecture byte 0x{0:02X}")]
    InvalidArchitecture(u8),

    /// A field uses a base type code the decoder does not know.
    #[error("field {field} at offset {offset} has unknown wire type 0x{code:02X}")]
    UnknownWireType {
        /// Field number.
        field: u8,
        /// Base type code found in the buffer.
        code: u8,
        /// Offset of the field header.
        offset: usize,
    },

    /// A scalar field's size does not match its wire type width.
    #[error("field {field} ({wire_type}) has size {size}")]
    BadFieldSize {
        /// Field number.
        field: u8,
        /// Wire type of the field.
        wire_type: WireType,
        /// Size declared by the buffer.
        size: usize,
    },

    /// A schema-declared field was encoded with a different wire type.
    #[error("field {field}: schema declares {expected}, buffer has {actual}")]
    WireTypeMismatch {
        /// Field number.
        field: u8,
        /// Wire type from the schema.
        expected: WireType,
        /// Wire type from the buffer.
        actual: WireType,
    },

    /// The same field number appears twice.
    #[error("field {0} appears more than once")]
    DuplicateField(u8),

    /// A string field does not contain valid UTF-8.
    #[error("field {0} contains invalid UTF-8")]
    InvalidUtf8(u8),
}

impl DecodeError {
    /// Create a truncation error at a specific offset.
    pub fn truncated_at(offset: usize, needed: usize) -> Self {
        DecodeError::Truncated { offset, needed }
    }
}

/// Errors raised while building a schema from its definition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// Two field definitions share a field number.
    #[error("schema {schema}: field {field} defined more than once")]
    DuplicateField {
        /// Global message number.
        schema: u16,
        /// Duplicated field number.
        field: u8,
    },

    /// Two computed fields share a name.
    #[error("schema {schema}: computed field '{name}' defined more than once")]
    DuplicateComputed {
        /// Global message number.
        schema: u16,
        /// Duplicated name.
        name: String,
    },

    /// A computed rule references a field that is missing or not an integer.
    #[error("schema {schema}: computed field '{name}' references unusable field {field}")]
    InvalidReference {
        /// Global message number.
        schema: u16,
        /// Computed field name.
        name: String,
        /// Referenced field number.
        field: u8,
    },

    /// A computed rule has an out-of-range bit layout.
    #[error("schema {schema}: computed field '{name}' has invalid bit layout")]
    InvalidBitLayout {
        /// Global message number.
        schema: u16,
        /// Computed field name.
        name: String,
    },

    /// Two schemas with the same global message number were registered.
    #[error("global message {0} registered more than once")]
    DuplicateSchema(u16),

    /// The schema table could not be parsed.
    #[error("invalid schema table: {0}")]
    Parse(String),
}

/// Errors raised while assembling a record for encoding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    /// The field is not declared by the schema.
    #[error("field {0} is not declared by the schema")]
    UnknownField(u8),

    /// The value cannot be represented with the field's wire type.
    #[error("field {field}: value does not fit {wire_type}")]
    IncompatibleValue {
        /// Field number.
        field: u8,
        /// Wire type of the field.
        wire_type: WireType,
    },

    /// More fields than the layout can describe.
    #[error("too many fields: {0}")]
    TooManyFields(usize),
}
