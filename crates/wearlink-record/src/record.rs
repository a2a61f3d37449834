//! Decoded records and their accessors.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{bit_slice, reconstruct_rolling, ComputedRule, FieldValue, RecordSchema, SemanticType};

/// One decoded telemetry record.
///
/// A record is created by [`decode`](crate::decode) or
/// [`RecordBuilder`](crate::RecordBuilder) and is immutable afterwards.
/// Absent fields are reported as `None`; they are never defaulted to zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Arc<RecordSchema>,
    values: BTreeMap<u8, FieldValue>,
}

impl Record {
    pub(crate) fn new(schema: Arc<RecordSchema>, values: BTreeMap<u8, FieldValue>) -> Self {
        Record { schema, values }
    }

    /// The schema this record was decoded with.
    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    /// Global message number of the record.
    pub fn global_id(&self) -> u16 {
        self.schema.id()
    }

    /// Raw value of a field.
    pub fn value(&self, field: u8) -> Option<&FieldValue> {
        self.values.get(&field)
    }

    /// Raw value of a field looked up by its schema name.
    pub fn value_by_name(&self, name: &str) -> Option<&FieldValue> {
        let def = self.schema.field_by_name(name)?;
        self.values.get(&def.number)
    }

    /// Whether a field carries a value.
    pub fn has(&self, field: u8) -> bool {
        self.values.contains_key(&field)
    }

    /// Unsigned integer value of a field.
    pub fn unsigned(&self, field: u8) -> Option<u64> {
        self.value(field).and_then(FieldValue::as_u64)
    }

    /// Signed integer value of a field (unsigned values are widened if they fit).
    pub fn signed(&self, field: u8) -> Option<i64> {
        self.value(field).and_then(FieldValue::as_i64)
    }

    /// Text value of a field.
    pub fn text(&self, field: u8) -> Option<&str> {
        self.value(field).and_then(FieldValue::as_str)
    }

    /// Byte value of a field.
    pub fn bytes(&self, field: u8) -> Option<&[u8]> {
        self.value(field).and_then(FieldValue::as_bytes)
    }

    /// Value of a field after applying its `Scaled` semantic type.
    ///
    /// Fields without a scale are returned unchanged as `f64`.
    pub fn scaled(&self, field: u8) -> Option<f64> {
        let raw = self.signed(field)? as f64;
        match self.schema.field(field).map(|def| &def.semantic) {
            Some(SemanticType::Scaled { scale, offset }) => Some(raw / scale - offset),
            _ => Some(raw),
        }
    }

    /// Iterate over present fields in ascending field-number order.
    pub fn fields(&self) -> impl Iterator<Item = (u8, &FieldValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    /// Number of present fields.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Evaluate a schema-declared computed field.
    ///
    /// `prior` is the externally known value some rules need, such as the last
    /// absolute timestamp for a rolling timestamp. Returns `None` when the
    /// schema has no such computed field or its inputs are absent.
    pub fn computed(&self, name: &str, prior: Option<u64>) -> Option<u64> {
        let field = self.schema.computed(name)?;
        self.evaluate(&field.rule, prior)
    }

    /// Evaluate an arbitrary rule against this record's raw fields.
    pub fn evaluate(&self, rule: &ComputedRule, prior: Option<u64>) -> Option<u64> {
        match rule {
            ComputedRule::RollingTimestamp { short_field, bits } => {
                let absolute = prior?;
                match self.value(*short_field).and_then(FieldValue::raw_bits) {
                    Some(short) => Some(reconstruct_rolling(absolute, short, *bits)),
                    None => Some(absolute),
                }
            }
            ComputedRule::BitSlice {
                source,
                shift,
                width,
            } => {
                let raw = self.value(*source).and_then(FieldValue::raw_bits)?;
                Some(bit_slice(raw, *shift, *width))
            }
            ComputedRule::Coalesce { primary, fallback } => self
                .value(*primary)
                .and_then(FieldValue::raw_bits)
                .or_else(|| self.evaluate(fallback, prior)),
        }
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.schema.name())?;
        for (i, (number, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match self.schema.field(*number) {
                Some(def) => write!(f, "{}={}", def.name, value)?,
                None => write!(f, "#{}={}", number, value)?,
            }
        }
        write!(f, ")")
    }
}
