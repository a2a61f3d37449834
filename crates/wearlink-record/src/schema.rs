//! Record schemas: field tables keyed by global message number.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{decode, peek_global_id, DecodeError, Record, SchemaError};

// ============================================================================
// Wire Types
// ============================================================================

/// On-the-wire representation of a field (FIT base types).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireType {
    /// 8-bit enumeration.
    Enum,
    /// Signed 8-bit integer.
    Sint8,
    /// Unsigned 8-bit integer.
    Uint8,
    /// Signed 16-bit integer.
    Sint16,
    /// Unsigned 16-bit integer.
    Uint16,
    /// Signed 32-bit integer.
    Sint32,
    /// Unsigned 32-bit integer.
    Uint32,
    /// Null-terminated UTF-8 string.
    String,
    /// Unsigned 8-bit integer where zero is invalid.
    Uint8z,
    /// Unsigned 16-bit integer where zero is invalid.
    Uint16z,
    /// Unsigned 32-bit integer where zero is invalid.
    Uint32z,
    /// Opaque byte array.
    Byte,
    /// Signed 64-bit integer.
    Sint64,
    /// Unsigned 64-bit integer.
    Uint64,
}

impl WireType {
    /// Look up a wire type by its base type code.
    pub fn from_code(code: u8) -> Option<Self> {
        let wire_type = match code {
            0x00 => WireType::Enum,
            0x01 => WireType::Sint8,
            0x02 => WireType::Uint8,
            0x83 => WireType::Sint16,
            0x84 => WireType::Uint16,
            0x85 => WireType::Sint32,
            0x86 => WireType::Uint32,
            0x07 => WireType::String,
            0x0A => WireType::Uint8z,
            0x8B => WireType::Uint16z,
            0x8C => WireType::Uint32z,
            0x0D => WireType::Byte,
            0x8E => WireType::Sint64,
            0x8F => WireType::Uint64,
            _ => return None,
        };
        Some(wire_type)
    }

    /// The base type code written to the wire.
    pub const fn code(self) -> u8 {
        match self {
            WireType::Enum => 0x00,
            WireType::Sint8 => 0x01,
            WireType::Uint8 => 0x02,
            WireType::Sint16 => 0x83,
            WireType::Uint16 => 0x84,
            WireType::Sint32 => 0x85,
            WireType::Uint32 => 0x86,
            WireType::String => 0x07,
            WireType::Uint8z => 0x0A,
            WireType::Uint16z => 0x8B,
            WireType::Uint32z => 0x8C,
            WireType::Byte => 0x0D,
            WireType::Sint64 => 0x8E,
            WireType::Uint64 => 0x8F,
        }
    }

    /// Width in bytes for scalar types, `None` for variable-length types.
    pub const fn width(self) -> Option<usize> {
        match self {
            WireType::Enum | WireType::Sint8 | WireType::Uint8 | WireType::Uint8z => Some(1),
            WireType::Sint16 | WireType::Uint16 | WireType::Uint16z => Some(2),
            WireType::Sint32 | WireType::Uint32 | WireType::Uint32z => Some(4),
            WireType::Sint64 | WireType::Uint64 => Some(8),
            WireType::String | WireType::Byte => None,
        }
    }

    /// Whether the type carries a signed integer.
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            WireType::Sint8 | WireType::Sint16 | WireType::Sint32 | WireType::Sint64
        )
    }

    /// Whether the type carries an integer (signed or unsigned).
    pub const fn is_integer(self) -> bool {
        self.width().is_some()
    }

    /// The raw bit pattern that marks an integer field as invalid.
    pub(crate) const fn invalid_bits(self) -> Option<u64> {
        match self {
            WireType::Enum | WireType::Uint8 => Some(0xFF),
            WireType::Sint8 => Some(0x7F),
            WireType::Uint16 => Some(0xFFFF),
            WireType::Sint16 => Some(0x7FFF),
            WireType::Uint32 => Some(0xFFFF_FFFF),
            WireType::Sint32 => Some(0x7FFF_FFFF),
            WireType::Uint64 => Some(u64::MAX),
            WireType::Sint64 => Some(i64::MAX as u64),
            WireType::Uint8z | WireType::Uint16z | WireType::Uint32z => Some(0),
            WireType::String | WireType::Byte => None,
        }
    }
}

impl std::fmt::Display for WireType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WireType::Enum => "enum",
            WireType::Sint8 => "sint8",
            WireType::Uint8 => "uint8",
            WireType::Sint16 => "sint16",
            WireType::Uint16 => "uint16",
            WireType::Sint32 => "sint32",
            WireType::Uint32 => "uint32",
            WireType::String => "string",
            WireType::Uint8z => "uint8z",
            WireType::Uint16z => "uint16z",
            WireType::Uint32z => "uint32z",
            WireType::Byte => "byte",
            WireType::Sint64 => "sint64",
            WireType::Uint64 => "uint64",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Field Definitions
// ============================================================================

/// How a field's raw value should be interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SemanticType {
    /// Plain integer with no further meaning attached.
    #[default]
    Raw,
    /// Seconds since the device epoch.
    Timestamp,
    /// Vendor enumeration.
    Enumeration,
    /// Human-readable text.
    Text,
    /// Opaque payload.
    Blob,
    /// Fixed-point value: `raw / scale - offset`.
    Scaled {
        /// Divisor applied to the raw value.
        scale: f64,
        /// Offset subtracted after scaling.
        #[serde(default)]
        offset: f64,
    },
}

/// Definition of a single field inside a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field number (unique within the schema).
    pub number: u8,
    /// Field name, used for by-name lookups and logging.
    pub name: String,
    /// Wire representation.
    pub wire_type: WireType,
    /// Interpretation of the raw value.
    #[serde(default)]
    pub semantic: SemanticType,
}

impl FieldDefinition {
    /// Create a raw field definition.
    pub fn new(number: u8, name: impl Into<String>, wire_type: WireType) -> Self {
        FieldDefinition {
            number,
            name: name.into(),
            wire_type,
            semantic: SemanticType::Raw,
        }
    }

    /// Attach a semantic type.
    pub fn with_semantic(mut self, semantic: SemanticType) -> Self {
        self.semantic = semantic;
        self
    }
}

// ============================================================================
// Computed Fields
// ============================================================================

/// A rule deriving a value from raw fields.
///
/// Rules are evaluated on every access and never cached on the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ComputedRule {
    /// Replace the low `bits` of a known absolute timestamp with a short field.
    RollingTimestamp {
        /// Field holding the truncated timestamp.
        short_field: u8,
        /// Number of low-order bits carried by the short field.
        bits: u8,
    },
    /// Extract `width` bits starting at `shift` from an integer field.
    BitSlice {
        /// Source field.
        source: u8,
        /// Right shift applied first.
        shift: u8,
        /// Number of bits kept.
        width: u8,
    },
    /// Use the primary field if present, otherwise evaluate the fallback rule.
    Coalesce {
        /// Preferred raw field.
        primary: u8,
        /// Rule used when the primary field is absent.
        fallback: Box<ComputedRule>,
    },
}

/// A named computed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedField {
    /// Name used with [`Record::computed`].
    pub name: String,
    /// Derivation rule.
    #[serde(flatten)]
    pub rule: ComputedRule,
}

impl ComputedField {
    /// Create a computed field.
    pub fn new(name: impl Into<String>, rule: ComputedRule) -> Self {
        ComputedField {
            name: name.into(),
            rule,
        }
    }
}

// ============================================================================
// Record Schema
// ============================================================================

/// Serializable form of a schema, validated into a [`RecordSchema`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Global message number.
    pub id: u16,
    /// Schema name.
    pub name: String,
    /// Field table.
    pub fields: Vec<FieldDefinition>,
    /// Computed fields.
    #[serde(default)]
    pub computed: Vec<ComputedField>,
}

/// An immutable field layout for one record type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "SchemaDefinition")]
pub struct RecordSchema {
    id: u16,
    name: String,
    fields: BTreeMap<u8, FieldDefinition>,
    computed: Vec<ComputedField>,
}

impl RecordSchema {
    /// Build and validate a schema.
    pub fn new(
        id: u16,
        name: impl Into<String>,
        fields: Vec<FieldDefinition>,
        computed: Vec<ComputedField>,
    ) -> Result<Self, SchemaError> {
        let mut table = BTreeMap::new();
        for field in fields {
            let number = field.number;
            if table.insert(number, field).is_some() {
                return Err(SchemaError::DuplicateField {
                    schema: id,
                    field: number,
                });
            }
        }

        let schema = RecordSchema {
            id,
            name: name.into(),
            fields: table,
            computed: Vec::new(),
        };

        let mut validated: Vec<ComputedField> = Vec::with_capacity(computed.len());
        for field in computed {
            if validated.iter().any(|c| c.name == field.name) {
                return Err(SchemaError::DuplicateComputed {
                    schema: id,
                    name: field.name,
                });
            }
            schema.validate_rule(&field.name, &field.rule)?;
            validated.push(field);
        }

        Ok(RecordSchema {
            computed: validated,
            ..schema
        })
    }

    fn validate_rule(&self, name: &str, rule: &ComputedRule) -> Result<(), SchemaError> {
        let check_field = |field: u8| match self.fields.get(&field) {
            Some(def) if def.wire_type.is_integer() => Ok(()),
            _ => Err(SchemaError::InvalidReference {
                schema: self.id,
                name: name.to_string(),
                field,
            }),
        };
        let bad_layout = || SchemaError::InvalidBitLayout {
            schema: self.id,
            name: name.to_string(),
        };

        match rule {
            ComputedRule::RollingTimestamp { short_field, bits } => {
                check_field(*short_field)?;
                if *bits == 0 || *bits > 64 {
                    return Err(bad_layout());
                }
            }
            ComputedRule::BitSlice {
                source,
                shift,
                width,
            } => {
                check_field(*source)?;
                if *width == 0 || u32::from(*shift) + u32::from(*width) > 64 {
                    return Err(bad_layout());
                }
            }
            ComputedRule::Coalesce { primary, fallback } => {
                check_field(*primary)?;
                self.validate_rule(name, fallback)?;
            }
        }
        Ok(())
    }

    /// Global message number.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a field definition by number.
    pub fn field(&self, number: u8) -> Option<&FieldDefinition> {
        self.fields.get(&number)
    }

    /// Look up a field definition by name.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.values().find(|f| f.name == name)
    }

    /// All field definitions in ascending field-number order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values()
    }

    /// Look up a computed field by name.
    pub fn computed(&self, name: &str) -> Option<&ComputedField> {
        self.computed.iter().find(|c| c.name == name)
    }

    /// All computed fields.
    pub fn computed_fields(&self) -> &[ComputedField] {
        &self.computed
    }
}

impl TryFrom<SchemaDefinition> for RecordSchema {
    type Error = SchemaError;

    fn try_from(def: SchemaDefinition) -> Result<Self, Self::Error> {
        RecordSchema::new(def.id, def.name, def.fields, def.computed)
    }
}

// ============================================================================
// Schema Registry
// ============================================================================

/// Read-only table of schemas keyed by global message number.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<u16, Arc<RecordSchema>>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding a single shared schema.
    pub fn with(schema: Arc<RecordSchema>) -> Self {
        Self {
            schemas: HashMap::from([(schema.id(), schema)]),
        }
    }

    /// Add a schema. Global message numbers must be unique.
    pub fn register(&mut self, schema: RecordSchema) -> Result<Arc<RecordSchema>, SchemaError> {
        let schema = Arc::new(schema);
        self.insert(Arc::clone(&schema))?;
        Ok(schema)
    }

    /// Add an already shared schema, such as [`monitoring::schema`](crate::monitoring::schema).
    pub fn insert(&mut self, schema: Arc<RecordSchema>) -> Result<(), SchemaError> {
        let id = schema.id();
        if self.schemas.contains_key(&id) {
            return Err(SchemaError::DuplicateSchema(id));
        }
        self.schemas.insert(id, schema);
        Ok(())
    }

    /// Load a registry from a YAML list of schema definitions.
    pub fn from_yaml(yaml: &str) -> Result<Self, SchemaError> {
        let schemas: Vec<RecordSchema> =
            serde_yaml::from_str(yaml).map_err(|e| SchemaError::Parse(e.to_string()))?;
        let mut registry = SchemaRegistry::new();
        for schema in schemas {
            registry.register(schema)?;
        }
        Ok(registry)
    }

    /// Look up a schema.
    pub fn get(&self, id: u16) -> Option<&Arc<RecordSchema>> {
        self.schemas.get(&id)
    }

    /// Number of registered schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Decode a buffer with whichever schema its global id selects.
    pub fn decode_any(&self, data: &[u8]) -> Result<Record, DecodeError> {
        let id = peek_global_id(data)?;
        let schema = self.get(id).ok_or(DecodeError::UnknownSchema(id))?;
        decode(schema, data)
    }
}
