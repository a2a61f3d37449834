//! FIT monitoring records (global message 55).

use std::sync::{Arc, OnceLock};

use crate::{
    garmin_to_unix, unix_to_garmin, ComputedField, ComputedRule, DecodeError, FieldDefinition,
    Record, RecordSchema, SemanticType, WireType,
};

/// Global message number of monitoring records.
pub const GLOBAL_ID: u16 = 55;

/// Field numbers of the monitoring message.
pub mod field {
    pub const DISTANCE: u8 = 2;
    pub const CYCLES: u8 = 3;
    pub const ACTIVE_TIME: u8 = 4;
    pub const ACTIVITY_TYPE: u8 = 5;
    pub const ACTIVE_CALORIES: u8 = 19;
    pub const CURRENT_ACTIVITY_TYPE_INTENSITY: u8 = 24;
    pub const TIMESTAMP_16: u8 = 26;
    pub const HEART_RATE: u8 = 27;
    pub const DURATION_MIN: u8 = 29;
    pub const TIMESTAMP: u8 = 253;
}

/// Names of the computed fields declared by [`schema`].
pub mod computed {
    pub const TIMESTAMP: &str = "timestamp";
    pub const ACTIVITY_TYPE: &str = "activity_type";
    pub const INTENSITY: &str = "intensity";
}

fn build_schema() -> RecordSchema {
    let scaled = |scale: f64| SemanticType::Scaled { scale, offset: 0.0 };
    let fields = vec![
        FieldDefinition::new(field::DISTANCE, "distance", WireType::Uint32)
            .with_semantic(scaled(100.0)),
        FieldDefinition::new(field::CYCLES, "cycles", WireType::Uint32),
        FieldDefinition::new(field::ACTIVE_TIME, "active_time", WireType::Uint32)
            .with_semantic(scaled(1000.0)),
        FieldDefinition::new(field::ACTIVITY_TYPE, "activity_type", WireType::Enum)
            .with_semantic(SemanticType::Enumeration),
        FieldDefinition::new(field::ACTIVE_CALORIES, "active_calories", WireType::Uint16),
        FieldDefinition::new(
            field::CURRENT_ACTIVITY_TYPE_INTENSITY,
            "current_activity_type_intensity",
            WireType::Uint8,
        ),
        FieldDefinition::new(field::TIMESTAMP_16, "timestamp_16", WireType::Uint16),
        FieldDefinition::new(field::HEART_RATE, "heart_rate", WireType::Uint8),
        FieldDefinition::new(field::DURATION_MIN, "duration_min", WireType::Uint16),
        FieldDefinition::new(field::TIMESTAMP, "timestamp", WireType::Uint32)
            .with_semantic(SemanticType::Timestamp),
    ];
    let intensity_bits = |shift, width| ComputedRule::BitSlice {
        source: field::CURRENT_ACTIVITY_TYPE_INTENSITY,
        shift,
        width,
    };
    let computed = vec![
        ComputedField::new(
            computed::TIMESTAMP,
            ComputedRule::RollingTimestamp {
                short_field: field::TIMESTAMP_16,
                bits: 16,
            },
        ),
        ComputedField::new(
            computed::ACTIVITY_TYPE,
            ComputedRule::Coalesce {
                primary: field::ACTIVITY_TYPE,
                fallback: Box::new(intensity_bits(0, 5)),
            },
        ),
        ComputedField::new(computed::INTENSITY, intensity_bits(5, 3)),
    ];

    match RecordSchema::new(GLOBAL_ID, "monitoring", fields, computed) {
        Ok(schema) => schema,
        Err(e) => unreachable!("monitoring schema is static: {e}"),
    }
}

/// The shared monitoring schema.
pub fn schema() -> Arc<RecordSchema> {
    static SCHEMA: OnceLock<Arc<RecordSchema>> = OnceLock::new();
    Arc::clone(SCHEMA.get_or_init(|| Arc::new(build_schema())))
}

/// Typed view over a monitoring record.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringRecord {
    record: Record,
}

impl MonitoringRecord {
    /// The underlying record.
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Take the underlying record back.
    pub fn into_record(self) -> Record {
        self.record
    }

    /// Distance in meters.
    pub fn distance(&self) -> Option<f64> {
        self.record.scaled(field::DISTANCE)
    }

    /// Cycles (steps, strokes, ...).
    pub fn cycles(&self) -> Option<u32> {
        self.u32(field::CYCLES)
    }

    /// Active time in seconds.
    pub fn active_time(&self) -> Option<f64> {
        self.record.scaled(field::ACTIVE_TIME)
    }

    pub fn active_calories(&self) -> Option<u16> {
        self.record.unsigned(field::ACTIVE_CALORIES).map(|v| v as u16)
    }

    pub fn duration_min(&self) -> Option<u16> {
        self.record.unsigned(field::DURATION_MIN).map(|v| v as u16)
    }

    pub fn heart_rate(&self) -> Option<u8> {
        self.record.unsigned(field::HEART_RATE).map(|v| v as u8)
    }

    pub fn timestamp_16(&self) -> Option<u16> {
        self.record.unsigned(field::TIMESTAMP_16).map(|v| v as u16)
    }

    /// Absolute timestamp field in Garmin epoch seconds.
    pub fn timestamp(&self) -> Option<u32> {
        self.u32(field::TIMESTAMP)
    }

    /// Activity type from field 5, falling back to the low five bits of field 24.
    pub fn activity_type(&self) -> Option<u8> {
        self.record
            .computed(computed::ACTIVITY_TYPE, None)
            .map(|v| v as u8)
    }

    /// Intensity from the high three bits of field 24.
    pub fn intensity(&self) -> Option<u8> {
        self.record.computed(computed::INTENSITY, None).map(|v| v as u8)
    }

    /// Reconstruct the record timestamp as Unix seconds.
    ///
    /// The absolute base is the record's own `timestamp` field when present,
    /// otherwise `last_known_unix`. The low 16 bits of that base are replaced
    /// by `timestamp_16` in the Garmin epoch.
    pub fn computed_timestamp(&self, last_known_unix: Option<u32>) -> Option<u32> {
        let base = self
            .timestamp()
            .or_else(|| last_known_unix.map(unix_to_garmin))?;
        let garmin = self
            .record
            .computed(computed::TIMESTAMP, Some(u64::from(base)))?;
        Some(garmin_to_unix(garmin as u32))
    }

    fn u32(&self, number: u8) -> Option<u32> {
        self.record.unsigned(number).map(|v| v as u32)
    }
}

impl TryFrom<Record> for MonitoringRecord {
    type Error = DecodeError;

    fn try_from(record: Record) -> Result<Self, Self::Error> {
        if record.global_id() != GLOBAL_ID {
            return Err(DecodeError::SchemaMismatch {
                expected: GLOBAL_ID,
                actual: record.global_id(),
            });
        }
        Ok(MonitoringRecord { record })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode, encode, FieldValue, RecordBuilder, GARMIN_EPOCH_OFFSET};

    fn record(values: &[(u8, u64)]) -> MonitoringRecord {
        let mut builder = RecordBuilder::new(schema());
        for (number, value) in values {
            let value: FieldValue = match schema().field(*number).map(|f| f.wire_type) {
                Some(WireType::Uint16) => (*value as u16).into(),
                Some(WireType::Uint8) | Some(WireType::Enum) => (*value as u8).into(),
                _ => (*value as u32).into(),
            };
            builder = builder.set(*number, value).unwrap();
        }
        MonitoringRecord::try_from(builder.build().unwrap()).unwrap()
    }

    #[test]
    fn test_schema_shape() {
        let schema = schema();
        assert_eq!(schema.id(), 55);
        assert_eq!(schema.fields().count(), 10);
        assert_eq!(schema.computed_fields().len(), 3);
        assert_eq!(schema.field_by_name("heart_rate").unwrap().number, 27);
    }

    #[test]
    fn test_typed_accessors() {
        let m = record(&[
            (field::DISTANCE, 12_345),
            (field::CYCLES, 800),
            (field::ACTIVE_TIME, 90_500),
            (field::HEART_RATE, 72),
            (field::ACTIVE_CALORIES, 31),
        ]);
        assert_eq!(m.distance(), Some(123.45));
        assert_eq!(m.cycles(), Some(800));
        assert_eq!(m.active_time(), Some(90.5));
        assert_eq!(m.heart_rate(), Some(72));
        assert_eq!(m.active_calories(), Some(31));
        assert_eq!(m.duration_min(), None);
    }

    #[test]
    fn test_activity_type_prefers_field_5() {
        let m = record(&[
            (field::ACTIVITY_TYPE, 6),
            (field::CURRENT_ACTIVITY_TYPE_INTENSITY, (3 << 5) | 1),
        ]);
        assert_eq!(m.activity_type(), Some(6));
        assert_eq!(m.intensity(), Some(3));
    }

    #[test]
    fn test_activity_type_from_packed_field() {
        let m = record(&[(field::CURRENT_ACTIVITY_TYPE_INTENSITY, (4 << 5) | 13)]);
        assert_eq!(m.activity_type(), Some(13));
        assert_eq!(m.intensity(), Some(4));
    }

    #[test]
    fn test_activity_type_absent() {
        let m = record(&[(field::HEART_RATE, 60)]);
        assert_eq!(m.activity_type(), None);
        assert_eq!(m.intensity(), None);
    }

    #[test]
    fn test_computed_timestamp_from_prior() {
        let garmin_base = 100_000u32;
        let m = record(&[(field::TIMESTAMP_16, 0x1234)]);
        let unix = m
            .computed_timestamp(Some(garmin_base + GARMIN_EPOCH_OFFSET))
            .unwrap();
        assert_eq!(unix, 70_196 + GARMIN_EPOCH_OFFSET);
    }

    #[test]
    fn test_computed_timestamp_prefers_own_timestamp() {
        let m = record(&[(field::TIMESTAMP, 0x0005_0000), (field::TIMESTAMP_16, 0x0010)]);
        let unix = m.computed_timestamp(Some(GARMIN_EPOCH_OFFSET)).unwrap();
        assert_eq!(unix, 0x0005_0010 + GARMIN_EPOCH_OFFSET);
    }

    #[test]
    fn test_computed_timestamp_without_short_field() {
        let m = record(&[(field::TIMESTAMP, 777)]);
        assert_eq!(m.computed_timestamp(None), Some(777 + GARMIN_EPOCH_OFFSET));
    }

    #[test]
    fn test_computed_timestamp_needs_a_base() {
        let m = record(&[(field::TIMESTAMP_16, 0x1234)]);
        assert_eq!(m.computed_timestamp(None), None);
    }

    #[test]
    fn test_decode_encoded_monitoring_buffer() {
        let m = record(&[(field::HEART_RATE, 88), (field::TIMESTAMP_16, 42)]);
        let bytes = encode(m.record());
        let decoded = MonitoringRecord::try_from(decode(&schema(), &bytes).unwrap()).unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn test_wrong_record_type() {
        let other = Arc::new(RecordSchema::new(20, "other", vec![], vec![]).unwrap());
        let record = RecordBuilder::new(other).build().unwrap();
        assert_eq!(
            MonitoringRecord::try_from(record),
            Err(DecodeError::SchemaMismatch {
                expected: 55,
                actual: 20
            })
        );
    }
}
