//! Per-device preference lookup.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::{keys, ConfigError};

/// A stored preference value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreferenceValue {
    Bool(bool),
    Integer(i64),
    String(String),
}

impl PreferenceValue {
    /// Boolean value. The strings `true`/`false` are accepted too.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PreferenceValue::Bool(v) => Some(*v),
            PreferenceValue::String(s) => s.parse().ok(),
            PreferenceValue::Integer(_) => None,
        }
    }

    /// Integer value. Numeric strings are accepted too.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PreferenceValue::Integer(v) => Some(*v),
            PreferenceValue::String(s) => s.trim().parse().ok(),
            PreferenceValue::Bool(_) => None,
        }
    }

    /// String form of the value.
    pub fn as_string(&self) -> String {
        match self {
            PreferenceValue::Bool(v) => v.to_string(),
            PreferenceValue::Integer(v) => v.to_string(),
            PreferenceValue::String(s) => s.clone(),
        }
    }
}

impl From<bool> for PreferenceValue {
    fn from(v: bool) -> Self {
        PreferenceValue::Bool(v)
    }
}

impl From<i64> for PreferenceValue {
    fn from(v: i64) -> Self {
        PreferenceValue::Integer(v)
    }
}

impl From<&str> for PreferenceValue {
    fn from(v: &str) -> Self {
        PreferenceValue::String(v.to_string())
    }
}

impl From<String> for PreferenceValue {
    fn from(v: String) -> Self {
        PreferenceValue::String(v)
    }
}

/// Read access to device preferences.
///
/// Requests and services receive preferences explicitly instead of looking
/// them up globally, so tests can supply any values.
pub trait Preferences: Send + Sync {
    /// Look up a raw value.
    fn get(&self, key: &str) -> Option<PreferenceValue>;

    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
    }

    fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key)
            .map(|v| v.as_string())
            .unwrap_or_else(|| default.to_string())
    }
}

/// In-memory preferences, loadable from a YAML mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryPreferences {
    values: BTreeMap<String, PreferenceValue>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a flat YAML mapping of keys to scalars.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Set a value, returning the previous one.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PreferenceValue>,
    ) -> Option<PreferenceValue> {
        self.values.insert(key.into(), value.into())
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PreferenceValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<PreferenceValue> {
        self.values.remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Preferences for MemoryPreferences {
    fn get(&self, key: &str) -> Option<PreferenceValue> {
        self.values.get(key).cloned()
    }
}

/// Preferences shared between the host and queued work.
///
/// Clones see the same values, so a change made after a request was queued
/// is visible when the request is built.
#[derive(Debug, Clone, Default)]
pub struct SharedPreferences {
    inner: Arc<RwLock<MemoryPreferences>>,
}

impl SharedPreferences {
    pub fn new(prefs: MemoryPreferences) -> Self {
        Self {
            inner: Arc::new(RwLock::new(prefs)),
        }
    }

    /// Set a value, returning the previous one.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: impl Into<PreferenceValue>,
    ) -> Option<PreferenceValue> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set(key, value)
    }

    /// Copy of the current values.
    pub fn snapshot(&self) -> MemoryPreferences {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Preferences for SharedPreferences {
    fn get(&self, key: &str) -> Option<PreferenceValue> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).get(key)
    }
}

// ============================================================================
// Interpreted Preferences
// ============================================================================

/// Clock format preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeFormat {
    /// Follow the host's clock setting.
    #[default]
    Auto,
    Hours24,
    Hours12,
}

impl TimeFormat {
    /// Read [`keys::TIMEFORMAT`]. Unknown values fall back to `Auto`.
    pub fn from_preferences(prefs: &dyn Preferences) -> Self {
        match prefs.get_string(keys::TIMEFORMAT, "auto").as_str() {
            "24h" => TimeFormat::Hours24,
            "12h" => TimeFormat::Hours12,
            _ => TimeFormat::Auto,
        }
    }

    /// Resolve `Auto` against the host setting.
    pub fn is_24h(self, system_24h: bool) -> bool {
        match self {
            TimeFormat::Auto => system_24h,
            TimeFormat::Hours24 => true,
            TimeFormat::Hours12 => false,
        }
    }
}

/// Order of day, month and year in displayed dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    YearFirst,
    MonthFirst,
    DayFirst,
}

impl DateOrder {
    /// Read [`keys::DATEFORMAT`]. Unknown patterns are treated as year first.
    pub fn from_preferences(prefs: &dyn Preferences) -> Self {
        Self::from_pattern(&prefs.get_string(keys::DATEFORMAT, "MM/dd/yyyy"))
    }

    pub fn from_pattern(pattern: &str) -> Self {
        match pattern {
            "MM/dd/yyyy" => DateOrder::MonthFirst,
            "dd.MM.yyyy" | "dd/MM/yyyy" => DateOrder::DayFirst,
            _ => DateOrder::YearFirst,
        }
    }
}
