//! Sample - one telemetry record
//!
//! A field -> value mapping with a mandatory `time` column.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::{StreamKey, TimeUnit};

/// Name of the timestamp column
pub const TIME_FIELD: &str = "time";

/// Single field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Numeric column (velocity, altitude, angle, ...)
    Number(f64),
    /// Flag column, carried verbatim
    Bool(bool),
    /// String column (mission id, stage, name, ...)
    Text(String),
}

impl FieldValue {
    /// Numeric view, `None` for non-numeric columns
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// String view, `None` for non-string columns
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a JSON scalar; `null`, arrays and objects have no field representation.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// One telemetry record.
///
/// `time` is canonical milliseconds. All other columns live in `fields`,
/// kept sorted by name so serialized output is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,

    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Sample {
    /// Create a sample with only a timestamp (milliseconds)
    pub fn new(time: f64) -> Self {
        Self {
            time,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style numeric column
    pub fn with_number(mut self, name: impl Into<String>, value: f64) -> Self {
        self.set_number(name, value);
        self
    }

    /// Builder-style string column
    pub fn with_text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields
            .insert(name.into(), FieldValue::Text(value.into()));
        self
    }

    /// Decode a JSON object, converting its time column from `unit` to milliseconds.
    ///
    /// Non-scalar and `null` values are dropped. Fails when the time column is
    /// missing or not numeric.
    pub fn from_json_object(
        object: &Map<String, Value>,
        time_field: &str,
        unit: TimeUnit,
    ) -> Result<Self, String> {
        let raw_time = object
            .get(time_field)
            .ok_or_else(|| format!("missing '{time_field}' field"))?
            .as_f64()
            .ok_or_else(|| format!("'{time_field}' is not numeric"))?;

        let fields = object
            .iter()
            .filter(|(name, _)| name.as_str() != time_field)
            .filter_map(|(name, value)| FieldValue::from_json(value).map(|v| (name.clone(), v)))
            .collect();

        Ok(Self {
            time: unit.to_millis(raw_time),
            fields,
        })
    }

    /// Raw field lookup (`time` is not stored here)
    #[inline]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Numeric lookup; `"time"` resolves to the timestamp
    pub fn number(&self, name: &str) -> Option<f64> {
        if name == TIME_FIELD {
            return Some(self.time);
        }
        self.fields.get(name).and_then(FieldValue::as_number)
    }

    /// String lookup
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_text)
    }

    /// Whether the column exists (`time` always does)
    pub fn has_field(&self, name: &str) -> bool {
        name == TIME_FIELD || self.fields.contains_key(name)
    }

    /// Whether every named column holds a number
    pub fn has_numbers(&self, names: &[&str]) -> bool {
        names.iter().all(|name| self.number(name).is_some())
    }

    pub fn set_number(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        if name == TIME_FIELD {
            self.time = value;
        } else {
            self.fields.insert(name, FieldValue::Number(value));
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    /// Iterate numeric columns (excluding `time`)
    pub fn numeric_fields(&self) -> impl Iterator<Item = (&str, f64)> {
        self.fields
            .iter()
            .filter_map(|(name, value)| value.as_number().map(|v| (name.as_str(), v)))
    }
}

/// Unit handed from the replay core to the sink side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkRecord {
    pub key: StreamKey,
    pub sample: Sample,
}

impl SinkRecord {
    pub fn new(key: StreamKey, sample: Sample) -> Self {
        Self { key, sample }
    }
}
