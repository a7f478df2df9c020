use anyhow::{Context, Result};
use serde_json::Value;

use crate::parser::number::parse_float;

/// A single property value, resolved from JSON once at load time.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Null,
    /// Arrays and objects that are not part of a recognised shape.
    Other(Value),
}

impl PropertyValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => PropertyValue::Text(s.clone()),
            Value::Number(n) => n
                .as_f64()
                .map(PropertyValue::Number)
                .unwrap_or_else(|| PropertyValue::Other(value.clone())),
            Value::Bool(b) => PropertyValue::Bool(*b),
            Value::Null => PropertyValue::Null,
            _ => PropertyValue::Other(value.clone()),
        }
    }

    /// Label text for this value, or `None` when it is null.
    pub fn label(&self) -> Option<String> {
        match self {
            PropertyValue::Text(s) => Some(s.clone()),
            PropertyValue::Number(n) => Some(format_number(*n)),
            PropertyValue::Bool(b) => Some(b.to_string()),
            PropertyValue::Null => None,
            PropertyValue::Other(v) => Some(v.to_string()),
        }
    }

    /// Numeric reading of the value; only finite numbers count.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) if n.is_finite() => Some(*n),
            PropertyValue::Text(s) => parse_float(s),
            _ => None,
        }
    }

    /// Empty strings, zero, false and null.
    pub fn is_falsy(&self) -> bool {
        match self {
            PropertyValue::Text(s) => s.is_empty(),
            PropertyValue::Number(n) => *n == 0.0 || n.is_nan(),
            PropertyValue::Bool(b) => !b,
            PropertyValue::Null => true,
            PropertyValue::Other(_) => false,
        }
    }
}

/// Number to label text, as a browser would print it: integral values
/// without a fraction, exponent notation outside `[1e-6, 1e21)`.
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let magnitude = n.abs();
    if !(1e-6..1e21).contains(&magnitude) {
        let exp = format!("{:e}", n);
        return match exp.split_once('e') {
            Some((mantissa, power)) if !power.starts_with('-') => {
                format!("{}e+{}", mantissa, power)
            }
            _ => exp,
        };
    }
    if n.fract() == 0.0 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}

/// One property record: attribute name to value, in source key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    fields: Vec<(String, PropertyValue)>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: &serde_json::Map<String, Value>) -> Self {
        let fields = map
            .iter()
            .map(|(k, v)| (k.clone(), PropertyValue::from_json(v)))
            .collect();
        Self { fields }
    }

    /// Builder used mostly by tests and callers assembling records by hand.
    /// Re-inserting a key replaces its value in place.
    pub fn with(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        let key = key.into();
        match self.fields.iter().position(|(k, _)| *k == key) {
            Some(i) => self.fields[i].1 = value,
            None => self.fields.push((key, value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.fields.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The three shapes a feature's `properties` can take.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureProperties {
    /// Plain record, one per feature
    Record(Properties),
    /// `properties` is itself an array of records
    RecordList(Vec<Properties>),
    /// `properties` holds a nested `features` array
    NestedCollection(Vec<Properties>),
}

impl FeatureProperties {
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Array(items)) => {
                FeatureProperties::RecordList(items.iter().map(record_from_json).collect())
            }
            Some(Value::Object(map)) => match map.get("features") {
                Some(Value::Array(nested)) => FeatureProperties::NestedCollection(
                    nested.iter().map(nested_record_from_json).collect(),
                ),
                _ => FeatureProperties::Record(Properties::from_map(map)),
            },
            _ => FeatureProperties::Record(Properties::new()),
        }
    }
}

fn record_from_json(value: &Value) -> Properties {
    value
        .as_object()
        .map(Properties::from_map)
        .unwrap_or_default()
}

// A nested feature contributes its `properties` object when it has one,
// otherwise the entry itself is taken as the record.
fn nested_record_from_json(value: &Value) -> Properties {
    match value.get("properties") {
        Some(Value::Object(map)) => Properties::from_map(map),
        _ => record_from_json(value),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub properties: FeatureProperties,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    /// Build a collection from a parsed JSON document.
    ///
    /// Anything without a `features` array is an empty collection; only
    /// JSON syntax errors are reported, by the caller that parses text.
    pub fn from_json(value: &Value) -> Self {
        let features = value
            .get("features")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|f| Feature {
                        properties: FeatureProperties::from_json(f.get("properties")),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self { features }
    }

    /// Parse the embedded payload, unwrapping one level of string encoding.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).context("Embedded GeoJSON is not valid JSON")?;

        let value = match value {
            Value::String(inner) => serde_json::from_str::<Value>(&inner)
                .context("Double-encoded GeoJSON payload is not valid JSON")?,
            other => other,
        };

        Ok(Self::from_json(&value))
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }
}
