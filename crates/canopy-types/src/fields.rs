use std::collections::BTreeMap;

use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::TypeError;

/// Opaque payload attached to a block, keyed by field name.
pub type Fields = BTreeMap<String, FieldValue>;

/// A single JSON-shaped field value.
///
/// Mirrors the JSON data model with one difference: a `Float` may hold a
/// non-finite number, which JSON cannot represent. Such a value fails to
/// serialize, and a block carrying it is rejected on insert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(#[serde(serialize_with = "serialize_finite")] f64),
    Text(String),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

fn serialize_finite<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if !value.is_finite() {
        return Err(S::Error::custom(format!(
            "{value} cannot be represented in JSON"
        )));
    }
    serializer.serialize_f64(*value)
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(value: Vec<FieldValue>) -> Self {
        Self::List(value)
    }
}

/// Serialize fields to the JSON text stored in the `fields` column.
pub fn fields_to_json(fields: &Fields) -> Result<String, TypeError> {
    serde_json::to_string(fields).map_err(|e| TypeError::Serialization(e.to_string()))
}

/// Decode the `fields` column. An empty column decodes to no fields.
pub fn fields_from_json(json: &str) -> Result<Fields, TypeError> {
    if json.is_empty() {
        return Ok(Fields::new());
    }
    serde_json::from_str(json).map_err(|e| TypeError::Serialization(e.to_string()))
}
