//! Unwrapping of the table store's tagged property encoding.
//!
//! The table client hands every property over as `{"_": value, "$": "Edm.Type"}`.
//! Everything downstream of ingestion works on the plain scalars produced here.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single property as encoded by the table store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TaggedValue {
    #[serde(rename = "_", default)]
    pub value: Value,
    #[serde(rename = "$", default, skip_serializing_if = "Option::is_none")]
    pub edm_type: Option<String>,
}

impl TaggedValue {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            edm_type: None,
        }
    }

    pub fn typed(value: impl Into<Value>, edm_type: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            edm_type: Some(edm_type.into()),
        }
    }
}

/// An entity exactly as returned by the table store, in property order.
pub type RawEntity = IndexMap<String, Option<TaggedValue>>;

/// Normalized entity, ready to become node content.
pub type Fields = Map<String, Value>;

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Inner value of `tagged` when present and truthy, otherwise `default`.
pub fn value_or(tagged: Option<&TaggedValue>, default: Value) -> Value {
    match tagged {
        Some(TaggedValue { value, .. }) if is_truthy(value) => value.clone(),
        _ => default,
    }
}

pub fn normalize(tagged: Option<&TaggedValue>) -> Value {
    value_or(tagged, Value::Null)
}

pub fn normalize_entity(entity: &RawEntity) -> Fields {
    entity
        .iter()
        .map(|(name, tagged)| (name.clone(), normalize(tagged.as_ref())))
        .collect()
}
