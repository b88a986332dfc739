use md5::{Digest as _, Md5};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value::Fields;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Internal {
    #[serde(rename = "type")]
    pub node_type: String,
    pub content: String,
    pub content_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// The host graph's unit of content.
///
/// Domain fields are flattened next to the envelope, so a node serializes as
/// `{...fields, id, parent, children, internal}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GraphNode {
    #[serde(flatten)]
    pub fields: Fields,
    pub id: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub internal: Internal,
}

impl GraphNode {
    pub fn node_type(&self) -> &str {
        &self.internal.node_type
    }

    /// Merge an extra domain field without touching `content`.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// Lowercase hex MD5 of `content`.
pub fn content_digest(content: impl AsRef<[u8]>) -> String {
    hex::encode(Md5::digest(content.as_ref()))
}

/// Compact JSON of the fields, in insertion order.
pub fn serialize_content(fields: &Fields) -> String {
    Value::Object(fields.clone()).to_string()
}

pub fn build_node(fields: Fields, node_type: impl Into<String>, id: String) -> GraphNode {
    let content = serialize_content(&fields);
    let content_digest = content_digest(&content);
    GraphNode {
        fields,
        id,
        parent: None,
        children: Vec::new(),
        internal: Internal {
            node_type: node_type.into(),
            content,
            content_digest,
            media_type: None,
        },
    }
}

/// Render one part of a natural key (`partitionKey/rowKey`, `name/contentMD5`).
pub fn key_part(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
