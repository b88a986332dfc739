use std::{
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use super::{FileNodeError, FileNodeFactory, NodeIdFactory, NodeSink};
use crate::{
    node::{GraphNode, build_node},
    value::Fields,
};

/// Append-only in-memory registry.
#[derive(Default)]
pub struct MemorySink {
    nodes: Mutex<Vec<GraphNode>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn nodes(&self) -> Vec<GraphNode> {
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn of_type(&self, node_type: &str) -> Vec<GraphNode> {
        self.nodes()
            .into_iter()
            .filter(|node| node.node_type() == node_type)
            .collect()
    }

    pub fn into_nodes(self) -> Vec<GraphNode> {
        self.nodes.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NodeSink for MemorySink {
    fn create_node(&self, node: GraphNode) {
        debug!(id = %node.id, node_type = node.node_type(), "create node");
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(node);
    }
}

/// UUIDv5 ids scoped by a per-source namespace.
#[derive(Debug, Clone)]
pub struct NamespacedIds {
    namespace: Uuid,
}

impl NamespacedIds {
    pub fn new(source: &str) -> Self {
        Self {
            namespace: Uuid::new_v5(&Uuid::NAMESPACE_URL, source.as_bytes()),
        }
    }
}

impl NodeIdFactory for NamespacedIds {
    fn create_node_id(&self, key: &str) -> String {
        Uuid::new_v5(&self.namespace, key.as_bytes()).to_string()
    }
}

/// Builds `File` nodes for paths below `root`.
#[derive(Debug, Clone)]
pub struct LocalFileNodes {
    root: PathBuf,
}

impl LocalFileNodes {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn lossy(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl FileNodeFactory for LocalFileNodes {
    async fn create_file_node(
        &self,
        path: &Path,
        ids: &(impl NodeIdFactory + ?Sized),
    ) -> Result<GraphNode, FileNodeError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|error| FileNodeError::Stat {
                path: lossy(path),
                error,
            })?;
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();
        let modified = metadata
            .modified()
            .ok()
            .map(|time| DateTime::<Utc>::from(time).to_rfc3339());
        let media_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_owned();

        let mut fields = Fields::new();
        fields.insert("absolutePath".into(), lossy(path).into());
        fields.insert("relativePath".into(), lossy(relative).into());
        fields.insert(
            "relativeDirectory".into(),
            relative.parent().map(lossy).unwrap_or_default().into(),
        );
        fields.insert(
            "name".into(),
            path.file_stem().map(lossy_os).unwrap_or_default().into(),
        );
        fields.insert(
            "base".into(),
            path.file_name().map(lossy_os).unwrap_or_default().into(),
        );
        fields.insert(
            "ext".into(),
            if extension.is_empty() {
                String::new()
            } else {
                format!(".{extension}")
            }
            .into(),
        );
        fields.insert("extension".into(), extension.into());
        fields.insert("size".into(), json!(metadata.len()));
        fields.insert("modifiedTime".into(), modified.map_or(Value::Null, Value::String));

        let id = ids.create_node_id(&lossy(path));
        let mut node = build_node(fields, "File", id);
        node.internal.media_type = Some(media_type);
        Ok(node)
    }
}

fn lossy_os(s: &std::ffi::OsStr) -> String {
    s.to_string_lossy().into_owned()
}
