//! What the ingestors need from the host graph.

use std::path::Path;

use crate::node::GraphNode;

pub mod local;

pub trait NodeSink: Sync {
    /// Register one node. Registration is append-only and infallible.
    fn create_node(&self, node: GraphNode);
}

pub trait NodeIdFactory: Sync {
    /// Deterministic, namespaced id for a natural key.
    fn create_node_id(&self, key: &str) -> String;
}

#[derive(Debug, thiserror::Error)]
pub enum FileNodeError {
    #[error("failed to stat {path}: {error}")]
    Stat { path: String, error: std::io::Error },
    #[error("{0}")]
    Rejected(String),
}

pub trait FileNodeFactory: Sync {
    fn create_file_node(
        &self,
        path: &Path,
        ids: &(impl NodeIdFactory + ?Sized),
    ) -> impl Future<Output = Result<GraphNode, FileNodeError>> + Send;
}
