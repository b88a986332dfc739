//! Fetch-transform-emit loops for tables, containers and blob mirrors.
//!
//! Every loop runs against the [`Ingestor`]'s store and host collaborators.
//! Ingestions of different tables and containers are independent; the entry
//! point in [`crate::source`] joins them.

use std::path::PathBuf;

use crate::{
    host::{FileNodeError, NodeIdFactory, NodeSink},
    node::build_node,
    value::Fields,
};

mod container;
mod download;
mod table;

pub use container::BlobDescriptor;

/// Store and host collaborators for one pass.
pub struct Ingestor<T, B, S, I, F> {
    pub tables: T,
    pub blobs: B,
    pub sink: S,
    pub ids: I,
    pub files: F,
    /// Base directory that mirror folders are resolved against.
    pub cwd: PathBuf,
}

/// Failure of a whole table or container ingestion.
#[derive(Debug, thiserror::Error)]
pub enum IngestError<TE, BE> {
    #[error("unable to query table {table}: {error}")]
    Query { table: String, error: TE },
    #[error("unable to list container {container}: {error}")]
    Listing { container: String, error: BE },
}

/// Failure of a single blob download. Never fails the owning container.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError<BE> {
    #[error("blob has no local path")]
    NoLocalPath,
    #[error("failed to create directory {path}: {error}")]
    CreateDir {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("failed to request blob: {0}")]
    Request(BE),
    #[error("failed to read blob stream: {0}")]
    Stream(BE),
    #[error("failed to write {path}: {error}")]
    Write {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("failed to create file node: {0}")]
    FileNode(FileNodeError),
}

impl<T, B, S: NodeSink, I: NodeIdFactory, F> Ingestor<T, B, S, I, F> {
    /// Build a node keyed by `key` and register it with the host.
    fn emit(&self, fields: Fields, node_type: &str, key: &str) {
        let id = self.ids.create_node_id(key);
        self.sink.create_node(build_node(fields, node_type, id));
    }
}
