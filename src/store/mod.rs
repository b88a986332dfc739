//! Store seams the ingestors are written against.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::{codec::ContentHash, paging::Pages, value::RawEntity};

pub mod memory;

/// Listing metadata for one blob, as reported by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobItem {
    pub name: String,
    pub content_md5: Option<ContentHash>,
    pub creation_time: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub blob_type: Option<String>,
    pub server_encrypted: bool,
}

impl BlobItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content_md5: None,
            creation_time: None,
            last_modified: None,
            blob_type: None,
            server_encrypted: false,
        }
    }
}

pub type BlobBody<'a, E> = BoxStream<'a, Result<Bytes, E>>;

pub trait TableStore: Sync {
    type Error: std::error::Error + Send + 'static;

    /// Unfiltered query over every entity of `table`.
    fn query_entities<'a>(&'a self, table: &'a str) -> Pages<'a, RawEntity, Self::Error>;
}

pub trait BlobStore: Sync {
    type Error: std::error::Error + Send + 'static;

    fn list_blobs<'a>(&'a self, container: &'a str) -> Pages<'a, BlobItem, Self::Error>;

    fn download<'a>(
        &'a self,
        container: &'a str,
        blob: &'a str,
    ) -> impl Future<Output = Result<BlobBody<'a, Self::Error>, Self::Error>> + Send;

    fn blob_url(&self, container: &str, blob: &str) -> url::Url;
}
