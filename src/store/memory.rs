//! In-process stores with scripted pagination and failures.

use std::collections::HashMap;

use bytes::Bytes;
use futures::{StreamExt as _, stream};

use super::{BlobBody, BlobItem, BlobStore, TableStore};
use crate::{
    paging::{Page, Pages},
    value::RawEntity,
};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("table not found: {0}")]
    TableNotFound(String),
    #[error("container not found: {0}")]
    ContainerNotFound(String),
    #[error("blob not found: {container}/{blob}")]
    BlobNotFound { container: String, blob: String },
    #[error("{0}")]
    Injected(String),
}

#[derive(Default)]
pub struct TableClient {
    tables: HashMap<String, Vec<Result<Vec<RawEntity>, Error>>>,
}

impl TableClient {
    pub fn new() -> Self {
        Default::default()
    }

    /// Append one page to `table`, creating the table if needed.
    pub fn push_page(&mut self, table: impl Into<String>, entities: Vec<RawEntity>) -> &mut Self {
        self.tables
            .entry(table.into())
            .or_default()
            .push(Ok(entities));
        self
    }

    /// The next page request for `table` fails with `message`.
    pub fn push_failure(&mut self, table: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.tables
            .entry(table.into())
            .or_default()
            .push(Err(Error::Injected(message.into())));
        self
    }
}

impl TableStore for TableClient {
    type Error = Error;

    fn query_entities<'a>(&'a self, table: &'a str) -> Pages<'a, RawEntity, Self::Error> {
        Pages::continuation(move |token: Option<usize>| {
            let index = token.unwrap_or(0);
            let page = match self.tables.get(table) {
                None => Err(Error::TableNotFound(table.to_owned())),
                Some(pages) => match pages.get(index) {
                    None => Ok(Page::last(Vec::new())),
                    Some(Err(error)) => Err(error.clone()),
                    Some(Ok(entities)) if index + 1 < pages.len() => {
                        Ok(Page::more(entities.clone(), index + 1))
                    }
                    Some(Ok(entities)) => Ok(Page::last(entities.clone())),
                },
            };
            async move { page }
        })
    }
}

#[derive(Debug, Clone)]
pub enum BlobContent {
    Data(Bytes),
    /// Yields the given bytes, then fails mid-stream.
    Broken(Bytes, String),
}

#[derive(Default)]
struct Container {
    blobs: Vec<(BlobItem, BlobContent)>,
    listing_failure: Option<String>,
}

pub struct BlobClient {
    base: url::Url,
    page_size: usize,
    containers: HashMap<String, Container>,
}

impl Default for BlobClient {
    fn default() -> Self {
        let base = "http://127.0.0.1:10000/devstoreaccount1/"
            .parse()
            .expect("valid development endpoint");
        Self::new(base, 2)
    }
}

impl BlobClient {
    pub fn new(base: url::Url, page_size: usize) -> Self {
        Self {
            base,
            page_size: page_size.max(1),
            containers: HashMap::new(),
        }
    }

    pub fn push_container(&mut self, container: impl Into<String>) -> &mut Self {
        self.containers.entry(container.into()).or_default();
        self
    }

    pub fn push_blob(
        &mut self,
        container: impl Into<String>,
        item: BlobItem,
        content: BlobContent,
    ) -> &mut Self {
        self.containers
            .entry(container.into())
            .or_default()
            .blobs
            .push((item, content));
        self
    }

    /// Listing of `container` fails once the pages before it were served.
    pub fn fail_listing(&mut self, container: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.containers.entry(container.into()).or_default().listing_failure = Some(message.into());
        self
    }
}

impl BlobStore for BlobClient {
    type Error = Error;

    fn list_blobs<'a>(&'a self, container: &'a str) -> Pages<'a, BlobItem, Self::Error> {
        let Some(entry) = self.containers.get(container) else {
            return Pages::cursor(stream::once(async move {
                Err(Error::ContainerNotFound(container.to_owned()))
            }));
        };
        let pages = entry
            .blobs
            .chunks(self.page_size)
            .map(|chunk| Ok::<_, Error>(chunk.iter().map(|(item, _)| item.clone()).collect::<Vec<_>>()))
            .collect::<Vec<_>>();
        let failure = entry
            .listing_failure
            .clone()
            .map(|message| Err(Error::Injected(message)));
        Pages::cursor(stream::iter(pages.into_iter().chain(failure)))
    }

    async fn download<'a>(
        &'a self,
        container: &'a str,
        blob: &'a str,
    ) -> Result<BlobBody<'a, Self::Error>, Self::Error> {
        let content = self
            .containers
            .get(container)
            .ok_or_else(|| Error::ContainerNotFound(container.to_owned()))?
            .blobs
            .iter()
            .find(|(item, _)| item.name == blob)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| Error::BlobNotFound {
                container: container.to_owned(),
                blob: blob.to_owned(),
            })?;
        Ok(match content {
            BlobContent::Data(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            BlobContent::Broken(bytes, message) => {
                stream::iter([Ok(bytes), Err(Error::Injected(message))]).boxed()
            }
        })
    }

    fn blob_url(&self, container: &str, blob: &str) -> url::Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(container).extend(blob.split('/'));
        }
        url
    }
}
