use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use super::{IngestError, Ingestor};
use crate::{
    config::ContainerSpec,
    host::{NodeIdFactory, NodeSink},
    store::{BlobItem, BlobStore, TableStore},
    value::Fields,
};

pub const CONTAINER_NODE_TYPE: &str = "azureContainer";
pub const BLOB_NODE_TYPE: &str = "azureBlob";

/// Metadata of one listed blob, plus its mirror path when one is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobDescriptor {
    pub name: String,
    pub container: String,
    /// Lowercase hex.
    pub content_md5: Option<String>,
    pub creation_time: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub blob_type: Option<String>,
    pub server_encrypted: bool,
    pub local_path: Option<PathBuf>,
}

/// `base` extended by the plain components of `relative`.
///
/// Root, prefix, `.` and `..` components are dropped, so the result never
/// leaves `base`. `None` when nothing is left to append.
fn confined_join(base: &Path, relative: impl AsRef<Path>) -> Option<PathBuf> {
    let mut parts = relative
        .as_ref()
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .peekable();
    parts.peek()?;
    let mut path = base.to_owned();
    path.extend(parts);
    Some(path)
}

fn timestamp(time: Option<DateTime<Utc>>) -> Value {
    time.map_or(Value::Null, |time| json!(time.to_rfc3339()))
}

impl BlobDescriptor {
    pub fn from_item(item: BlobItem, container: &str, mirror: Option<&Path>) -> Self {
        let local_path = mirror.and_then(|mirror| confined_join(mirror, &item.name));
        Self {
            content_md5: item.content_md5.as_ref().map(|hash| hash.to_hex()),
            name: item.name,
            container: container.to_owned(),
            creation_time: item.creation_time,
            last_modified: item.last_modified,
            blob_type: item.blob_type,
            server_encrypted: item.server_encrypted,
            local_path,
        }
    }

    /// `name/contentMD5`
    pub fn natural_key(&self) -> String {
        format!("{}/{}", self.name, self.content_md5.as_deref().unwrap_or_default())
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("name".into(), json!(self.name));
        fields.insert("container".into(), json!(self.container));
        fields.insert("contentMD5".into(), json!(self.content_md5));
        fields.insert("creationTime".into(), timestamp(self.creation_time));
        fields.insert("lastModified".into(), timestamp(self.last_modified));
        fields.insert("blobType".into(), json!(self.blob_type));
        fields.insert("serverEncrypted".into(), json!(self.server_encrypted));
        fields.insert(
            "localPath".into(),
            json!(self
                .local_path
                .as_ref()
                .map(|path| path.to_string_lossy().into_owned())),
        );
        fields
    }
}

impl<T: TableStore, B: BlobStore, S: NodeSink, I: NodeIdFactory, F> Ingestor<T, B, S, I, F> {
    /// Emit the container's descriptor node and one `azureBlob` node per blob.
    ///
    /// Returns the descriptors that carry a mirror path: none without `mirror`,
    /// otherwise every blob whose name has at least one plain path component.
    pub async fn ingest_container(
        &self,
        spec: &ContainerSpec,
        mirror: Option<&Path>,
    ) -> Result<Vec<BlobDescriptor>, IngestError<T::Error, B::Error>> {
        let container = spec.name.as_str();
        let mirror = mirror
            .map(|mirror| confined_join(&self.cwd, mirror).unwrap_or_else(|| self.cwd.clone()));

        let mut descriptor = Fields::new();
        descriptor.insert("name".into(), json!(container));
        descriptor.insert(
            "localFolder".into(),
            json!(spec
                .local_folder
                .as_ref()
                .map(|path| path.to_string_lossy().into_owned())),
        );
        self.emit(
            descriptor,
            CONTAINER_NODE_TYPE,
            &format!("{CONTAINER_NODE_TYPE}/{container}"),
        );

        let mut pages = self.blobs.list_blobs(container);
        let mut listed = 0;
        let mut candidates = Vec::new();
        while let Some(page) = pages.next_page().await {
            let items = page
                .map_err(|error| IngestError::Listing {
                    container: container.to_owned(),
                    error,
                })
                .inspect_err(|error| error!(container, %error, "unable to list container"))?;
            debug!(container, blobs = items.len(), "received listing page");
            for item in items {
                let blob = BlobDescriptor::from_item(item, container, mirror.as_deref());
                self.emit(blob.to_fields(), BLOB_NODE_TYPE, &blob.natural_key());
                listed += 1;
                if blob.local_path.is_some() {
                    candidates.push(blob);
                } else if mirror.is_some() {
                    warn!(
                        container,
                        blob = %blob.name,
                        "blob name has no usable path; not mirrored"
                    );
                }
            }
        }
        info!(
            container,
            listed,
            candidates = candidates.len(),
            "ingested container"
        );
        Ok(candidates)
    }
}
