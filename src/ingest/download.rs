use bytes::BytesMut;
use futures::{StreamExt as _, future::join_all};
use tracing::{error, info};

use super::{BlobDescriptor, DownloadError, Ingestor};
use crate::{
    host::{FileNodeFactory, NodeIdFactory, NodeSink},
    node::GraphNode,
    store::BlobStore,
};

impl<T, B: BlobStore, S: NodeSink, I: NodeIdFactory, F: FileNodeFactory> Ingestor<T, B, S, I, F> {
    /// Mirror one blob to its local path and register a file node for it.
    ///
    /// The body is collected fully before anything is written, so a broken
    /// stream leaves no partial file behind.
    pub async fn download_blob(
        &self,
        blob: &BlobDescriptor,
    ) -> Result<GraphNode, DownloadError<B::Error>> {
        let path = blob.local_path.as_deref().ok_or(DownloadError::NoLocalPath)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|error| DownloadError::CreateDir {
                    path: dir.to_owned(),
                    error,
                })?;
        }

        let mut body = self
            .blobs
            .download(&blob.container, &blob.name)
            .await
            .map_err(DownloadError::Request)?;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk.map_err(DownloadError::Stream)?);
        }
        tokio::fs::write(path, &buffer)
            .await
            .map_err(|error| DownloadError::Write {
                path: path.to_owned(),
                error,
            })?;

        let url = self.blobs.blob_url(&blob.container, &blob.name);
        let node = self
            .files
            .create_file_node(path, &self.ids)
            .await
            .map_err(DownloadError::FileNode)?
            .with_field("url", url.as_str());
        self.sink.create_node(node.clone());
        Ok(node)
    }

    /// Download every candidate concurrently.
    ///
    /// A failed blob is logged and skipped; its siblings are unaffected.
    /// Returns the number of blobs mirrored.
    pub async fn download_blobs(&self, blobs: &[BlobDescriptor]) -> usize {
        let results = join_all(blobs.iter().map(|blob| async move {
            self.download_blob(blob).await.inspect_err(|error| {
                error!(
                    blob = %blob.name,
                    container = %blob.container,
                    %error,
                    "failed to download blob"
                )
            })
        }))
        .await;
        let downloaded = results.iter().filter(|result| result.is_ok()).count();
        if let Some(first) = blobs.first() {
            info!(
                container = %first.container,
                downloaded,
                failed = blobs.len() - downloaded,
                "mirrored container"
            );
        }
        downloaded
    }
}
