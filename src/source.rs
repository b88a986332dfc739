//! Entry point for one ingestion pass.

use std::path::Path;

use futures::{future::join_all, join};
use tracing::{error, info, warn};

use crate::{
    config::{ContainerSpec, SourceOptions},
    host::{FileNodeFactory, NodeIdFactory, NodeSink},
    ingest::{IngestError, Ingestor},
    store::{BlobStore, TableStore},
};

/// Outcome of a pass in which every ingestion succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub tables: usize,
    pub rows: usize,
    pub containers: usize,
    pub mirrored: usize,
    pub failed_downloads: usize,
}

struct ContainerOutcome {
    candidates: usize,
    mirrored: usize,
}

impl<T, B, S, I, F> Ingestor<T, B, S, I, F>
where
    T: TableStore,
    B: BlobStore,
    S: NodeSink,
    I: NodeIdFactory,
    F: FileNodeFactory,
{
    async fn run_container(
        &self,
        spec: &ContainerSpec,
        mirror: Option<&Path>,
    ) -> Result<ContainerOutcome, IngestError<T::Error, B::Error>> {
        let candidates = self.ingest_container(spec, mirror).await?;
        let mirrored = self.download_blobs(&candidates).await;
        Ok(ContainerOutcome {
            candidates: candidates.len(),
            mirrored,
        })
    }

    /// Run every configured table and container ingestion concurrently.
    ///
    /// Malformed options are reported and produce no nodes. Otherwise the
    /// pass waits for all ingestions and fails with the first failing one in
    /// configuration order, tables first. Nodes from successful ingestions
    /// stay registered either way.
    pub async fn source_nodes(
        &self,
        options: SourceOptions,
    ) -> Result<Summary, IngestError<T::Error, B::Error>> {
        let plan = match options.resolve() {
            Ok(plan) => plan,
            Err(error) => {
                warn!(%error, "invalid source options; nothing ingested");
                return Ok(Summary::default());
            }
        };

        let tables = join_all(plan.tables.iter().map(|spec| self.ingest_table(spec)));
        let containers = join_all(
            plan.containers
                .iter()
                .map(|(spec, mirror)| self.run_container(spec, mirror.as_deref())),
        );
        let (tables, containers) = join!(tables, containers);

        let mut summary = Summary::default();
        let mut first_error = None;
        for result in tables {
            match result {
                Ok(rows) => {
                    summary.tables += 1;
                    summary.rows += rows;
                }
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }
        for result in containers {
            match result {
                Ok(outcome) => {
                    summary.containers += 1;
                    summary.mirrored += outcome.mirrored;
                    summary.failed_downloads += outcome.candidates - outcome.mirrored;
                }
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) => {
                error!(%error, "source pass failed");
                Err(error)
            }
            None => {
                info!(
                    tables = summary.tables,
                    rows = summary.rows,
                    containers = summary.containers,
                    mirrored = summary.mirrored,
                    failed_downloads = summary.failed_downloads,
                    "source pass complete"
                );
                Ok(summary)
            }
        }
    }
}
