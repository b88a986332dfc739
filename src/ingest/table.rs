use serde_json::json;
use tracing::{debug, error, info};

use super::{IngestError, Ingestor};
use crate::{
    config::TableSpec,
    host::{NodeIdFactory, NodeSink},
    node::key_part,
    store::{BlobStore, TableStore},
    value::{Fields, normalize_entity},
};

pub const TABLE_NODE_TYPE: &str = "azureTable";

impl<T: TableStore, B: BlobStore, S: NodeSink, I: NodeIdFactory, F> Ingestor<T, B, S, I, F> {
    /// Emit the table's descriptor node and one node per entity.
    ///
    /// Returns the number of entity nodes. Nodes from pages received before a
    /// failing query stay registered.
    pub async fn ingest_table(
        &self,
        spec: &TableSpec,
    ) -> Result<usize, IngestError<T::Error, B::Error>> {
        let table = spec.name.as_str();
        let node_type = spec.type_name();

        let mut descriptor = Fields::new();
        descriptor.insert("name".into(), json!(table));
        descriptor.insert("type".into(), json!(node_type));
        self.emit(descriptor, TABLE_NODE_TYPE, &format!("{TABLE_NODE_TYPE}/{table}"));

        let mut pages = self.tables.query_entities(table);
        let mut count = 0;
        while let Some(page) = pages.next_page().await {
            let entities = page
                .map_err(|error| IngestError::Query {
                    table: table.to_owned(),
                    error,
                })
                .inspect_err(|error| error!(table, %error, "unable to query table"))?;
            debug!(table, entities = entities.len(), "received page");
            for entity in &entities {
                let fields = normalize_entity(entity);
                let key = format!(
                    "{}/{}",
                    key_part(fields.get("PartitionKey")),
                    key_part(fields.get("RowKey"))
                );
                self.emit(fields, node_type, &key);
                count += 1;
            }
        }
        info!(table, node_type, count, "ingested table");
        Ok(count)
    }
}
