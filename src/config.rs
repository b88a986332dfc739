use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Options as handed over by the host, before validation.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SourceOptions {
    #[serde(default)]
    pub tables: Option<Value>,
    #[serde(default)]
    pub containers: Option<Value>,
    #[serde(default)]
    pub container_local_folder: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub node_type: Option<String>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_type: None,
        }
    }

    /// Node type for the table's rows; the table name unless overridden.
    pub fn type_name(&self) -> &str {
        self.node_type
            .as_deref()
            .filter(|node_type| !node_type.is_empty())
            .unwrap_or(&self.name)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    pub name: String,
    #[serde(default)]
    pub local_folder: Option<PathBuf>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            local_folder: None,
        }
    }
}

/// Validated work list for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub tables: Vec<TableSpec>,
    pub containers: Vec<(ContainerSpec, Option<PathBuf>)>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("expected array of tables, got {0}")]
    TablesNotArray(Value),
    #[error("invalid table entry: {0}")]
    Table(serde_json::Error),
}

impl SourceOptions {
    /// Validate the options into a [`Plan`].
    ///
    /// A malformed `tables` option rejects the whole pass. A malformed
    /// `containers` option only drops the containers, and a malformed
    /// container entry only drops that entry.
    pub fn resolve(self) -> Result<Plan, ConfigError> {
        let tables = match self.tables {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries
                .into_iter()
                .map(serde_json::from_value::<TableSpec>)
                .collect::<Result<_, _>>()
                .map_err(ConfigError::Table)?,
            Some(other) => return Err(ConfigError::TablesNotArray(other)),
        };
        let containers = match self.containers {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries
                .into_iter()
                .filter_map(|entry| {
                    serde_json::from_value::<ContainerSpec>(entry.clone())
                        .inspect_err(|error| {
                            warn!(%entry, %error, "invalid container entry; skipping")
                        })
                        .ok()
                })
                .collect::<Vec<_>>(),
            Some(other) => {
                warn!(containers = %other, "expected array of containers; skipping containers");
                Vec::new()
            }
        };
        let containers = containers
            .into_iter()
            .map(|spec| {
                let mirror = spec
                    .local_folder
                    .clone()
                    .or_else(|| self.container_local_folder.clone());
                (spec, mirror)
            })
            .collect();
        Ok(Plan { tables, containers })
    }
}
