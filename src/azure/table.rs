use std::collections::HashMap;

use chrono::Utc;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{Credential, Error, auth, check_status};
use crate::{
    paging::{Page, Pages},
    store::TableStore,
    value::{RawEntity, TaggedValue},
};

const VERSION: &str = "2019-02-02";
const NEXT_PARTITION_KEY: &str = "x-ms-continuation-NextPartitionKey";
const NEXT_ROW_KEY: &str = "x-ms-continuation-NextRowKey";

pub struct Client {
    http: reqwest::Client,
    endpoint: url::Url,
    credential: Credential,
}

/// Resume point of an entity query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    pub next_partition_key: String,
    pub next_row_key: Option<String>,
}

impl Continuation {
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        };
        Some(Self {
            next_partition_key: header(NEXT_PARTITION_KEY)?,
            next_row_key: header(NEXT_ROW_KEY),
        })
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    value: Vec<serde_json::Map<String, Value>>,
}

/// Re-tag a JSON entity the way the table client library presents it.
///
/// `name@odata.type` annotations become the `$` tag of `name`; other
/// `odata.*` metadata is dropped.
pub fn tag_entity(entity: serde_json::Map<String, Value>) -> RawEntity {
    let mut types = HashMap::new();
    let mut properties = Vec::new();
    for (name, value) in entity {
        if let Some(property) = name.strip_suffix("@odata.type") {
            if let Value::String(edm) = value {
                types.insert(property.to_owned(), edm);
            }
        } else if !name.starts_with("odata.") {
            properties.push((name, value));
        }
    }
    properties
        .into_iter()
        .map(|(name, value)| {
            let tagged = TaggedValue {
                edm_type: types.remove(&name),
                value,
            };
            (name, Some(tagged))
        })
        .collect()
}

impl Client {
    pub fn new(http: reqwest::Client, endpoint: url::Url, credential: Credential) -> Self {
        Self {
            http,
            endpoint,
            credential,
        }
    }

    fn query_url(&self, table: &str, continuation: Option<&Continuation>) -> url::Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&format!("{table}()"));
        }
        if let Some(continuation) = continuation {
            let mut query = url.query_pairs_mut();
            query.append_pair("NextPartitionKey", &continuation.next_partition_key);
            if let Some(row_key) = &continuation.next_row_key {
                query.append_pair("NextRowKey", row_key);
            }
        }
        self.credential.prepare_url(&mut url);
        url
    }

    /// Fetch one page of `table`, resuming at `continuation`.
    pub async fn query_page(
        &self,
        table: &str,
        continuation: Option<&Continuation>,
    ) -> Result<Page<RawEntity, Continuation>, Error> {
        let url = self.query_url(table, continuation);
        let date = auth::rfc1123(Utc::now());
        let mut request = self
            .http
            .get(url.clone())
            .header(ACCEPT, "application/json;odata=minimalmetadata")
            .header("x-ms-date", &date)
            .header("x-ms-version", VERSION)
            .header("DataServiceVersion", "3.0;NetFx")
            .header("MaxDataServiceVersion", "3.0;NetFx");
        if let Credential::SharedKey(key) = &self.credential {
            request = request.header(AUTHORIZATION, key.table_authorization(&url, &date));
        }
        let response = check_status(request.send().await.map_err(Error::Transport)?).await?;
        let next = Continuation::from_headers(response.headers());
        let body = response
            .json::<QueryResponse>()
            .await
            .map_err(Error::Transport)?;
        debug!(
            table,
            entities = body.value.len(),
            more = next.is_some(),
            "queried entities"
        );
        let entities = body.value.into_iter().map(tag_entity).collect();
        Ok(Page {
            items: entities,
            continuation: next,
        })
    }
}

impl TableStore for Client {
    type Error = Error;

    fn query_entities<'a>(&'a self, table: &'a str) -> Pages<'a, RawEntity, Self::Error> {
        Pages::continuation(move |continuation: Option<Continuation>| async move {
            self.query_page(table, continuation.as_ref()).await
        })
    }
}
