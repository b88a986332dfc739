//! REST clients for Azure Table and Blob storage.

use std::collections::HashMap;

use base64::Engine as _;

pub mod auth;
pub mod blob;
pub mod table;

pub use auth::{Credential, SasToken, SharedKey};

const DEVELOPMENT_ACCOUNT: &str = "devstoreaccount1";
const DEVELOPMENT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

#[derive(Debug, thiserror::Error)]
pub enum ConnectionStringError {
    #[error("malformed segment: {0}")]
    Malformed(String),
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("invalid {key}: {detail}")]
    Invalid { key: &'static str, detail: String },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    #[error("request failed. status: {status}, code: {code:?}, message: {message}")]
    Status {
        status: reqwest::StatusCode,
        code: Option<String>,
        message: String,
    },
    #[error("unexpected response: {0}")]
    Response(String),
    #[error("failed to parse listing: {0}")]
    Xml(roxmltree::Error),
}

/// Endpoints and credential of one storage account.
#[derive(Debug, Clone)]
pub struct ConnectionString {
    pub account_name: Option<String>,
    pub blob_endpoint: url::Url,
    pub table_endpoint: url::Url,
    pub credential: Credential,
}

fn endpoint(key: &'static str, value: &str) -> Result<url::Url, ConnectionStringError> {
    value.parse().map_err(|error: url::ParseError| ConnectionStringError::Invalid {
        key,
        detail: error.to_string(),
    })
}

impl std::str::FromStr for ConnectionString {
    type Err = ConnectionStringError;

    /// Parse `Key=Value;` pairs as found in `AZURE_STORAGE_CONNECTION_STRING`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut pairs = HashMap::new();
        for segment in s.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| ConnectionStringError::Malformed(segment.to_owned()))?;
            pairs.insert(key.trim().to_ascii_lowercase(), value.trim());
        }

        if pairs
            .get("usedevelopmentstorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        {
            let mut development = format!(
                "AccountName={DEVELOPMENT_ACCOUNT};AccountKey={DEVELOPMENT_KEY};\
                 BlobEndpoint=http://127.0.0.1:10000/{DEVELOPMENT_ACCOUNT};\
                 TableEndpoint=http://127.0.0.1:10002/{DEVELOPMENT_ACCOUNT}"
            );
            if let Some(proxy) = pairs.get("developmentstorageproxyuri") {
                development = development.replace("http://127.0.0.1", proxy.trim_end_matches('/'));
            }
            return development.parse();
        }

        let account_name = pairs.get("accountname").map(|s| s.to_string());
        let protocol = pairs.get("defaultendpointsprotocol").copied().unwrap_or("https");
        let suffix = pairs.get("endpointsuffix").copied().unwrap_or("core.windows.net");
        let default_endpoint = |service: &str| {
            account_name
                .as_ref()
                .map(|account| format!("{protocol}://{account}.{service}.{suffix}"))
        };
        let blob_endpoint = match pairs.get("blobendpoint") {
            Some(value) => endpoint("BlobEndpoint", value)?,
            None => endpoint(
                "BlobEndpoint",
                &default_endpoint("blob").ok_or(ConnectionStringError::Missing("AccountName"))?,
            )?,
        };
        let table_endpoint = match pairs.get("tableendpoint") {
            Some(value) => endpoint("TableEndpoint", value)?,
            None => endpoint(
                "TableEndpoint",
                &default_endpoint("table").ok_or(ConnectionStringError::Missing("AccountName"))?,
            )?,
        };

        let credential = if let Some(sas) = pairs.get("sharedaccesssignature") {
            Credential::Sas(SasToken::new(*sas))
        } else if let Some(key) = pairs.get("accountkey") {
            let account = account_name
                .clone()
                .ok_or(ConnectionStringError::Missing("AccountName"))?;
            let key = base64::engine::general_purpose::STANDARD
                .decode(key)
                .map_err(|error| ConnectionStringError::Invalid {
                    key: "AccountKey",
                    detail: error.to_string(),
                })?;
            Credential::SharedKey(SharedKey::new(account, key))
        } else {
            Credential::Anonymous
        };

        Ok(Self {
            account_name,
            blob_endpoint,
            table_endpoint,
            credential,
        })
    }
}

/// Build both store clients for one pass, sharing a single HTTP client.
pub fn create_clients(connection: &ConnectionString) -> (table::Client, blob::Client) {
    let http = reqwest::Client::new();
    (
        table::Client::new(
            http.clone(),
            connection.table_endpoint.clone(),
            connection.credential.clone(),
        ),
        blob::Client::new(
            http,
            connection.blob_endpoint.clone(),
            connection.credential.clone(),
        ),
    )
}

/// Turn a non-success response into [`Error::Status`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let code = response
        .headers()
        .get("x-ms-error-code")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let message = response.text().await.map_err(Error::Transport)?;
    Err(Error::Status {
        status,
        code,
        message,
    })
}
