//! Request authorization: Shared Key Lite signatures or SAS tokens.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac as _};
use sha2::Sha256;

#[derive(Debug, Clone)]
pub enum Credential {
    SharedKey(SharedKey),
    Sas(SasToken),
    Anonymous,
}

#[derive(Clone, derive_debug::Dbg)]
pub struct SharedKey {
    account: String,
    #[dbg(skip)]
    key: Vec<u8>,
}

#[derive(Clone, derive_debug::Dbg)]
pub struct SasToken {
    #[dbg(skip)]
    token: String,
}

/// `x-ms-date` format.
pub fn rfc1123(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

impl SharedKey {
    pub fn new(account: impl Into<String>, key: Vec<u8>) -> Self {
        Self {
            account: account.into(),
            key,
        }
    }

    fn sign(&self, string_to_sign: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .expect("HMAC accepts keys of any length");
        mac.update(string_to_sign.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    fn canonicalized_resource(&self, url: &url::Url) -> String {
        let mut resource = format!("/{}{}", self.account, url.path());
        if let Some((_, comp)) = url.query_pairs().find(|(name, _)| name == "comp") {
            resource.push_str("?comp=");
            resource.push_str(&comp);
        }
        resource
    }

    /// `Authorization` value for the Table service.
    pub fn table_authorization(&self, url: &url::Url, date: &str) -> String {
        let string_to_sign = format!("{date}\n{}", self.canonicalized_resource(url));
        format!("SharedKeyLite {}:{}", self.account, self.sign(&string_to_sign))
    }

    /// `Authorization` value for the Blob service.
    ///
    /// `ms_headers` are the `x-ms-*` headers sent with the request.
    pub fn blob_authorization(
        &self,
        method: &reqwest::Method,
        url: &url::Url,
        ms_headers: &[(&str, &str)],
    ) -> String {
        let mut headers = ms_headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.trim()))
            .collect::<Vec<_>>();
        headers.sort();
        let canonicalized_headers = headers
            .iter()
            .map(|(name, value)| format!("{name}:{value}\n"))
            .collect::<String>();
        // Content-MD5, Content-Type and Date stay empty; x-ms-date is used instead.
        let string_to_sign = format!(
            "{method}\n\n\n\n{canonicalized_headers}{}",
            self.canonicalized_resource(url)
        );
        format!("SharedKeyLite {}:{}", self.account, self.sign(&string_to_sign))
    }
}

impl SasToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into().trim_start_matches('?').to_owned(),
        }
    }

    pub fn append_to(&self, url: &mut url::Url) {
        let query = match url.query() {
            Some(query) if !query.is_empty() => format!("{query}&{}", self.token),
            _ => self.token.clone(),
        };
        url.set_query(Some(&query));
    }
}

impl Credential {
    /// Add query-string credentials to `url`. Signatures are added per request.
    pub fn prepare_url(&self, url: &mut url::Url) {
        if let Self::Sas(token) = self {
            token.append_to(url);
        }
    }
}
