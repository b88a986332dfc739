use chrono::{DateTime, Utc};
use futures::{StreamExt as _, TryStreamExt as _};
use reqwest::{Method, header::AUTHORIZATION};
use tracing::debug;

use super::{Credential, Error, auth, check_status};
use crate::{
    codec::ContentHash,
    paging::{Page, Pages},
    store::{BlobBody, BlobItem, BlobStore},
};

const VERSION: &str = "2021-08-06";

pub struct Client {
    http: reqwest::Client,
    endpoint: url::Url,
    credential: Credential,
}

fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(text)
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

fn child_text<'a>(node: roxmltree::Node<'a, '_>, tag: &str) -> Option<&'a str> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

/// Parse one `List Blobs` response into items and the next marker.
pub fn parse_listing(xml: &str) -> Result<Page<BlobItem, String>, Error> {
    let document =
        roxmltree::Document::parse(xml.trim_start_matches('\u{feff}')).map_err(Error::Xml)?;
    let root = document.root_element();
    let items = root
        .children()
        .filter(|node| node.has_tag_name("Blobs"))
        .flat_map(|blobs| blobs.children())
        .filter(|node| node.has_tag_name("Blob"))
        .map(|blob| {
            let name = child_text(blob, "Name")
                .ok_or_else(|| Error::Response("blob without name".into()))?;
            let properties = blob
                .children()
                .find(|node| node.has_tag_name("Properties"));
            let property = |tag: &str| properties.and_then(|node| child_text(node, tag));
            Ok::<_, Error>(BlobItem {
                name: name.to_owned(),
                content_md5: property("Content-MD5").map(|md5| ContentHash::Base64(md5.to_owned())),
                creation_time: property("Creation-Time").and_then(parse_time),
                last_modified: property("Last-Modified").and_then(parse_time),
                blob_type: property("BlobType").map(str::to_owned),
                server_encrypted: property("ServerEncrypted")
                    .is_some_and(|flag| flag.eq_ignore_ascii_case("true")),
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;
    let next_marker = child_text(root, "NextMarker").map(str::to_owned);
    Ok(Page {
        items,
        continuation: next_marker,
    })
}

impl Client {
    pub fn new(http: reqwest::Client, endpoint: url::Url, credential: Credential) -> Self {
        Self {
            http,
            endpoint,
            credential,
        }
    }

    fn resource_url(&self, container: &str, blob: Option<&str>) -> url::Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(container);
            if let Some(blob) = blob {
                segments.extend(blob.split('/'));
            }
        }
        url
    }

    async fn get(&self, mut url: url::Url) -> Result<reqwest::Response, Error> {
        self.credential.prepare_url(&mut url);
        let date = auth::rfc1123(Utc::now());
        let mut request = self
            .http
            .get(url.clone())
            .header("x-ms-date", &date)
            .header("x-ms-version", VERSION);
        if let Credential::SharedKey(key) = &self.credential {
            let authorization = key.blob_authorization(
                &Method::GET,
                &url,
                &[("x-ms-date", date.as_str()), ("x-ms-version", VERSION)],
            );
            request = request.header(AUTHORIZATION, authorization);
        }
        check_status(request.send().await.map_err(Error::Transport)?).await
    }

    /// Fetch one listing segment of `container`, resuming at `marker`.
    pub async fn list_page(
        &self,
        container: &str,
        marker: Option<&str>,
    ) -> Result<Page<BlobItem, String>, Error> {
        let mut url = self.resource_url(container, None);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("restype", "container").append_pair("comp", "list");
            if let Some(marker) = marker {
                query.append_pair("marker", marker);
            }
        }
        let body = self
            .get(url)
            .await?
            .text()
            .await
            .map_err(Error::Transport)?;
        let page = parse_listing(&body)?;
        debug!(
            container,
            blobs = page.items.len(),
            more = page.continuation.is_some(),
            "listed blobs"
        );
        Ok(page)
    }
}

impl BlobStore for Client {
    type Error = Error;

    fn list_blobs<'a>(&'a self, container: &'a str) -> Pages<'a, BlobItem, Self::Error> {
        Pages::continuation(move |marker: Option<String>| async move {
            self.list_page(container, marker.as_deref()).await
        })
    }

    async fn download<'a>(
        &'a self,
        container: &'a str,
        blob: &'a str,
    ) -> Result<BlobBody<'a, Self::Error>, Self::Error> {
        let response = self.get(self.resource_url(container, Some(blob))).await?;
        Ok(response.bytes_stream().map_err(Error::Transport).boxed())
    }

    fn blob_url(&self, container: &str, blob: &str) -> url::Url {
        self.resource_url(container, Some(blob))
    }
}
