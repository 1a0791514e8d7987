//! HTTP remote store client.
//!
//! Talks to a Drive-style REST API with bearer-token authentication,
//! continuation-token pagination, and ranged chunk downloads. The token is
//! read from the `CURATOR_STORE_TOKEN` environment variable.
//!
//! # Endpoints consumed
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | `GET`  | `/me` | credentials probe |
//! | `GET`  | `/files?parent=<id>&page_token=<t>` | folder listing |
//! | `GET`  | `/files?page_token=<t>` | namespace-wide listing |
//! | `GET`  | `/files/<id>` | item metadata (parents) |
//! | `GET`  | `/files/<id>/content` | content, `Range`-chunked |
//! | `GET`  | `/folders?name=<n>` | folder lookup by name |
//! | `POST` | `/folders` | folder creation |
//! | `PATCH`| `/files/<id>/parents` | parent reassignment |
//! | `DELETE` | `/files/<id>` | deletion |
//!
//! # Chunked downloads
//!
//! Content is pulled in fixed-size ranges. Each failed or short chunk
//! consumes one attempt from the bounded retry budget; when the budget is
//! exhausted before the body completes the download fails with
//! [`RemoteError::Timeout`], which the pipeline treats as a per-item
//! failure, never as fatal to the run.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::{ItemKind, SourceItem};

use super::{ItemPage, RemoteError, RemoteStore};

const TOKEN_ENV: &str = "CURATOR_STORE_TOKEN";
/// Bytes requested per `Range` chunk.
const CHUNK_BYTES: u64 = 4 * 1024 * 1024;

pub struct HttpRemoteStore {
    base_url: String,
    client: reqwest::Client,
    download_retries: u32,
}

/// Wire representation of one item in listing and metadata responses.
#[derive(Debug, Deserialize)]
struct WireItem {
    id: String,
    name: String,
    kind: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    parents: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireListing {
    #[serde(default)]
    files: Vec<WireItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCreated {
    id: String,
}

impl WireItem {
    fn into_source_item(self) -> SourceItem {
        let kind = if self.kind == "folder" {
            ItemKind::Folder
        } else {
            ItemKind::File
        };
        SourceItem {
            extension: SourceItem::extension_of(&self.name),
            id: self.id,
            name: self.name,
            size: self.size,
            kind,
            parents: self.parents,
            limbo: false,
        }
    }
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, download_retries: u32) -> Result<Self, RemoteError> {
        let token = std::env::var(TOKEN_ENV)
            .map_err(|_| RemoteError::Auth(format!("{} environment variable not set", TOKEN_ENV)))?;

        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| RemoteError::Auth("token contains invalid header bytes".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| RemoteError::Io(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            download_retries,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Capped exponential backoff between chunk attempts.
    async fn backoff(&self, attempt: u32) {
        let millis = 100u64 * (1 << attempt.saturating_sub(1).min(5));
        tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, RemoteError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| RemoteError::Io(e.to_string()))?;
        let response = check_status(response)?;
        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Io(format!("invalid response body: {}", e)))
    }

    async fn fetch_listing(
        &self,
        query: &[(&str, &str)],
    ) -> Result<ItemPage, RemoteError> {
        let listing: WireListing = self.get_json(&self.url("/files"), query).await?;
        Ok(ItemPage {
            items: listing
                .files
                .into_iter()
                .map(WireItem::into_source_item)
                .collect(),
            next_page_token: listing.next_page_token,
        })
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(RemoteError::Auth(format!("remote returned {}", status)));
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(RemoteError::NotFound(
            response.url().path().to_string(),
        ));
    }
    if !status.is_success() {
        return Err(RemoteError::Io(format!("remote returned {}", status)));
    }
    Ok(response)
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn check_auth(&self) -> Result<(), RemoteError> {
        let response = self
            .client
            .get(self.url("/me"))
            .send()
            .await
            .map_err(|e| RemoteError::Auth(format!("connection failed: {}", e)))?;
        check_status(response).map(|_| ())
    }

    async fn list(
        &self,
        parent_id: &str,
        page_token: Option<&str>,
    ) -> Result<ItemPage, RemoteError> {
        let mut query = vec![("parent", parent_id)];
        if let Some(token) = page_token {
            query.push(("page_token", token));
        }
        self.fetch_listing(&query).await
    }

    async fn list_all(&self, page_token: Option<&str>) -> Result<ItemPage, RemoteError> {
        let mut query = Vec::new();
        if let Some(token) = page_token {
            query.push(("page_token", token));
        }
        self.fetch_listing(&query).await
    }

    async fn download(&self, item_id: &str) -> Result<Vec<u8>, RemoteError> {
        let url = self.url(&format!("/files/{}/content", item_id));
        let mut body: Vec<u8> = Vec::new();
        let mut attempts = 0u32;

        // Ranged chunk loop; every failed or short chunk burns one attempt.
        loop {
            if attempts >= self.download_retries {
                warn!(item_id, attempts, "download retry budget exhausted");
                return Err(RemoteError::Timeout { attempts });
            }
            attempts += 1;

            let range = format!("bytes={}-{}", body.len(), body.len() as u64 + CHUNK_BYTES - 1);
            let result = self
                .client
                .get(&url)
                .header(reqwest::header::RANGE, range)
                .send()
                .await;

            let response = match result {
                Ok(r) => r,
                Err(e) => {
                    debug!(item_id, attempt = attempts, %e, "chunk request failed");
                    self.backoff(attempts).await;
                    continue;
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::RANGE_NOT_SATISFIABLE {
                // Read past the end: the body is complete.
                return Ok(body);
            }
            let response = match check_status(response) {
                Ok(r) => r,
                Err(e @ (RemoteError::Auth(_) | RemoteError::NotFound(_))) => return Err(e),
                Err(e) => {
                    debug!(item_id, attempt = attempts, %e, "chunk rejected");
                    self.backoff(attempts).await;
                    continue;
                }
            };

            let complete = status != reqwest::StatusCode::PARTIAL_CONTENT;
            let chunk = match response.bytes().await {
                Ok(b) => b,
                Err(e) => {
                    debug!(item_id, attempt = attempts, %e, "chunk body failed");
                    self.backoff(attempts).await;
                    continue;
                }
            };

            body.extend_from_slice(&chunk);
            if complete || (chunk.len() as u64) < CHUNK_BYTES {
                return Ok(body);
            }
        }
    }

    async fn find_folder(&self, name: &str) -> Result<Option<String>, RemoteError> {
        let listing: WireListing = self
            .get_json(&self.url("/folders"), &[("name", name)])
            .await?;
        Ok(listing.files.into_iter().next().map(|f| f.id))
    }

    async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, RemoteError> {
        let mut body = serde_json::json!({ "name": name });
        if let Some(parent) = parent_id {
            body["parent"] = serde_json::Value::String(parent.to_string());
        }
        let response = self
            .client
            .post(self.url("/folders"))
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::Io(e.to_string()))?;
        let response = check_status(response)?;
        let created: WireCreated = response
            .json()
            .await
            .map_err(|e| RemoteError::Io(format!("invalid response body: {}", e)))?;
        Ok(created.id)
    }

    async fn parents_of(&self, item_id: &str) -> Result<Vec<String>, RemoteError> {
        let item: WireItem = self
            .get_json(&self.url(&format!("/files/{}", item_id)), &[])
            .await?;
        Ok(item.parents)
    }

    async fn update_parents(
        &self,
        item_id: &str,
        add_parent: &str,
        remove_parents: &[String],
    ) -> Result<(), RemoteError> {
        let body = serde_json::json!({
            "add": add_parent,
            "remove": remove_parents,
        });
        let response = self
            .client
            .patch(self.url(&format!("/files/{}/parents", item_id)))
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::Io(e.to_string()))?;
        check_status(response).map(|_| ())
    }

    async fn delete(&self, item_id: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.url(&format!("/files/{}", item_id)))
            .send()
            .await
            .map_err(|e| RemoteError::Io(e.to_string()))?;
        check_status(response).map(|_| ())
    }
}
