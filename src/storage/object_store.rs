//! Durable object store client.
//!
//! The orchestrator only needs four capabilities from the store:
//! upload bytes to a path, check whether a path exists, mint the
//! public URL for a path, and report health. [`HttpObjectStore`] is
//! the stock adapter for stores with a supabase-style HTTP surface
//! (`/object/{bucket}/{path}` authenticated, `/object/public/...`
//! for reads).

use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ObjectStoreConfig;
use crate::storage::progress::{ProgressReporter, TransferPhase, TransferProgress};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObjectStoreError {
    #[error("object store request failed: {0}")]
    Request(String),
    #[error("object store returned status {status} for {path}")]
    Status { status: u16, path: String },
}

/// How an upload should be written.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    /// Overwrite an existing object instead of failing.
    pub upsert: bool,
}

/// Confirmation of a completed upload.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    /// Public URL the stored object is readable at.
    pub url: String,
    pub size: u64,
}

/// Health of the durable store.
#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Trait
// ============================================================================

/// Upload/exists/public-URL surface of the durable store. The
/// orchestrator consumes this; [`HttpObjectStore`] is the stock
/// implementation.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Writes `bytes` at `path`. Progress is reported on the reporter's
    /// own 0-100% scale; callers re-map it into their band.
    async fn upload(
        &self,
        bytes: Bytes,
        path: &str,
        options: &UploadOptions,
        progress: &ProgressReporter,
    ) -> Result<UploadReceipt, ObjectStoreError>;

    /// Whether an object already exists at `path`.
    async fn exists(&self, path: &str) -> Result<bool, ObjectStoreError>;

    /// Public read URL for `path`. Pure string construction, no I/O.
    fn public_url(&self, path: &str) -> String;

    /// Reachability check against the configured bucket.
    async fn health(&self) -> StoreHealth;
}

// ============================================================================
// HTTP adapter
// ============================================================================

/// reqwest-backed [`ObjectStoreClient`].
pub struct HttpObjectStore {
    client: reqwest::Client,
    config: ObjectStoreConfig,
}

impl HttpObjectStore {
    pub fn new(config: ObjectStoreConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Wraps a pre-configured client (proxies, custom TLS, headers).
    pub fn with_client(client: reqwest::Client, config: ObjectStoreConfig) -> Self {
        Self { client, config }
    }

    fn base(&self) -> &str {
        self.config
            .endpoint
            .strip_suffix('/')
            .unwrap_or(&self.config.endpoint)
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/object/{}/{}", self.base(), self.config.bucket, path)
    }
}

#[async_trait]
impl ObjectStoreClient for HttpObjectStore {
    async fn upload(
        &self,
        bytes: Bytes,
        path: &str,
        options: &UploadOptions,
        progress: &ProgressReporter,
    ) -> Result<UploadReceipt, ObjectStoreError> {
        let url = self.object_url(path);
        let size = bytes.len() as u64;

        // The HTTP surface gives no mid-flight upload feedback, so the
        // report is start and finish only.
        progress.emit(
            TransferProgress::new(TransferPhase::Uploading, 0.0).with_bytes(0, Some(size)),
        );

        let mut request = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .body(bytes);
        if let Some(content_type) = &options.content_type {
            request = request.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        if let Some(cache_control) = &options.cache_control {
            request = request.header(reqwest::header::CACHE_CONTROL, cache_control);
        }
        if options.upsert {
            request = request.header("x-upsert", "true");
        }

        let response = request
            .send()
            .await
            .map_err(|err| ObjectStoreError::Request(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            warn!(path, status = status.as_u16(), "object store upload rejected");
            return Err(ObjectStoreError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        debug!(path, size, "object stored");
        progress.emit(
            TransferProgress::new(TransferPhase::Uploading, 100.0).with_bytes(size, Some(size)),
        );
        Ok(UploadReceipt {
            url: self.public_url(path),
            size,
        })
    }

    async fn exists(&self, path: &str) -> Result<bool, ObjectStoreError> {
        let url = self.object_url(path);
        let response = self
            .client
            .head(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|err| ObjectStoreError::Request(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(true)
        } else if status.as_u16() == 404 {
            Ok(false)
        } else {
            Err(ObjectStoreError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            })
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/object/public/{}/{}",
            self.base(),
            self.config.bucket,
            path
        )
    }

    async fn health(&self) -> StoreHealth {
        let url = format!("{}/bucket/{}", self.base(), self.config.bucket);
        let started = Instant::now();
        match self
            .client
            .head(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => StoreHealth {
                available: true,
                latency_ms: Some(started.elapsed().as_millis() as u64),
                error: None,
            },
            Ok(response) => StoreHealth {
                available: false,
                latency_ms: None,
                error: Some(format!(
                    "bucket check returned status {}",
                    response.status().as_u16()
                )),
            },
            Err(err) => StoreHealth {
                available: false,
                latency_ms: None,
                error: Some(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> HttpObjectStore {
        HttpObjectStore::new(ObjectStoreConfig {
            endpoint: "https://store.example.com/".to_string(),
            api_key: "key-0123456789".to_string(),
            bucket: "media".to_string(),
            path_prefix: "content".to_string(),
            default_extension: "jpg".to_string(),
        })
    }

    #[test]
    fn public_url_layout() {
        assert_eq!(
            store().public_url("content/QmYwAPJz/QmYwAPJz.jpg"),
            "https://store.example.com/object/public/media/content/QmYwAPJz/QmYwAPJz.jpg"
        );
    }

    #[test]
    fn object_url_trims_trailing_slash_once() {
        assert_eq!(
            store().object_url("a/b.jpg"),
            "https://store.example.com/object/media/a/b.jpg"
        );
    }
}
