//! Platform fetch seam.
//!
//! The engine and the gateway client never talk HTTP directly; they go
//! through [`Fetcher`], so hosts with unusual transports (webviews,
//! proxies, test harnesses) can swap the bottom layer. [`HttpFetcher`]
//! is the stock reqwest-backed implementation.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Classified failure from a single fetch or probe.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("content load timeout after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("network error: {0}")]
    Network(String),
    /// A cross-origin rejection surfaced by the host environment.
    #[error("cross-origin rejection: {0}")]
    CrossOrigin(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("aborted")]
    Aborted,
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }

    /// True for typed cross-origin errors and for foreign error text
    /// that mentions CORS (custom fetchers often only have a message).
    pub fn is_cross_origin(&self) -> bool {
        match self {
            FetchError::CrossOrigin(_) => true,
            FetchError::Network(msg) => msg.contains("CORS"),
            _ => false,
        }
    }
}

/// Bytes plus the transport metadata the cache and the transfer path
/// care about.
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    /// Length declared by the transport, when it sent one.
    pub declared_length: Option<u64>,
}

impl FetchedPayload {
    pub fn measured_size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Byte-level progress callback: `(bytes_so_far, declared_total)`.
pub type ByteProgress = dyn Fn(u64, Option<u64>) + Send + Sync;

/// Minimal fetch capability. Implementations must not impose their own
/// overall deadline; callers bound every call with a budget of their
/// own choosing.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Retrieves the payload at `url`.
    async fn fetch(&self, url: &str) -> Result<FetchedPayload, FetchError>;

    /// Like [`Fetcher::fetch`] but reporting byte progress as the body
    /// arrives. The default implementation fetches in one piece and
    /// reports once on completion.
    async fn fetch_with_progress(
        &self,
        url: &str,
        on_bytes: Option<&ByteProgress>,
    ) -> Result<FetchedPayload, FetchError> {
        let payload = self.fetch(url).await?;
        if let Some(on_bytes) = on_bytes {
            let size = payload.measured_size();
            on_bytes(size, payload.declared_length.or(Some(size)));
        }
        Ok(payload)
    }

    /// Lightweight reachability check (HEAD or equivalent). Success
    /// means the URL would serve bytes; no payload is transferred.
    async fn probe(&self, url: &str) -> Result<(), FetchError>;
}

/// reqwest-backed [`Fetcher`].
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Wraps a pre-configured client (proxies, custom TLS, headers).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_builder() {
        FetchError::InvalidUrl(err.to_string())
    } else {
        FetchError::Network(err.to_string())
    }
}

fn ensure_success(url: &str, status: reqwest::StatusCode) -> Result<(), FetchError> {
    if status.as_u16() == 404 {
        return Err(FetchError::NotFound(url.to_string()));
    }
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(())
}

fn content_type_of(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

impl HttpFetcher {
    async fn get_checked(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self.client.get(url).send().await.map_err(classify)?;
        ensure_success(url, response.status())?;
        Ok(response)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPayload, FetchError> {
        let response = self.get_checked(url).await?;
        let content_type = content_type_of(&response);
        let declared_length = response.content_length();
        let bytes = response.bytes().await.map_err(classify)?;
        Ok(FetchedPayload {
            bytes,
            content_type,
            declared_length,
        })
    }

    async fn fetch_with_progress(
        &self,
        url: &str,
        on_bytes: Option<&ByteProgress>,
    ) -> Result<FetchedPayload, FetchError> {
        let mut response = self.get_checked(url).await?;
        let content_type = content_type_of(&response);
        let declared_length = response.content_length();
        let mut buf = bytes::BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(classify)? {
            buf.extend_from_slice(&chunk);
            if let Some(on_bytes) = on_bytes {
                on_bytes(buf.len() as u64, declared_length);
            }
        }
        Ok(FetchedPayload {
            bytes: buf.freeze(),
            content_type,
            declared_length,
        })
    }

    async fn probe(&self, url: &str) -> Result<(), FetchError> {
        let response = self.client.head(url).send().await.map_err(classify)?;
        ensure_success(url, response.status())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_origin_detection_covers_foreign_text() {
        assert!(FetchError::CrossOrigin("blocked".into()).is_cross_origin());
        assert!(FetchError::Network("CORS policy rejected it".into()).is_cross_origin());
        assert!(!FetchError::Network("connection refused".into()).is_cross_origin());
        assert!(!FetchError::NotFound("x".into()).is_cross_origin());
    }

    #[test]
    fn timeout_detection() {
        assert!(FetchError::Timeout { after_ms: 100 }.is_timeout());
        assert!(!FetchError::Aborted.is_timeout());
    }

    #[test]
    fn measured_size_is_byte_length() {
        let payload = FetchedPayload {
            bytes: Bytes::from_static(b"abcd"),
            content_type: None,
            declared_length: Some(4),
        };
        assert_eq!(payload.measured_size(), 4);
    }

    struct StubFetcher;

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchedPayload, FetchError> {
            Ok(FetchedPayload {
                bytes: Bytes::from_static(b"abcdefgh"),
                content_type: Some("image/png".to_string()),
                declared_length: None,
            })
        }

        async fn probe(&self, _url: &str) -> Result<(), FetchError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn default_progress_reports_once_on_completion() {
        use std::sync::{Arc, Mutex};

        let seen: Arc<Mutex<Vec<(u64, Option<u64>)>>> = Arc::new(Mutex::new(Vec::new()));
        let on_bytes = {
            let seen = Arc::clone(&seen);
            move |loaded: u64, total: Option<u64>| {
                seen.lock().unwrap().push((loaded, total));
            }
        };

        let payload = StubFetcher
            .fetch_with_progress("https://example.test/a.png", Some(&on_bytes))
            .await
            .unwrap();

        assert_eq!(payload.measured_size(), 8);
        // no declared length, so the measured size stands in for the total
        assert_eq!(*seen.lock().unwrap(), vec![(8, Some(8))]);
    }
}
