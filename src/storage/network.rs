//! Content network client with gateway fallback.
//!
//! Fetching by identifier walks the configured gateways sequentially
//! until one serves the bytes; individual gateway failures stay local
//! and only the all-gateways-failed case surfaces as an error. Probing
//! checks every gateway in parallel with a small known identifier.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::NetworkConfig;
use crate::loader::fetch::{ByteProgress, FetchError, Fetcher};
use crate::resolver::{is_valid_identifier, network_url};
use crate::retry::{retry, RetryError, RetryPolicy};

/// Well-known identifier used for gateway reachability probes. Small,
/// pinned widely, and effectively always resolvable on a healthy
/// gateway.
pub const PROBE_IDENTIFIER: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("invalid content identifier: {0}")]
    InvalidIdentifier(String),
    /// Every configured gateway was tried and none served the bytes.
    #[error("failed to fetch {identifier} from all {gateways} gateways")]
    AllGatewaysFailed { identifier: String, gateways: usize },
    #[error("content network fetch cancelled")]
    Cancelled,
}

/// Bytes served by a gateway, with enough metadata for the caller to
/// upload or cache them.
#[derive(Debug, Clone)]
pub struct NetworkPayload {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    /// Gateway that actually served the fetch.
    pub gateway: String,
    pub load_time_ms: u64,
}

impl NetworkPayload {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Per-call knobs for [`ContentNetworkClient::fetch`].
#[derive(Default)]
pub struct NetworkFetchOptions<'a> {
    /// Overrides the configured per-gateway timeout.
    pub timeout: Option<Duration>,
    /// Aborts the walk and any in-flight gateway request when fired.
    pub cancel: Option<&'a CancellationToken>,
    /// Receives byte-level download progress.
    pub on_bytes: Option<&'a ByteProgress>,
}

impl std::fmt::Debug for NetworkFetchOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkFetchOptions")
            .field("timeout", &self.timeout)
            .field("cancel", &self.cancel.is_some())
            .field("on_bytes", &self.on_bytes.is_some())
            .finish()
    }
}

/// Reachability of a single gateway.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayHealth {
    pub gateway: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

// ============================================================================
// Trait
// ============================================================================

/// Fetch-by-identifier capability of the content-addressed network.
/// The orchestrator consumes this; [`GatewayClient`] is the stock
/// implementation.
#[async_trait]
pub trait ContentNetworkClient: Send + Sync {
    /// Fetches the payload for `identifier`, trying gateways in order.
    async fn fetch(
        &self,
        identifier: &str,
        options: NetworkFetchOptions<'_>,
    ) -> Result<NetworkPayload, NetworkError>;

    /// Probes every configured gateway for reachability.
    async fn probe_gateways(&self) -> Vec<GatewayHealth>;
}

// ============================================================================
// Gateway client
// ============================================================================

/// HTTP-gateway-backed [`ContentNetworkClient`].
pub struct GatewayClient<F: Fetcher> {
    fetcher: Arc<F>,
    gateways: Vec<String>,
    timeout: Duration,
}

impl<F: Fetcher> GatewayClient<F> {
    pub fn new(fetcher: Arc<F>, config: &NetworkConfig) -> Self {
        Self {
            fetcher,
            gateways: config.gateway_order(),
            timeout: config.timeout,
        }
    }

    pub fn gateways(&self) -> &[String] {
        &self.gateways
    }
}

#[async_trait]
impl<F: Fetcher> ContentNetworkClient for GatewayClient<F> {
    async fn fetch(
        &self,
        identifier: &str,
        options: NetworkFetchOptions<'_>,
    ) -> Result<NetworkPayload, NetworkError> {
        if !is_valid_identifier(identifier) {
            return Err(NetworkError::InvalidIdentifier(identifier.to_string()));
        }
        if self.gateways.is_empty() {
            return Err(NetworkError::AllGatewaysFailed {
                identifier: identifier.to_string(),
                gateways: 0,
            });
        }

        let timeout = options.timeout.unwrap_or(self.timeout);
        let owned_token;
        let cancel = match options.cancel {
            Some(token) => token,
            None => {
                owned_token = CancellationToken::new();
                &owned_token
            }
        };

        let started = Instant::now();
        // One gateway per attempt, no delay between them.
        let policy = RetryPolicy::attempts(self.gateways.len() as u32);
        let result = retry(policy, cancel, |attempt| {
            let gateway = self.gateways[attempt as usize].clone();
            let on_bytes = options.on_bytes;
            async move {
                let url = match network_url(&gateway, identifier) {
                    Ok(url) => url,
                    Err(err) => {
                        warn!(gateway = %gateway, error = %err, "skipping unusable gateway");
                        return Err(FetchError::InvalidUrl(err.to_string()));
                    }
                };
                debug!(gateway = %gateway, identifier, "trying content gateway");
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => Err(FetchError::Aborted),
                    fetched = tokio::time::timeout(
                        timeout,
                        self.fetcher.fetch_with_progress(&url, on_bytes),
                    ) => match fetched {
                        Ok(result) => result,
                        Err(_) => Err(FetchError::Timeout {
                            after_ms: timeout.as_millis() as u64,
                        }),
                    },
                };
                match outcome {
                    Ok(payload) => Ok((payload, gateway)),
                    Err(err) => {
                        warn!(gateway = %gateway, identifier, error = %err, "gateway fetch failed");
                        Err(err)
                    }
                }
            }
        })
        .await;

        match result {
            Ok((payload, gateway)) => {
                let load_time_ms = started.elapsed().as_millis() as u64;
                info!(
                    identifier,
                    gateway = %gateway,
                    bytes = payload.measured_size(),
                    load_time_ms,
                    "fetched content from network"
                );
                Ok(NetworkPayload {
                    content_type: payload.content_type.clone(),
                    bytes: payload.bytes,
                    gateway,
                    load_time_ms,
                })
            }
            Err(RetryError::Cancelled) | Err(RetryError::Exhausted(FetchError::Aborted)) => {
                Err(NetworkError::Cancelled)
            }
            Err(RetryError::Exhausted(_)) => Err(NetworkError::AllGatewaysFailed {
                identifier: identifier.to_string(),
                gateways: self.gateways.len(),
            }),
        }
    }

    async fn probe_gateways(&self) -> Vec<GatewayHealth> {
        let checks = self.gateways.iter().map(|gateway| {
            let gateway = gateway.clone();
            async move {
                let url = match network_url(&gateway, PROBE_IDENTIFIER) {
                    Ok(url) => url,
                    Err(_) => {
                        return GatewayHealth {
                            gateway,
                            available: false,
                            latency_ms: None,
                        }
                    }
                };
                let started = Instant::now();
                let available = matches!(
                    tokio::time::timeout(PROBE_TIMEOUT, self.fetcher.probe(&url)).await,
                    Ok(Ok(()))
                );
                GatewayHealth {
                    gateway,
                    available,
                    latency_ms: available.then(|| started.elapsed().as_millis() as u64),
                }
            }
        });
        futures::future::join_all(checks).await
    }
}
