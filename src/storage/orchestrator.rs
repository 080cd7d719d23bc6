//! Ensure-available orchestration.
//!
//! Composes the durable store and the content network into a
//! three-step protocol, always run top to bottom with a short-circuit
//! on the first success:
//!
//! 1. probe an already-known durable-store URL and return it if
//!    reachable
//! 2. transfer by identifier: check the deterministic storage path,
//!    fetch from the network, upload to the store
//! 3. fall back to the best remaining input URL, with a warning
//!
//! Re-running the flow with the same input never uploads twice; both
//! the step-1 probe and the step-2 existence check run before any
//! write. Per-step failures accumulate as warnings; only the
//! nothing-usable case is an error.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::loader::fetch::{Fetcher, HttpFetcher};
use crate::resolver::{MediaFormat, SourceInput};
use crate::storage::network::{
    ContentNetworkClient, GatewayClient, GatewayHealth, NetworkFetchOptions,
};
use crate::storage::object_store::{
    HttpObjectStore, ObjectStoreClient, StoreHealth, UploadOptions,
};
use crate::storage::path::{is_storable_identifier, storage_path};
use crate::storage::progress::{
    ProgressReporter, ProgressSink, TransferPhase, TransferProgress, COMPLETE_PERCENT,
    FLOW_PROBE_PERCENT, FLOW_TRANSFER_SPAN, FLOW_TRANSFER_START_PERCENT, TRANSFER_EXISTS_PERCENT,
    TRANSFER_FETCH_MIDPOINT, TRANSFER_FETCH_PERCENT, TRANSFER_FETCH_SPAN,
    TRANSFER_UPLOAD_PERCENT, TRANSFER_UPLOAD_SPAN,
};

const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Results
// ============================================================================

/// Outcome of one transfer attempt. Failures are data, not errors, so
/// the flow can degrade without exception plumbing.
#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub success: bool,
    /// Public URL in the durable store, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub transfer_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The object was already at its storage path; nothing was fetched
    /// or written.
    pub already_exists: bool,
}

impl TransferResult {
    fn failed(identifier: &str, started: Instant, error: impl Into<String>) -> Self {
        Self {
            success: false,
            target_url: None,
            identifier: Some(identifier.to_string()),
            transfer_time_ms: started.elapsed().as_millis() as u64,
            file_size: None,
            error: Some(error.into()),
            already_exists: false,
        }
    }
}

/// Terminal output of [`StorageOrchestrator::ensure_available`].
#[derive(Debug, Clone, Serialize)]
pub struct StorageFlowResult {
    /// Best URL for the content after the flow ran.
    pub final_url: String,
    /// The content was already reachable in the durable store (step 1
    /// probe, or step 2 found it at its storage path).
    pub found_in_durable_store: bool,
    /// A new upload was written during this call.
    pub transfer_performed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_result: Option<TransferResult>,
    pub total_time_ms: u64,
    /// Degradations hit along the way; empty on a clean run.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// The one hard failure of the flow: no step produced a usable URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("complete storage flow failed: no usable content sources found in any step of the flow")]
    NoUsableSources,
}

/// Combined health of both storage systems.
#[derive(Debug, Clone, Serialize)]
pub struct StorageStatus {
    pub durable_store: StoreHealth,
    pub content_network: NetworkStatus,
}

impl StorageStatus {
    /// Both systems answered their probes.
    pub fn fully_available(&self) -> bool {
        self.durable_store.available && self.content_network.available
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkStatus {
    /// At least one gateway answered the probe.
    pub available: bool,
    pub gateways: Vec<GatewayHealth>,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// See the module docs.
pub struct StorageOrchestrator<S, N, F> {
    store: Arc<S>,
    network: Arc<N>,
    fetcher: Arc<F>,
    config: StorageConfig,
    current: Mutex<Option<CancellationToken>>,
}

impl StorageOrchestrator<HttpObjectStore, GatewayClient<HttpFetcher>, HttpFetcher> {
    /// Stock wiring: HTTP store adapter, HTTP gateway client, one
    /// shared fetcher.
    pub fn from_config(config: StorageConfig) -> Self {
        let fetcher = Arc::new(HttpFetcher::new());
        let store = Arc::new(HttpObjectStore::new(config.store.clone()));
        let network = Arc::new(GatewayClient::new(Arc::clone(&fetcher), &config.network));
        Self::new(store, network, fetcher, config)
    }
}

impl<S, N, F> StorageOrchestrator<S, N, F>
where
    S: ObjectStoreClient,
    N: ContentNetworkClient,
    F: Fetcher,
{
    pub fn new(store: Arc<S>, network: Arc<N>, fetcher: Arc<F>, config: StorageConfig) -> Self {
        Self {
            store,
            network,
            fetcher,
            config,
            current: Mutex::new(None),
        }
    }

    /// Runs the three-step protocol. Returns `Err` only when no step
    /// yields a usable URL.
    pub async fn ensure_available(
        &self,
        input: &SourceInput,
        progress: Option<ProgressSink>,
    ) -> Result<StorageFlowResult, FlowError> {
        let started = Instant::now();
        let reporter = ProgressReporter::new(progress);
        let cancel = CancellationToken::new();
        self.install_token(cancel.clone());
        let mut warnings: Vec<String> = Vec::new();

        // Step 1: the content may already be durably stored.
        if let Some(store_url) = non_empty(input.store_url.as_deref()) {
            reporter.emit(
                TransferProgress::new(TransferPhase::Preparing, FLOW_PROBE_PERCENT)
                    .with_message("checking durable store URL accessibility"),
            );
            if self.url_reachable(store_url, &cancel).await {
                info!(url = store_url, "content already reachable in durable store");
                self.clear_token();
                return Ok(StorageFlowResult {
                    final_url: store_url.to_string(),
                    found_in_durable_store: true,
                    transfer_performed: false,
                    transfer_result: None,
                    total_time_ms: started.elapsed().as_millis() as u64,
                    warnings,
                });
            }
            warnings.push("durable store URL exists but not accessible".to_string());
        }

        // Step 2: migrate from the content network.
        if let Some(identifier) = non_empty(input.identifier.as_deref()) {
            reporter.emit(
                TransferProgress::new(TransferPhase::Preparing, FLOW_TRANSFER_START_PERCENT)
                    .with_message("starting content network to durable store transfer"),
            );
            let scoped = reporter.scaled(FLOW_TRANSFER_START_PERCENT, FLOW_TRANSFER_SPAN);
            let result = self.transfer_inner(identifier, &scoped, &cancel).await;

            match result.target_url.clone() {
                Some(url) if result.success => {
                    reporter.emit(
                        TransferProgress::new(TransferPhase::Complete, COMPLETE_PERCENT)
                            .with_message("transfer completed successfully"),
                    );
                    // An object that was already at its path counts as
                    // found, not transferred; transfer_performed is
                    // only ever true after a confirmed upload.
                    let already = result.already_exists;
                    info!(identifier, url = %url, already_exists = already, "content network transfer succeeded");
                    self.clear_token();
                    return Ok(StorageFlowResult {
                        final_url: url,
                        found_in_durable_store: already,
                        transfer_performed: !already,
                        transfer_result: Some(result),
                        total_time_ms: started.elapsed().as_millis() as u64,
                        warnings,
                    });
                }
                _ => {
                    let detail = result
                        .error
                        .as_deref()
                        .unwrap_or("transfer operation failed");
                    warnings.push(format!("content network transfer failed: {detail}"));
                }
            }
        }

        // Step 3: degrade to whatever input URL remains.
        self.clear_token();
        let fallback = non_empty(input.thumbnail_url.as_deref())
            .or_else(|| non_empty(input.processed_url.as_deref()))
            .or_else(|| non_empty(input.external_urls.first().map(|u| u.as_str())));
        if let Some(url) = fallback {
            warn!(url, "falling back to alternative content URL");
            warnings.push("using fallback URL - storage operations failed".to_string());
            return Ok(StorageFlowResult {
                final_url: url.to_string(),
                found_in_durable_store: false,
                transfer_performed: false,
                transfer_result: None,
                total_time_ms: started.elapsed().as_millis() as u64,
                warnings,
            });
        }

        warn!(elapsed_ms = started.elapsed().as_millis() as u64, "storage flow exhausted every step");
        Err(FlowError::NoUsableSources)
    }

    /// Standalone transfer of one identifier into the durable store.
    /// Progress runs on the transfer's own 0-100% scale.
    pub async fn transfer(
        &self,
        identifier: &str,
        progress: Option<ProgressSink>,
    ) -> TransferResult {
        let cancel = CancellationToken::new();
        self.install_token(cancel.clone());
        let reporter = ProgressReporter::new(progress);
        let result = self.transfer_inner(identifier, &reporter, &cancel).await;
        self.clear_token();
        result
    }

    /// Health of both storage systems, checked concurrently.
    pub async fn status(&self) -> StorageStatus {
        let (durable_store, gateways) =
            tokio::join!(self.store.health(), self.network.probe_gateways());
        let available = gateways.iter().any(|g| g.available);
        StorageStatus {
            durable_store,
            content_network: NetworkStatus {
                available,
                gateways,
            },
        }
    }

    /// Cancels the in-flight flow or transfer, if any.
    pub fn abort(&self) {
        let token = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            token.cancel();
        }
    }

    async fn transfer_inner(
        &self,
        identifier: &str,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> TransferResult {
        let started = Instant::now();

        if !is_storable_identifier(identifier) {
            return TransferResult::failed(identifier, started, "invalid content identifier provided");
        }

        let path = storage_path(
            &self.config.store.path_prefix,
            identifier,
            &self.config.store.default_extension,
        );

        // Idempotency: a previous run may have stored this already.
        reporter.emit(
            TransferProgress::new(TransferPhase::Preparing, TRANSFER_EXISTS_PERCENT)
                .with_message("checking durable store for existing object"),
        );
        match self.store.exists(&path).await {
            Ok(true) => {
                let url = self.store.public_url(&path);
                debug!(path, "object already stored, returning existing URL");
                return TransferResult {
                    success: true,
                    target_url: Some(url),
                    identifier: Some(identifier.to_string()),
                    transfer_time_ms: started.elapsed().as_millis() as u64,
                    file_size: None,
                    error: None,
                    already_exists: true,
                };
            }
            Ok(false) => {}
            Err(err) => return TransferResult::failed(identifier, started, err.to_string()),
        }

        // Fetch from the content network, forwarding byte progress
        // into the 20-70% band.
        reporter.emit(
            TransferProgress::new(TransferPhase::Uploading, TRANSFER_FETCH_PERCENT)
                .with_message("fetching content from network"),
        );
        let byte_reporter = reporter.clone();
        let on_bytes = move |loaded: u64, total: Option<u64>| {
            let span = match total {
                Some(total) if total > 0 => (loaded as f64 / total as f64) * TRANSFER_FETCH_SPAN,
                _ => TRANSFER_FETCH_MIDPOINT,
            };
            byte_reporter.emit(
                TransferProgress::new(TransferPhase::Uploading, TRANSFER_FETCH_PERCENT + span)
                    .with_bytes(loaded, total)
                    .with_message("downloading from content network"),
            );
        };
        let payload = match self
            .network
            .fetch(
                identifier,
                NetworkFetchOptions {
                    timeout: Some(self.config.network.timeout),
                    cancel: Some(cancel),
                    on_bytes: Some(&on_bytes),
                },
            )
            .await
        {
            Ok(payload) => payload,
            Err(err) => return TransferResult::failed(identifier, started, err.to_string()),
        };

        let size = payload.size();
        if size > self.config.upload.max_file_size {
            return TransferResult::failed(
                identifier,
                started,
                format!(
                    "payload of {size} bytes exceeds upload limit of {} bytes",
                    self.config.upload.max_file_size
                ),
            );
        }

        // Upload, with the store's 0-100% mapped onto 70-95%.
        reporter.emit(
            TransferProgress::new(TransferPhase::Uploading, TRANSFER_UPLOAD_PERCENT)
                .with_message("uploading to durable store"),
        );
        let content_type = payload
            .content_type
            .clone()
            .unwrap_or_else(|| MediaFormat::Jpg.mime_type().to_string());
        let options = UploadOptions {
            content_type: Some(content_type),
            ..UploadOptions::default()
        };
        let upload_reporter = reporter.scaled(TRANSFER_UPLOAD_PERCENT, TRANSFER_UPLOAD_SPAN);
        let receipt = tokio::select! {
            _ = cancel.cancelled() => {
                return TransferResult::failed(identifier, started, "content transfer aborted");
            }
            uploaded = self.store.upload(payload.bytes.clone(), &path, &options, &upload_reporter) => {
                match uploaded {
                    Ok(receipt) => receipt,
                    Err(err) => return TransferResult::failed(identifier, started, err.to_string()),
                }
            }
        };

        reporter.emit(
            TransferProgress::new(TransferPhase::Complete, COMPLETE_PERCENT)
                .with_message("transfer completed successfully"),
        );
        info!(identifier, path, size, "content transferred to durable store");
        TransferResult {
            success: true,
            target_url: Some(receipt.url),
            identifier: Some(identifier.to_string()),
            transfer_time_ms: started.elapsed().as_millis() as u64,
            file_size: Some(size),
            error: None,
            already_exists: false,
        }
    }

    async fn url_reachable(&self, url: &str, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            probed = tokio::time::timeout(REACHABILITY_TIMEOUT, self.fetcher.probe(url)) => {
                matches!(probed, Ok(Ok(())))
            }
        }
    }

    fn install_token(&self, token: CancellationToken) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn clear_token(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::fetch::{FetchError, FetchedPayload};
    use crate::storage::network::{NetworkError, NetworkPayload};
    use crate::storage::object_store::{ObjectStoreError, UploadReceipt};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const ID: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

    struct MockStore {
        stored: AtomicBool,
        exists_calls: AtomicUsize,
        upload_calls: AtomicUsize,
        fail_upload: bool,
    }

    impl MockStore {
        fn empty() -> Self {
            Self {
                stored: AtomicBool::new(false),
                exists_calls: AtomicUsize::new(0),
                upload_calls: AtomicUsize::new(0),
                fail_upload: false,
            }
        }

        fn holding_object() -> Self {
            let store = Self::empty();
            store.stored.store(true, Ordering::SeqCst);
            store
        }

        fn failing_upload() -> Self {
            Self {
                fail_upload: true,
                ..Self::empty()
            }
        }
    }

    #[async_trait]
    impl ObjectStoreClient for MockStore {
        async fn upload(
            &self,
            _bytes: Bytes,
            path: &str,
            _options: &UploadOptions,
            progress: &ProgressReporter,
        ) -> Result<UploadReceipt, ObjectStoreError> {
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_upload {
                return Err(ObjectStoreError::Status {
                    status: 500,
                    path: path.to_string(),
                });
            }
            progress.emit(TransferProgress::new(TransferPhase::Uploading, 100.0));
            self.stored.store(true, Ordering::SeqCst);
            Ok(UploadReceipt {
                url: format!("https://store.test/object/public/media/{path}"),
                size: 1024,
            })
        }

        async fn exists(&self, _path: &str) -> Result<bool, ObjectStoreError> {
            self.exists_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.stored.load(Ordering::SeqCst))
        }

        fn public_url(&self, path: &str) -> String {
            format!("https://store.test/object/public/media/{path}")
        }

        async fn health(&self) -> StoreHealth {
            StoreHealth {
                available: true,
                latency_ms: Some(3),
                error: None,
            }
        }
    }

    struct MockNetwork {
        fetch_calls: AtomicUsize,
        payload: Option<Bytes>,
    }

    impl MockNetwork {
        fn serving(bytes: &'static [u8]) -> Self {
            Self {
                fetch_calls: AtomicUsize::new(0),
                payload: Some(Bytes::from_static(bytes)),
            }
        }

        fn unreachable() -> Self {
            Self {
                fetch_calls: AtomicUsize::new(0),
                payload: None,
            }
        }
    }

    #[async_trait]
    impl ContentNetworkClient for MockNetwork {
        async fn fetch(
            &self,
            identifier: &str,
            _options: NetworkFetchOptions<'_>,
        ) -> Result<NetworkPayload, NetworkError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            match &self.payload {
                Some(bytes) => Ok(NetworkPayload {
                    bytes: bytes.clone(),
                    content_type: Some("image/png".to_string()),
                    gateway: "https://gateway.test/ipfs".to_string(),
                    load_time_ms: 5,
                }),
                None => Err(NetworkError::AllGatewaysFailed {
                    identifier: identifier.to_string(),
                    gateways: 2,
                }),
            }
        }

        async fn probe_gateways(&self) -> Vec<GatewayHealth> {
            vec![GatewayHealth {
                gateway: "https://gateway.test/ipfs".to_string(),
                available: self.payload.is_some(),
                latency_ms: self.payload.as_ref().map(|_| 7),
            }]
        }
    }

    struct ProbeFetcher {
        reachable: bool,
        probe_calls: AtomicUsize,
    }

    impl ProbeFetcher {
        fn new(reachable: bool) -> Self {
            Self {
                reachable,
                probe_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetcher for ProbeFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchedPayload, FetchError> {
            Err(FetchError::Network("fetch unsupported in this mock".to_string()))
        }

        async fn probe(&self, url: &str) -> Result<(), FetchError> {
            self.probe_calls.fetch_add(1, Ordering::SeqCst);
            if self.reachable {
                Ok(())
            } else {
                Err(FetchError::Status {
                    status: 403,
                    url: url.to_string(),
                })
            }
        }
    }

    fn orchestrator(
        store: MockStore,
        network: MockNetwork,
        fetcher: ProbeFetcher,
    ) -> StorageOrchestrator<MockStore, MockNetwork, ProbeFetcher> {
        StorageOrchestrator::new(
            Arc::new(store),
            Arc::new(network),
            Arc::new(fetcher),
            StorageConfig::new("https://store.test", "key-0123456789"),
        )
    }

    fn input_with_store_url() -> SourceInput {
        SourceInput {
            store_url: Some("https://store.test/object/public/media/a.jpg".to_string()),
            identifier: Some(ID.to_string()),
            ..SourceInput::default()
        }
    }

    #[tokio::test]
    async fn reachable_store_url_short_circuits() {
        let orchestrator = orchestrator(
            MockStore::empty(),
            MockNetwork::serving(&[1u8; 16]),
            ProbeFetcher::new(true),
        );

        let flow = orchestrator
            .ensure_available(&input_with_store_url(), None)
            .await
            .unwrap();

        assert!(flow.found_in_durable_store);
        assert!(!flow.transfer_performed);
        assert_eq!(flow.final_url, "https://store.test/object/public/media/a.jpg");
        assert!(flow.warnings.is_empty());
        // nothing was fetched or written
        assert_eq!(orchestrator.network.fetch_calls.load(Ordering::SeqCst), 0);
        assert_eq!(orchestrator.store.upload_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_store_url_falls_through_to_transfer() {
        let orchestrator = orchestrator(
            MockStore::empty(),
            MockNetwork::serving(&[1u8; 16]),
            ProbeFetcher::new(false),
        );

        let flow = orchestrator
            .ensure_available(&input_with_store_url(), None)
            .await
            .unwrap();

        assert!(!flow.found_in_durable_store);
        assert!(flow.transfer_performed);
        assert!(flow
            .warnings
            .iter()
            .any(|w| w == "durable store URL exists but not accessible"));
        assert_eq!(orchestrator.network.fetch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.store.upload_calls.load(Ordering::SeqCst), 1);
        let transfer = flow.transfer_result.unwrap();
        assert!(transfer.success);
        assert_eq!(transfer.file_size, Some(16));
    }

    #[tokio::test]
    async fn existing_object_skips_fetch_and_upload() {
        let orchestrator = orchestrator(
            MockStore::holding_object(),
            MockNetwork::serving(&[1u8; 16]),
            ProbeFetcher::new(false),
        );
        let input = SourceInput {
            identifier: Some(ID.to_string()),
            ..SourceInput::default()
        };

        let flow = orchestrator.ensure_available(&input, None).await.unwrap();

        assert!(flow.found_in_durable_store);
        assert!(!flow.transfer_performed);
        let transfer = flow.transfer_result.unwrap();
        assert!(transfer.already_exists);
        assert_eq!(orchestrator.network.fetch_calls.load(Ordering::SeqCst), 0);
        assert_eq!(orchestrator.store.upload_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rerunning_the_flow_never_uploads_twice() {
        let orchestrator = orchestrator(
            MockStore::empty(),
            MockNetwork::serving(&[1u8; 16]),
            ProbeFetcher::new(false),
        );
        let input = SourceInput {
            identifier: Some(ID.to_string()),
            ..SourceInput::default()
        };

        let first = orchestrator.ensure_available(&input, None).await.unwrap();
        assert!(first.transfer_performed);

        let second = orchestrator.ensure_available(&input, None).await.unwrap();
        assert!(second.found_in_durable_store);
        assert!(!second.transfer_performed);
        assert_eq!(orchestrator.store.upload_calls.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.network.fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_transfer_degrades_to_fallback_url() {
        let orchestrator = orchestrator(
            MockStore::empty(),
            MockNetwork::unreachable(),
            ProbeFetcher::new(false),
        );
        let input = SourceInput {
            identifier: Some(ID.to_string()),
            thumbnail_url: Some("https://cdn.test/thumb.jpg".to_string()),
            ..SourceInput::default()
        };

        let flow = orchestrator.ensure_available(&input, None).await.unwrap();

        assert_eq!(flow.final_url, "https://cdn.test/thumb.jpg");
        assert!(!flow.found_in_durable_store);
        assert!(!flow.transfer_performed);
        assert!(flow
            .warnings
            .iter()
            .any(|w| w.starts_with("content network transfer failed:")));
        assert!(flow
            .warnings
            .iter()
            .any(|w| w == "using fallback URL - storage operations failed"));
    }

    #[tokio::test]
    async fn fallback_prefers_thumbnail_then_processed_then_external() {
        let orchestrator = orchestrator(
            MockStore::empty(),
            MockNetwork::unreachable(),
            ProbeFetcher::new(false),
        );
        let input = SourceInput {
            processed_url: Some("https://cdn.test/processed.jpg".to_string()),
            external_urls: vec!["https://elsewhere.test/x.jpg".to_string()],
            ..SourceInput::default()
        };

        let flow = orchestrator.ensure_available(&input, None).await.unwrap();
        assert_eq!(flow.final_url, "https://cdn.test/processed.jpg");
    }

    #[tokio::test]
    async fn nothing_usable_is_the_single_hard_error() {
        let orchestrator = orchestrator(
            MockStore::empty(),
            MockNetwork::unreachable(),
            ProbeFetcher::new(false),
        );

        let err = orchestrator
            .ensure_available(&SourceInput::default(), None)
            .await
            .unwrap_err();

        assert_eq!(err, FlowError::NoUsableSources);
        assert_eq!(
            err.to_string(),
            "complete storage flow failed: no usable content sources found in any step of the flow"
        );
    }

    #[tokio::test]
    async fn transfer_rejects_invalid_identifier_without_io() {
        let orchestrator = orchestrator(
            MockStore::empty(),
            MockNetwork::serving(b"x"),
            ProbeFetcher::new(true),
        );

        let result = orchestrator.transfer("not-an-identifier", None).await;

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("invalid content identifier provided")
        );
        assert_eq!(orchestrator.store.exists_calls.load(Ordering::SeqCst), 0);
        assert_eq!(orchestrator.network.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transfer_enforces_the_upload_size_limit() {
        let store = MockStore::empty();
        let network = MockNetwork::serving(&[0u8; 64]);
        let fetcher = ProbeFetcher::new(true);
        let mut config = StorageConfig::new("https://store.test", "key-0123456789");
        config.upload.max_file_size = 16;
        let orchestrator =
            StorageOrchestrator::new(Arc::new(store), Arc::new(network), Arc::new(fetcher), config);

        let result = orchestrator.transfer(ID, None).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("exceeds upload limit"));
        assert_eq!(orchestrator.store.upload_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn upload_failure_becomes_a_failed_result() {
        let orchestrator = orchestrator(
            MockStore::failing_upload(),
            MockNetwork::serving(&[1u8; 16]),
            ProbeFetcher::new(false),
        );

        let result = orchestrator.transfer(ID, None).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("status 500"));
        assert_eq!(result.identifier.as_deref(), Some(ID));
    }

    #[tokio::test]
    async fn flow_progress_is_monotonic_and_ends_at_100() {
        let orchestrator = orchestrator(
            MockStore::empty(),
            MockNetwork::serving(&[1u8; 16]),
            ProbeFetcher::new(false),
        );
        let input = SourceInput {
            identifier: Some(ID.to_string()),
            ..SourceInput::default()
        };

        let seen: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: ProgressSink = Arc::new(move |p: TransferProgress| {
            sink_seen.lock().unwrap().push(p.percentage);
        });

        orchestrator
            .ensure_available(&input, Some(sink))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert!(seen.len() >= 4);
        assert_eq!(seen[0], FLOW_TRANSFER_START_PERCENT);
        assert_eq!(*seen.last().unwrap(), COMPLETE_PERCENT);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "not monotonic: {seen:?}");
    }

    #[tokio::test]
    async fn standalone_transfer_progress_uses_its_own_scale() {
        let orchestrator = orchestrator(
            MockStore::empty(),
            MockNetwork::serving(&[1u8; 16]),
            ProbeFetcher::new(false),
        );

        let seen: Arc<Mutex<Vec<TransferProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: ProgressSink = Arc::new(move |p| {
            sink_seen.lock().unwrap().push(p);
        });

        let result = orchestrator.transfer(ID, Some(sink)).await;
        assert!(result.success);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].percentage, TRANSFER_EXISTS_PERCENT);
        assert_eq!(seen[0].phase, TransferPhase::Preparing);
        assert_eq!(seen.last().unwrap().percentage, COMPLETE_PERCENT);
        assert_eq!(seen.last().unwrap().phase, TransferPhase::Complete);
        // upload milestone re-mapped into the 70-95 band
        assert!(seen.iter().any(|p| p.percentage == 95.0));
    }

    #[tokio::test]
    async fn status_combines_both_health_checks() {
        let orchestrator = orchestrator(
            MockStore::empty(),
            MockNetwork::serving(&[1u8; 16]),
            ProbeFetcher::new(true),
        );

        let status = orchestrator.status().await;

        assert!(status.durable_store.available);
        assert!(status.content_network.available);
        assert!(status.fully_available());
        assert_eq!(status.content_network.gateways.len(), 1);
    }
}
