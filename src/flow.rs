//! Storage flow plus loading, composed.
//!
//! [`ContentPipeline`] runs the ensure-available protocol first (when
//! auto-transfer is on), substitutes the resulting URL as the
//! durable-store candidate, then resolves and loads. Content that just
//! landed in the durable store is not also offered from the network;
//! the candidate list is capped tighter than a plain resolve because
//! the flow has already picked a best URL.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::loader::engine::{LoadEngine, LoadOutcome, LoaderConfig};
use crate::loader::fetch::{Fetcher, HttpFetcher};
use crate::resolver::{resolve_sources, ResolutionConfig, SourceInput};
use crate::storage::network::{ContentNetworkClient, GatewayClient};
use crate::storage::object_store::{HttpObjectStore, ObjectStoreClient};
use crate::storage::orchestrator::{
    FlowError, StorageFlowResult, StorageOrchestrator, StorageStatus, TransferResult,
};
use crate::storage::progress::ProgressSink;

/// Candidate cap after the flow has run; the flow's final URL plus a
/// couple of fallbacks is all that is worth trying.
const FLOW_MAX_SOURCES: usize = 3;

/// Everything needed to build a stock pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub resolution: ResolutionConfig,
    pub loader: LoaderConfig,
    pub storage: StorageConfig,
    /// Run the storage flow before loading.
    pub auto_transfer: bool,
}

impl PipelineConfig {
    pub fn with_auto_transfer(storage: StorageConfig) -> Self {
        Self {
            storage,
            auto_transfer: true,
            ..Self::default()
        }
    }
}

/// Load result with the transfer that preceded it, when one ran.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub load: LoadOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer: Option<TransferResult>,
}

/// See the module docs.
pub struct ContentPipeline<S, N, F: Fetcher> {
    engine: LoadEngine<F>,
    orchestrator: StorageOrchestrator<S, N, F>,
    resolution: ResolutionConfig,
    auto_transfer: bool,
    storage_progress: Option<ProgressSink>,
}

impl ContentPipeline<HttpObjectStore, GatewayClient<HttpFetcher>, HttpFetcher> {
    /// Stock wiring: one shared HTTP fetcher under the engine, the
    /// store adapter and the gateway client.
    pub fn from_config(config: PipelineConfig) -> Self {
        let fetcher = Arc::new(HttpFetcher::new());
        let store = Arc::new(HttpObjectStore::new(config.storage.store.clone()));
        let network = Arc::new(GatewayClient::new(
            Arc::clone(&fetcher),
            &config.storage.network,
        ));
        let engine = LoadEngine::new(Arc::clone(&fetcher), config.loader.clone());
        let orchestrator =
            StorageOrchestrator::new(store, network, fetcher, config.storage.clone());
        Self {
            engine,
            orchestrator,
            resolution: config.resolution,
            auto_transfer: config.auto_transfer,
            storage_progress: None,
        }
    }
}

impl<S, N, F> ContentPipeline<S, N, F>
where
    S: ObjectStoreClient,
    N: ContentNetworkClient,
    F: Fetcher,
{
    pub fn new(
        engine: LoadEngine<F>,
        orchestrator: StorageOrchestrator<S, N, F>,
        resolution: ResolutionConfig,
        auto_transfer: bool,
    ) -> Self {
        Self {
            engine,
            orchestrator,
            resolution,
            auto_transfer,
            storage_progress: None,
        }
    }

    /// Installs a sink for storage-flow progress on future loads.
    pub fn with_storage_progress(mut self, sink: ProgressSink) -> Self {
        self.storage_progress = Some(sink);
        self
    }

    /// Loads content, running the storage flow first when auto-transfer
    /// is on. A flow hard-failure becomes a failed load outcome; it
    /// never panics or escapes as an error.
    pub async fn load(&self, input: &SourceInput) -> PipelineOutcome {
        if !self.auto_transfer {
            debug!("auto-transfer off, loading directly");
            let sources = resolve_sources(input, &self.resolution);
            return PipelineOutcome {
                load: self.engine.load(&sources).await,
                transfer: None,
            };
        }

        info!("running storage flow before load");
        let flow = match self
            .orchestrator
            .ensure_available(input, self.storage_progress.clone())
            .await
        {
            Ok(flow) => flow,
            Err(err) => {
                warn!(error = %err, "storage flow failed with nothing to load");
                return PipelineOutcome {
                    load: LoadOutcome::failure(err.to_string(), Vec::new()),
                    transfer: None,
                };
            }
        };

        // The flow's answer becomes the durable-store candidate, and
        // freshly transferred content is not re-offered from the
        // network it just left.
        let enhanced = SourceInput {
            store_url: Some(flow.final_url.clone()),
            ..input.clone()
        };
        let mut resolution = self.resolution.clone();
        resolution.max_sources = FLOW_MAX_SOURCES;
        resolution.include_network = !flow.transfer_performed;

        let sources = resolve_sources(&enhanced, &resolution);
        let load = self.engine.load(&sources).await;
        debug!(success = load.success, "flow-integrated load finished");
        PipelineOutcome {
            load,
            transfer: flow.transfer_result,
        }
    }

    /// Runs just the storage flow, no loading.
    pub async fn storage_flow(
        &self,
        input: &SourceInput,
    ) -> Result<StorageFlowResult, FlowError> {
        self.orchestrator
            .ensure_available(input, self.storage_progress.clone())
            .await
    }

    /// Health of both storage systems.
    pub async fn storage_status(&self) -> StorageStatus {
        self.orchestrator.status().await
    }

    /// Aborts the in-flight load, if any.
    pub fn abort(&self) {
        self.engine.abort();
        self.orchestrator.abort();
    }
}
