//! Durable storage orchestration.
//!
//! The [`StorageOrchestrator`] drives the three-step ensure-available
//! protocol over two collaborator seams: [`ObjectStoreClient`] for the
//! durable store and [`ContentNetworkClient`] for the content-addressed
//! network. Stock HTTP implementations of both are included; hosts
//! with other backends implement the traits.

pub mod network;
pub mod object_store;
pub mod orchestrator;
pub mod path;
pub mod progress;

pub use network::{
    ContentNetworkClient, GatewayClient, GatewayHealth, NetworkError, NetworkFetchOptions,
    NetworkPayload, PROBE_IDENTIFIER,
};
pub use object_store::{
    HttpObjectStore, ObjectStoreClient, ObjectStoreError, StoreHealth, UploadOptions,
    UploadReceipt,
};
pub use orchestrator::{
    FlowError, NetworkStatus, StorageFlowResult, StorageOrchestrator, StorageStatus,
    TransferResult,
};
pub use path::{is_storable_identifier, storage_path};
pub use progress::{ProgressReporter, ProgressSink, TransferPhase, TransferProgress};
