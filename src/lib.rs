//! Haven - multi-source content loading and durable storage
//!
//! "A safe harbor for content"
//!
//! Haven finds a usable rendering of a piece of content spread across
//! backends of different durability (a durable object store, a
//! content-addressed network, ad-hoc external URLs) and can migrate it
//! into the durable store along the way.
//!
//! ## Subsystems
//!
//! - **Resolver**: input description to an ordered, validated candidate list
//! - **Loader**: priority walk with retries, timeouts, caching and cancellation
//! - **Cache**: bounded TTL + LRU accounting of what loaded and how fast
//! - **Storage**: the three-step ensure-available protocol over the
//!   object-store and content-network clients
//! - **Flow**: storage flow and loading composed into one call

pub mod cache;
pub mod config;
pub mod flow;
pub mod loader;
pub mod resolver;
pub mod retry;
pub mod storage;

pub use config::{ConfigValidation, NetworkConfig, ObjectStoreConfig, StorageConfig, UploadPolicy};
pub use flow::{ContentPipeline, PipelineConfig, PipelineOutcome};
pub use loader::{LoadEngine, LoadOutcome, LoaderConfig};
pub use resolver::{resolve_sources, ContentSource, ResolutionConfig, SourceInput};
pub use storage::{
    ProgressSink, StorageFlowResult, StorageOrchestrator, StorageStatus, TransferProgress,
    TransferResult,
};
