//! Content loading.
//!
//! The [`LoadEngine`] walks resolved sources with retries, caching and
//! cancellation; the [`Fetcher`] seam keeps the transport swappable.

pub mod engine;
pub mod fetch;

pub use engine::{AttemptDebug, AttemptStatus, LoadAttempt, LoadEngine, LoadOutcome, LoaderConfig};
pub use fetch::{ByteProgress, FetchError, FetchedPayload, Fetcher, HttpFetcher};
