//! Priority-ordered load engine.
//!
//! Walks a resolved candidate list in order, trying each source with a
//! bounded retry budget and consulting the cache before touching the
//! network. Every attempt is recorded; the outcome is a plain struct
//! rather than an error because exhausting all sources is an ordinary
//! result, not an exceptional one. One call, one cancellation token;
//! `abort()` kills the in-flight request and stops the walk.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::manager::now_millis;
use crate::cache::{CacheConfig, CacheManager, CacheStats, EntryPatch, PersistentStore};
use crate::loader::fetch::{FetchError, FetchedPayload, Fetcher};
use crate::resolver::ContentSource;
use crate::retry::{retry, Backoff, RetryError, RetryPolicy};

const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(1000);
const RETRY_BACKOFF_CAP: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Network retries per source on top of the first try.
    pub max_retries: u32,
    /// Attempt timeout for sources that carry none of their own.
    pub default_timeout: Duration,
    pub cache_enabled: bool,
    pub cache: CacheConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            default_timeout: Duration::from_millis(8000),
            cache_enabled: true,
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Pending,
    Success,
    Failed,
    Timeout,
    Aborted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttemptDebug {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_time_ms: Option<u64>,
    pub cache_hit: bool,
    pub cors_issue: bool,
}

/// One entry in the attempt log. Append-only; later attempts never
/// rewrite earlier ones.
#[derive(Debug, Clone, Serialize)]
pub struct LoadAttempt {
    pub source: ContentSource,
    pub started_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_ms: Option<u64>,
    pub status: AttemptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub debug: AttemptDebug,
}

/// Uniform result of a load call, success or not.
#[derive(Debug, Clone, Serialize)]
pub struct LoadOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ContentSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_time_ms: Option<u64>,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: Vec<LoadAttempt>,
}

impl LoadOutcome {
    pub(crate) fn failure(error: String, attempts: Vec<LoadAttempt>) -> Self {
        Self {
            success: false,
            final_url: None,
            source: None,
            load_time_ms: None,
            from_cache: false,
            error: Some(error),
            attempts,
        }
    }
}

/// See the module docs.
pub struct LoadEngine<F: Fetcher> {
    fetcher: Arc<F>,
    cache: CacheManager,
    config: LoaderConfig,
    current: Mutex<Option<CancellationToken>>,
}

impl<F: Fetcher> LoadEngine<F> {
    pub fn new(fetcher: Arc<F>, config: LoaderConfig) -> Self {
        let cache = CacheManager::new(config.cache.clone());
        Self {
            fetcher,
            cache,
            config,
            current: Mutex::new(None),
        }
    }

    /// Same as [`new`](Self::new) but with cache persistence attached.
    pub fn with_cache_store(
        fetcher: Arc<F>,
        config: LoaderConfig,
        store: Arc<dyn PersistentStore>,
    ) -> Self {
        let cache = CacheManager::with_store(config.cache.clone(), store);
        Self {
            fetcher,
            cache,
            config,
            current: Mutex::new(None),
        }
    }

    /// Tries each source in order until one loads. Returns a structured
    /// outcome in every case; an empty source list and a full
    /// exhaustion both come back as `success: false`.
    pub async fn load(&self, sources: &[ContentSource]) -> LoadOutcome {
        if sources.is_empty() {
            return LoadOutcome::failure("no content sources provided".to_string(), Vec::new());
        }

        let start = Instant::now();
        let token = CancellationToken::new();
        self.install_token(token.clone());
        let mut attempts = Vec::new();

        for source in sources {
            if token.is_cancelled() {
                break;
            }

            let attempt = self.attempt_source(source, &token).await;
            let succeeded = attempt.status == AttemptStatus::Success;
            let from_cache = attempt.debug.cache_hit;
            if let Some(error) = &attempt.error {
                debug!(url = %source.url, %error, "source attempt failed");
            }
            attempts.push(attempt);

            if succeeded {
                let load_time_ms = start.elapsed().as_millis() as u64;
                debug!(
                    url = %source.url,
                    provider = ?source.metadata.provider,
                    load_time_ms,
                    from_cache,
                    "content loaded"
                );
                self.clear_token();
                return LoadOutcome {
                    success: true,
                    final_url: Some(source.url.clone()),
                    source: Some(source.clone()),
                    load_time_ms: Some(load_time_ms),
                    from_cache,
                    error: None,
                    attempts,
                };
            }
        }

        self.clear_token();
        warn!(
            sources = sources.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "all content sources failed"
        );
        LoadOutcome::failure(
            format!("failed to load content from {} sources", sources.len()),
            attempts,
        )
    }

    /// Cancels the in-flight load, if any. The pending attempt settles
    /// as aborted and no further sources are tried.
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

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    async fn attempt_source(
        &self,
        source: &ContentSource,
        cancel: &CancellationToken,
    ) -> LoadAttempt {
        let start = Instant::now();
        let mut attempt = LoadAttempt {
            source: source.clone(),
            started_ms: now_millis(),
            finished_ms: None,
            status: AttemptStatus::Pending,
            error: None,
            debug: AttemptDebug::default(),
        };

        if self.config.cache_enabled && self.cache.has(&source.url) {
            debug!(url = %source.url, "cache hit");
            attempt.finished_ms = Some(now_millis());
            attempt.status = AttemptStatus::Success;
            attempt.debug = AttemptDebug {
                network_time_ms: Some(0),
                cache_hit: true,
                cors_issue: false,
            };
            return attempt;
        }

        let timeout = if source.timeout_ms > 0 {
            Duration::from_millis(source.timeout_ms)
        } else {
            self.config.default_timeout
        };
        let policy = RetryPolicy {
            max_attempts: self.config.max_retries + 1,
            backoff: Backoff::Exponential {
                base: RETRY_BACKOFF_BASE,
                cap: RETRY_BACKOFF_CAP,
            },
        };

        let result = retry(policy, cancel, |attempt_index| {
            if attempt_index > 0 {
                debug!(url = %source.url, attempt = attempt_index + 1, "retrying content fetch");
            }
            self.fetch_once(source, timeout, cancel)
        })
        .await;

        attempt.finished_ms = Some(now_millis());
        match result {
            Ok(payload) => {
                if self.config.cache_enabled {
                    self.record_in_cache(source, &payload, start.elapsed());
                }
                attempt.status = AttemptStatus::Success;
                attempt.debug = AttemptDebug {
                    network_time_ms: Some(start.elapsed().as_millis() as u64),
                    cache_hit: false,
                    cors_issue: false,
                };
            }
            Err(RetryError::Cancelled) | Err(RetryError::Exhausted(FetchError::Aborted)) => {
                attempt.status = AttemptStatus::Aborted;
                attempt.error = Some("content load aborted".to_string());
            }
            Err(RetryError::Exhausted(err)) => {
                attempt.status = if err.is_timeout() {
                    AttemptStatus::Timeout
                } else {
                    AttemptStatus::Failed
                };
                attempt.debug.cors_issue = err.is_cross_origin();
                attempt.error = Some(err.to_string());
            }
        }
        attempt
    }

    async fn fetch_once(
        &self,
        source: &ContentSource,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<FetchedPayload, FetchError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Aborted),
            fetched = tokio::time::timeout(timeout, self.fetcher.fetch(&source.url)) => {
                match fetched {
                    Ok(inner) => inner,
                    Err(_) => Err(FetchError::Timeout {
                        after_ms: timeout.as_millis() as u64,
                    }),
                }
            }
        }
    }

    // Measured size when the transport produced bytes, per-format
    // estimate otherwise; MIME from the transport, else from the
    // format tag.
    fn record_in_cache(&self, source: &ContentSource, payload: &FetchedPayload, elapsed: Duration) {
        let size = Some(payload.measured_size())
            .filter(|size| *size > 0)
            .or_else(|| source.metadata.format.map(|f| f.estimated_size()));
        let mime_type = payload
            .content_type
            .clone()
            .or_else(|| source.metadata.format.map(|f| f.mime_type().to_string()));
        self.cache.set(
            &source.url,
            EntryPatch {
                size,
                mime_type,
                load_time_ms: Some(elapsed.as_millis() as u64),
            },
        );
    }

    fn install_token(&self, token: CancellationToken) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn clear_token(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
