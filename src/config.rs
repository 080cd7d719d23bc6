//! Storage-side configuration.
//!
//! Hosts hand these structs to [`StorageOrchestrator`] and the client
//! adapters at construction; they are read-only afterwards. Every knob
//! has a sane default and an environment override, and `validate`
//! reports problems as a structured result instead of failing
//! construction, so hosts can decide what is fatal.
//!
//! [`StorageOrchestrator`]: crate::storage::StorageOrchestrator

use std::env;
use std::time::Duration;

use serde::Serialize;

use crate::resolver::{is_http_url, DEFAULT_GATEWAY};
use crate::storage::path::{DEFAULT_EXTENSION, DEFAULT_PATH_PREFIX};

// ============================================================================
// Durable object store
// ============================================================================

/// Connection settings for the durable object store.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// Base URL of the store's HTTP surface.
    pub endpoint: String,
    /// Bearer token sent with authenticated requests.
    pub api_key: String,
    /// Bucket objects are written into.
    pub bucket: String,
    /// First path segment of every stored object.
    pub path_prefix: String,
    /// Extension used when the payload format cannot be determined.
    pub default_extension: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            bucket: "content".to_string(),
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
            default_extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

// ============================================================================
// Content network
// ============================================================================

/// Gateway settings for the content-addressed network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Gateway tried first.
    pub gateway: String,
    /// Tried in order after the primary fails.
    pub fallback_gateways: Vec<String>,
    /// Budget for one fetch across one gateway.
    pub timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            gateway: DEFAULT_GATEWAY.to_string(),
            fallback_gateways: vec![
                "https://cloudflare-ipfs.com/ipfs".to_string(),
                "https://gateway.ipfs.io/ipfs".to_string(),
            ],
            timeout: Duration::from_secs(10),
        }
    }
}

impl NetworkConfig {
    /// Primary plus fallbacks, in the order they should be tried.
    pub fn gateway_order(&self) -> Vec<String> {
        let mut gateways = Vec::with_capacity(1 + self.fallback_gateways.len());
        gateways.push(self.gateway.clone());
        gateways.extend(self.fallback_gateways.iter().cloned());
        gateways
    }
}

// ============================================================================
// Upload policy
// ============================================================================

/// Limits applied to payloads before they reach the store.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    /// Largest payload accepted for upload, in bytes.
    pub max_file_size: u64,
    /// Extensions the host accepts from upload forms.
    pub allowed_formats: Vec<String>,
    pub generate_thumbnails: bool,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            allowed_formats: ["jpg", "jpeg", "png", "gif", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            generate_thumbnails: true,
            thumbnail_width: 400,
            thumbnail_height: 400,
        }
    }
}

// ============================================================================
// Aggregate
// ============================================================================

/// Everything the storage side needs, bundled.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub store: ObjectStoreConfig,
    pub network: NetworkConfig,
    pub upload: UploadPolicy,
}

impl StorageConfig {
    /// Builds a config from endpoint and key plus defaults everywhere
    /// else.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            store: ObjectStoreConfig {
                endpoint: endpoint.into(),
                api_key: api_key.into(),
                ..ObjectStoreConfig::default()
            },
            ..Self::default()
        }
    }

    /// Reads overrides from `HAVEN_STORE_*`, `HAVEN_NETWORK_*` and
    /// `HAVEN_UPLOAD_*` variables, falling back to the defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            store: ObjectStoreConfig {
                endpoint: env::var("HAVEN_STORE_ENDPOINT").unwrap_or(defaults.store.endpoint),
                api_key: env::var("HAVEN_STORE_API_KEY").unwrap_or(defaults.store.api_key),
                bucket: env::var("HAVEN_STORE_BUCKET").unwrap_or(defaults.store.bucket),
                path_prefix: env::var("HAVEN_STORE_PATH_PREFIX")
                    .unwrap_or(defaults.store.path_prefix),
                default_extension: defaults.store.default_extension,
            },
            network: NetworkConfig {
                gateway: env::var("HAVEN_NETWORK_GATEWAY").unwrap_or(defaults.network.gateway),
                fallback_gateways: env::var("HAVEN_NETWORK_FALLBACK_GATEWAYS")
                    .map(|v| {
                        v.split(',')
                            .map(|g| g.trim().to_string())
                            .filter(|g| !g.is_empty())
                            .collect()
                    })
                    .unwrap_or(defaults.network.fallback_gateways),
                timeout: env::var("HAVEN_NETWORK_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.network.timeout),
            },
            upload: UploadPolicy {
                max_file_size: env::var("HAVEN_UPLOAD_MAX_BYTES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.upload.max_file_size),
                ..defaults.upload
            },
        }
    }

    /// Checks the config for problems a transfer would hit. Errors
    /// make `valid` false; warnings are advisory.
    pub fn validate(&self) -> ConfigValidation {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if !is_http_url(&self.store.endpoint) {
            errors.push("valid object store endpoint URL is required".to_string());
        }
        if self.store.api_key.len() < 10 {
            errors.push("valid object store API key is required".to_string());
        }
        if self.store.bucket.is_empty() {
            warnings.push(format!(
                "no bucket name specified, using default: {}",
                ObjectStoreConfig::default().bucket
            ));
        }

        if !is_http_url(&self.network.gateway) {
            errors.push("valid content network gateway URL is required".to_string());
        }

        if self.upload.max_file_size == 0 {
            errors.push("upload max file size must be positive".to_string());
        }
        if self.upload.thumbnail_width == 0 {
            errors.push("thumbnail width must be positive".to_string());
        }
        if self.upload.thumbnail_height == 0 {
            errors.push("thumbnail height must be positive".to_string());
        }

        ConfigValidation {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// Outcome of [`StorageConfig::validate`].
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}
