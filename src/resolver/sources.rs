//! Pure source resolution.
//!
//! Turns a loose description of where a piece of content might live
//! (durable store URL, thumbnail, content identifier, legacy and
//! external URLs) into an ordered, bounded list of fetchable
//! candidates. No I/O happens here; every function is deterministic
//! and total. Invalid entries are silently dropped rather than
//! reported, so callers can hand over whatever partial records they
//! hold.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::resolver::identifier::{is_valid_identifier, network_url};

/// Role a candidate plays in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Primary,
    Thumbnail,
    Fallback,
    Placeholder,
}

impl SourceKind {
    /// Per-kind attempt timeout. Thumbnails are expected to be small
    /// and fast; fallbacks get the most patience.
    pub fn default_timeout(&self) -> Duration {
        match self {
            SourceKind::Thumbnail => Duration::from_millis(3000),
            SourceKind::Primary => Duration::from_millis(5000),
            SourceKind::Fallback => Duration::from_millis(8000),
            SourceKind::Placeholder => Duration::from_millis(1000),
        }
    }
}

/// Where a URL appears to be served from, inferred from the URL text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageProvider {
    ObjectStore,
    ContentNetwork,
    Cdn,
    #[default]
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    Thumbnail,
    Medium,
    Large,
    Original,
}

/// Media format inferred from a URL path extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Jpg,
    Png,
    Gif,
    Webp,
    Svg,
}

impl MediaFormat {
    /// Parses a lowercase extension; `jpeg` normalizes to `jpg`.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "jpg" | "jpeg" => Some(MediaFormat::Jpg),
            "png" => Some(MediaFormat::Png),
            "gif" => Some(MediaFormat::Gif),
            "webp" => Some(MediaFormat::Webp),
            "svg" => Some(MediaFormat::Svg),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            MediaFormat::Jpg => "jpg",
            MediaFormat::Png => "png",
            MediaFormat::Gif => "gif",
            MediaFormat::Webp => "webp",
            MediaFormat::Svg => "svg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            MediaFormat::Jpg => "image/jpeg",
            MediaFormat::Png => "image/png",
            MediaFormat::Gif => "image/gif",
            MediaFormat::Webp => "image/webp",
            MediaFormat::Svg => "image/svg+xml",
        }
    }

    /// Rough per-format byte estimate, used for cache accounting when a
    /// fetch reports no measured size.
    pub fn estimated_size(&self) -> u64 {
        match self {
            MediaFormat::Jpg => 100_000,
            MediaFormat::Png => 200_000,
            MediaFormat::Gif => 150_000,
            MediaFormat::Webp => 80_000,
            MediaFormat::Svg => 10_000,
        }
    }
}

/// Descriptive tags attached to a resolved source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub provider: StorageProvider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_class: Option<SizeClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<MediaFormat>,
}

/// One fetchable candidate. Immutable once resolved; lower priority
/// loads first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSource {
    pub url: String,
    pub kind: SourceKind,
    pub priority: u32,
    pub timeout_ms: u64,
    pub metadata: SourceMetadata,
}

impl ContentSource {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Loose description of where content might live. Every field is
/// optional; unknown or malformed fields are ignored during
/// resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInput {
    /// URL of the durable-store rendering, when one is known.
    pub store_url: Option<String>,
    pub thumbnail_url: Option<String>,
    /// Content-network identifier (see [`is_valid_identifier`]).
    pub identifier: Option<String>,
    /// Legacy processed rendering, tried after the primary.
    pub processed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_urls: Vec<String>,
    #[serde(default)]
    pub prefer_thumbnail: bool,
}

/// Default public gateway for deriving content-network URLs.
pub const DEFAULT_GATEWAY: &str = "https://ipfs.io/ipfs";

/// Tuning for [`resolve_sources`].
#[derive(Debug, Clone)]
pub struct ResolutionConfig {
    /// Resolved list is truncated to this many candidates.
    pub max_sources: usize,
    /// Timeout applied when a kind carries no default of its own.
    pub default_timeout: Duration,
    /// Whether to append a content-network candidate at all.
    pub include_network: bool,
    /// Gateway base used to derive the content-network URL.
    pub gateway: String,
    /// Prefer small renderings up front.
    pub mobile_optimized: bool,
    /// Exact-URL priority overrides; these beat every default.
    pub priority_overrides: HashMap<String, u32>,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            max_sources: 5,
            default_timeout: Duration::from_millis(8000),
            include_network: true,
            gateway: DEFAULT_GATEWAY.to_string(),
            mobile_optimized: false,
            priority_overrides: HashMap::new(),
        }
    }
}

impl ResolutionConfig {
    /// Preset for constrained mobile clients: fewer candidates,
    /// tighter budget, thumbnails first.
    pub fn mobile() -> Self {
        Self {
            max_sources: 3,
            default_timeout: Duration::from_millis(5000),
            mobile_optimized: true,
            ..Self::default()
        }
    }

    /// Preset for visibly degraded networks: no content-network hop at
    /// all, two candidates, short budget.
    pub fn slow_network() -> Self {
        Self {
            max_sources: 2,
            default_timeout: Duration::from_millis(3000),
            include_network: false,
            mobile_optimized: true,
            ..Self::default()
        }
    }

    /// Preset for healthy networks; identical to the defaults.
    pub fn fast_network() -> Self {
        Self::default()
    }
}

/// True when the string parses as an absolute http(s) URL.
pub fn is_http_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Best-effort provider classification by URL text. Checked in order;
/// network fragments win over CDN fragments so gateway-hosted content
/// classifies as network even on CDN-fronted gateways.
pub fn infer_provider(url: &str) -> StorageProvider {
    if url.contains("/object/") || url.contains("storage") {
        StorageProvider::ObjectStore
    } else if url.contains("ipfs") || url.contains("dweb") {
        StorageProvider::ContentNetwork
    } else if url.contains("cloudflare") || url.contains("cdn") {
        StorageProvider::Cdn
    } else {
        StorageProvider::External
    }
}

/// Format from the URL path's extension, ignoring query and fragment.
pub fn infer_format(url: &str) -> Option<MediaFormat> {
    let parsed = Url::parse(url).ok()?;
    let path = parsed.path().to_ascii_lowercase();
    MediaFormat::from_extension(path.rsplit('.').next().unwrap_or(""))
}

fn add_source(
    out: &mut Vec<ContentSource>,
    config: &ResolutionConfig,
    url: &str,
    kind: SourceKind,
    base_priority: u32,
    size_class: SizeClass,
) {
    if !is_http_url(url) {
        debug!(url, "skipping invalid source url");
        return;
    }
    let priority = config
        .priority_overrides
        .get(url)
        .copied()
        .unwrap_or(base_priority);
    out.push(ContentSource {
        url: url.to_string(),
        kind,
        priority,
        timeout_ms: kind.default_timeout().as_millis() as u64,
        metadata: SourceMetadata {
            provider: infer_provider(url),
            size_class: Some(size_class),
            format: infer_format(url),
        },
    });
}

/// Resolves an input description into an ordered candidate list.
///
/// Construction order (before sorting):
/// 1. thumbnail at priority 1 when preferred or mobile-optimized
/// 2. durable-store URL at priority 1 (2 when the thumbnail leads)
/// 3. thumbnail at priority 2 when not already added
/// 4. legacy processed URL at priority 3, skipped when it duplicates
///    the store URL
/// 5. external URLs at priority `4 + index`
/// 6. content-network URL at priority 10, always last in line
///
/// The result is stably sorted by ascending priority and truncated to
/// `config.max_sources`. Never fails; unusable entries are dropped.
pub fn resolve_sources(input: &SourceInput, config: &ResolutionConfig) -> Vec<ContentSource> {
    let mut sources = Vec::new();

    let thumbnail_first = input.prefer_thumbnail || config.mobile_optimized;
    if thumbnail_first {
        if let Some(thumb) = &input.thumbnail_url {
            add_source(
                &mut sources,
                config,
                thumb,
                SourceKind::Thumbnail,
                1,
                SizeClass::Thumbnail,
            );
        }
    }

    if let Some(store) = &input.store_url {
        let priority = if input.prefer_thumbnail { 2 } else { 1 };
        add_source(
            &mut sources,
            config,
            store,
            SourceKind::Primary,
            priority,
            SizeClass::Large,
        );
    }

    if !thumbnail_first {
        if let Some(thumb) = &input.thumbnail_url {
            add_source(
                &mut sources,
                config,
                thumb,
                SourceKind::Thumbnail,
                2,
                SizeClass::Thumbnail,
            );
        }
    }

    if let Some(processed) = &input.processed_url {
        if input.store_url.as_deref() != Some(processed.as_str()) {
            add_source(
                &mut sources,
                config,
                processed,
                SourceKind::Fallback,
                3,
                SizeClass::Medium,
            );
        }
    }

    for (index, external) in input.external_urls.iter().enumerate() {
        add_source(
            &mut sources,
            config,
            external,
            SourceKind::Fallback,
            4 + index as u32,
            SizeClass::Original,
        );
    }

    if config.include_network {
        if let Some(id) = &input.identifier {
            if is_valid_identifier(id) {
                match network_url(&config.gateway, id) {
                    Ok(gateway_url) => add_source(
                        &mut sources,
                        config,
                        &gateway_url,
                        SourceKind::Fallback,
                        10,
                        SizeClass::Original,
                    ),
                    Err(err) => debug!(%err, "skipping content-network source"),
                }
            }
        }
    }

    sources.sort_by_key(|s| s.priority);
    sources.truncate(config.max_sources);
    debug!(
        count = sources.len(),
        max = config.max_sources,
        "resolved content sources"
    );
    sources
}

/// Client-observed network condition used to thin a candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkCondition {
    SlowNetwork,
    FastNetwork,
    PreferThumbnails,
    AvoidNetwork,
}

/// Filters resolved sources for a network condition. Pure; relative
/// order is preserved.
pub fn filter_sources(
    sources: Vec<ContentSource>,
    condition: NetworkCondition,
) -> Vec<ContentSource> {
    match condition {
        NetworkCondition::SlowNetwork => sources
            .into_iter()
            .filter(|s| {
                s.kind == SourceKind::Thumbnail
                    || (s.metadata.provider == StorageProvider::ObjectStore
                        && s.metadata.size_class != Some(SizeClass::Original))
            })
            .collect(),
        NetworkCondition::FastNetwork => sources,
        NetworkCondition::PreferThumbnails => sources
            .into_iter()
            .filter(|s| matches!(s.kind, SourceKind::Thumbnail | SourceKind::Primary))
            .collect(),
        NetworkCondition::AvoidNetwork => sources
            .into_iter()
            .filter(|s| s.metadata.provider != StorageProvider::ContentNetwork)
            .collect(),
    }
}

/// Sanity report over an already-resolved source list.
#[derive(Debug, Clone, Serialize)]
pub struct SourceValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Checks a source list for host-side mistakes: emptiness, broken
/// URLs, zero timeouts, duplicate priorities.
pub fn validate_sources(sources: &[ContentSource]) -> SourceValidation {
    let mut errors = Vec::new();

    if sources.is_empty() {
        errors.push("no content sources provided".to_string());
    }

    for (index, source) in sources.iter().enumerate() {
        if !is_http_url(&source.url) {
            errors.push(format!("invalid url at index {index}: {}", source.url));
        }
        if source.timeout_ms == 0 {
            errors.push(format!("invalid timeout at index {index}: 0"));
        }
    }

    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for source in sources {
        if !seen.insert(source.priority) {
            duplicates.push(source.priority.to_string());
        }
    }
    if !duplicates.is_empty() {
        errors.push(format!("duplicate priorities: {}", duplicates.join(", ")));
    }

    SourceValidation {
        valid: errors.is_empty(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

    fn full_input() -> SourceInput {
        SourceInput {
            store_url: Some("https://files.example-storage.net/object/public/content/a.jpg".into()),
            thumbnail_url: Some("https://files.example-storage.net/object/public/content/a-thumb.jpg".into()),
            identifier: Some(ID.into()),
            ..Default::default()
        }
    }

    #[test]
    fn empty_input_resolves_empty() {
        let sources = resolve_sources(&SourceInput::default(), &ResolutionConfig::default());
        assert!(sources.is_empty());
    }

    #[test]
    fn invalid_fields_are_dropped_silently() {
        let input = SourceInput {
            store_url: Some("not a url".into()),
            identifier: Some("not-an-identifier".into()),
            external_urls: vec!["ftp://example.com/x.jpg".into()],
            ..Default::default()
        };
        let sources = resolve_sources(&input, &ResolutionConfig::default());
        assert!(sources.is_empty());
    }

    #[test]
    fn default_order_is_store_thumbnail_network() {
        let sources = resolve_sources(&full_input(), &ResolutionConfig::default());
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].kind, SourceKind::Primary);
        assert_eq!(sources[0].priority, 1);
        assert_eq!(sources[1].kind, SourceKind::Thumbnail);
        assert_eq!(sources[1].priority, 2);
        assert_eq!(sources[2].kind, SourceKind::Fallback);
        assert_eq!(sources[2].priority, 10);
        assert!(sources[2].url.ends_with(ID));
    }

    #[test]
    fn per_kind_timeouts_apply() {
        let sources = resolve_sources(&full_input(), &ResolutionConfig::default());
        assert_eq!(sources[0].timeout_ms, 5000);
        assert_eq!(sources[1].timeout_ms, 3000);
        assert_eq!(sources[2].timeout_ms, 8000);
    }

    #[test]
    fn prefer_thumbnail_leads_with_thumbnail() {
        let mut input = full_input();
        input.prefer_thumbnail = true;
        let sources = resolve_sources(&input, &ResolutionConfig::default());
        assert_eq!(sources[0].kind, SourceKind::Thumbnail);
        assert_eq!(sources[0].priority, 1);
        assert_eq!(sources[1].kind, SourceKind::Primary);
        assert_eq!(sources[1].priority, 2);
    }

    #[test]
    fn mobile_optimization_also_leads_with_thumbnail() {
        let sources = resolve_sources(&full_input(), &ResolutionConfig::mobile());
        assert_eq!(sources[0].kind, SourceKind::Thumbnail);
        // store keeps priority 1 here (only prefer_thumbnail demotes it),
        // but the thumbnail was added first so the stable sort keeps it in front
        assert_eq!(sources[1].kind, SourceKind::Primary);
    }

    #[test]
    fn processed_url_skipped_when_same_as_store() {
        let mut input = full_input();
        input.processed_url = input.store_url.clone();
        let sources = resolve_sources(&input, &ResolutionConfig::default());
        assert!(sources.iter().all(|s| s.priority != 3));
    }

    #[test]
    fn external_urls_keep_listed_order() {
        let input = SourceInput {
            external_urls: vec![
                "https://a.example.com/1.png".into(),
                "https://b.example.com/2.png".into(),
            ],
            ..Default::default()
        };
        let sources = resolve_sources(&input, &ResolutionConfig::default());
        assert_eq!(sources[0].priority, 4);
        assert_eq!(sources[1].priority, 5);
        assert!(sources[0].url.contains("a.example.com"));
    }

    #[test]
    fn priority_override_beats_default() {
        let mut config = ResolutionConfig::default();
        let url = "https://a.example.com/1.png".to_string();
        config.priority_overrides.insert(url.clone(), 0);
        let input = SourceInput {
            store_url: Some("https://files.example-storage.net/object/public/c/a.jpg".into()),
            external_urls: vec![url.clone()],
            ..Default::default()
        };
        let sources = resolve_sources(&input, &config);
        assert_eq!(sources[0].url, url);
        assert_eq!(sources[0].priority, 0);
    }

    #[test]
    fn truncates_to_max_sources() {
        let input = SourceInput {
            external_urls: (0..8)
                .map(|i| format!("https://cdn{i}.example.com/x.png"))
                .collect(),
            ..Default::default()
        };
        let sources = resolve_sources(&input, &ResolutionConfig::default());
        assert_eq!(sources.len(), 5);
    }

    #[test]
    fn network_source_omitted_when_disabled() {
        let sources = resolve_sources(&full_input(), &ResolutionConfig::slow_network());
        assert!(sources
            .iter()
            .all(|s| s.metadata.provider != StorageProvider::ContentNetwork));
    }

    #[test]
    fn provider_inference() {
        assert_eq!(
            infer_provider("https://files.x.net/object/public/c/a.jpg"),
            StorageProvider::ObjectStore
        );
        assert_eq!(
            infer_provider("https://ipfs.io/ipfs/Qm"),
            StorageProvider::ContentNetwork
        );
        // network fragment wins over the cdn fragment
        assert_eq!(
            infer_provider("https://cloudflare-ipfs.com/ipfs/Qm"),
            StorageProvider::ContentNetwork
        );
        assert_eq!(
            infer_provider("https://cdn.example.com/a.jpg"),
            StorageProvider::Cdn
        );
        assert_eq!(
            infer_provider("https://example.com/a.jpg"),
            StorageProvider::External
        );
    }

    #[test]
    fn format_inference_normalizes_jpeg() {
        assert_eq!(
            infer_format("https://example.com/photo.JPEG"),
            Some(MediaFormat::Jpg)
        );
        assert_eq!(
            infer_format("https://example.com/photo.webp?w=200"),
            Some(MediaFormat::Webp)
        );
        assert_eq!(infer_format("https://example.com/photo"), None);
    }

    #[test]
    fn filter_for_slow_network_keeps_thumbnails_and_store() {
        let sources = resolve_sources(&full_input(), &ResolutionConfig::default());
        let filtered = filter_sources(sources, NetworkCondition::SlowNetwork);
        assert!(!filtered.is_empty());
        assert!(filtered.iter().all(|s| {
            s.kind == SourceKind::Thumbnail || s.metadata.provider == StorageProvider::ObjectStore
        }));
    }

    #[test]
    fn filter_avoid_network_drops_gateway_sources() {
        let sources = resolve_sources(&full_input(), &ResolutionConfig::default());
        let filtered = filter_sources(sources, NetworkCondition::AvoidNetwork);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn validation_reports_duplicates_and_empty() {
        let empty = validate_sources(&[]);
        assert!(!empty.valid);

        let sources = resolve_sources(&full_input(), &ResolutionConfig::default());
        assert!(validate_sources(&sources).valid);

        let mut dup = resolve_sources(&full_input(), &ResolutionConfig::default());
        let p = dup[0].priority;
        dup[1].priority = p;
        let report = validate_sources(&dup);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("duplicate")));
    }
}
