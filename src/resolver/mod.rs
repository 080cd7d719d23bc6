//! Source resolution.
//!
//! Everything needed to go from "here is what we know about a piece of
//! content" to "here is the ordered list of URLs worth trying", with
//! identifier validation underneath. Pure logic, no I/O.

pub mod identifier;
pub mod sources;

pub use identifier::{is_valid_identifier, network_url, IdentifierError};
pub use sources::{
    filter_sources, infer_format, infer_provider, is_http_url, resolve_sources, validate_sources,
    ContentSource, MediaFormat, NetworkCondition, ResolutionConfig, SizeClass, SourceInput,
    SourceKind, SourceMetadata, SourceValidation, StorageProvider, DEFAULT_GATEWAY,
};
