//! Deterministic object paths for durable storage.
//!
//! Every piece of content lands at the same path no matter which node
//! performs the transfer, which is what makes the ensure-available flow
//! idempotent: a second run finds the object already in place and skips
//! the upload.

use crate::resolver::is_valid_identifier;

/// Default path prefix for stored content.
pub const DEFAULT_PATH_PREFIX: &str = "content";

/// Default file extension when the payload format is unknown.
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Build the canonical storage path for a content identifier.
///
/// The layout is `{prefix}/{first 8 chars}/{identifier}.{extension}`.
/// The 8-char shard keeps any single listing from growing unbounded
/// while staying human-navigable.
pub fn storage_path(prefix: &str, identifier: &str, extension: &str) -> String {
    let shard = &identifier[..identifier.len().min(8)];
    format!("{}/{}/{}.{}", prefix, shard, identifier, extension)
}

/// Validate an identifier before it is used to build a storage path.
///
/// Returns `false` for anything that does not look like a content
/// identifier so callers can fail fast instead of writing garbage keys.
pub fn is_storable_identifier(identifier: &str) -> bool {
    is_valid_identifier(identifier)
}
