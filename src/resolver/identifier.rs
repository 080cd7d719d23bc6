//! Content identifier validation and gateway URL derivation.
//!
//! Identifiers name payloads on the content-addressed network. Exactly
//! five canonical encodings are accepted; anything else is rejected so
//! malformed input can never reach a gateway as a request path.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("invalid content identifier: {0}")]
    Invalid(String),
}

fn is_base58(c: char) -> bool {
    matches!(c, '1'..='9' | 'A'..='H' | 'J'..='N' | 'P'..='Z' | 'a'..='k' | 'm'..='z')
}

fn is_mixed_base32(c: char) -> bool {
    matches!(c, 'A'..='Z' | 'a'..='z' | '2'..='7')
}

fn is_upper_base32(c: char) -> bool {
    matches!(c, 'A'..='Z' | '2'..='7')
}

fn is_upper_hex(c: char) -> bool {
    matches!(c, '0'..='9' | 'A'..='F')
}

/// Checks a string against the five accepted identifier formats:
///
/// * `Qm` + 44 base58 characters (legacy v0)
/// * `z` + 48 base58 characters
/// * `b` + 58 mixed-case base32 characters
/// * `B` + 58 upper-case base32 characters
/// * `F` + 50 upper-case hex characters
///
/// Prefix, length and character set must all match; there is no fuzzy
/// acceptance of near-miss strings.
pub fn is_valid_identifier(s: &str) -> bool {
    if let Some(rest) = s.strip_prefix("Qm") {
        return rest.len() == 44 && rest.chars().all(is_base58);
    }
    match s.as_bytes().first() {
        Some(b'b') => s.len() == 59 && s[1..].chars().all(is_mixed_base32),
        Some(b'B') => s.len() == 59 && s[1..].chars().all(is_upper_base32),
        Some(b'z') => s.len() == 49 && s[1..].chars().all(is_base58),
        Some(b'F') => s.len() == 51 && s[1..].chars().all(is_upper_hex),
        _ => false,
    }
}

/// Builds the gateway fetch URL for an identifier, e.g.
/// `https://ipfs.io/ipfs/Qm...`. The gateway base may carry a trailing
/// slash; it is stripped before joining.
pub fn network_url(gateway: &str, identifier: &str) -> Result<String, IdentifierError> {
    if !is_valid_identifier(identifier) {
        return Err(IdentifierError::Invalid(identifier.to_string()));
    }
    let base = gateway.strip_suffix('/').unwrap_or(gateway);
    Ok(format!("{base}/{identifier}"))
}
