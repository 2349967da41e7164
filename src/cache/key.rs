//! Cache key derivation.
//!
//! Output cache keys are built from three parts joined by a single space,
//! which never appears in a parsed URL:
//!
//! ```text
//! <canonical forward url> <sha256(transforms) | "none"> <"webp" | "original">
//! ```
//!
//! The transform digest covers the flattened list of operation descriptors,
//! so `[a, [b, c]]` and `[[a, b], c]` hash identically.

use sha2::{Digest, Sha256};
use url::Url;

use crate::transform::{flatten, OperationDescriptor, TransformEntry};

/// Separator between key components.
pub const KEY_DELIMITER: char = ' ';

/// Digest placeholder when no transforms apply.
pub const NO_TRANSFORMS: &str = "none";

/// Derive the output cache key for a request.
///
/// Pure function of its arguments: no headers, clock or cache state.
pub fn derive_cache_key(forward_url: &Url, transforms: &[TransformEntry], webp: bool) -> String {
    let digest = transforms_digest(transforms);
    let format = if webp { "webp" } else { "original" };

    let mut key = canonical_url(forward_url);
    key.push(KEY_DELIMITER);
    key.push_str(digest.as_deref().unwrap_or(NO_TRANSFORMS));
    key.push(KEY_DELIMITER);
    key.push_str(format);
    key
}

/// SHA-256 hex digest of the flattened transform list, or `None` if empty.
pub fn transforms_digest(transforms: &[TransformEntry]) -> Option<String> {
    let descriptors: Vec<OperationDescriptor> = flatten(transforms)
        .into_iter()
        .map(|spec| spec.describe())
        .collect();

    if descriptors.is_empty() {
        return None;
    }

    // Serializing a Vec of plain structs and JSON values cannot fail
    let serialized = serde_json::to_vec(&descriptors).unwrap_or_default();
    Some(hex::encode(Sha256::digest(&serialized)))
}

/// Absolute URL without fragment.
pub fn canonical_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

/// Invalidation tag for a source image: the canonical URL without query string.
pub fn canonical_tag(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.set_query(None);
    url.into()
}
