//! Request identity keys for cached responses.

use sha2::{Digest, Sha256};

/// Compute the cache key for a request.
///
/// The key covers the method and the URL exactly as given; callers are
/// expected to pass a canonical absolute URL.
pub fn compute_cache_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether `key` has the shape produced by [`compute_cache_key`].
pub fn is_valid_key(key: &str) -> bool {
    key.len() == 64 && key.chars().all(|c| c.is_ascii_hexdigit())
}
