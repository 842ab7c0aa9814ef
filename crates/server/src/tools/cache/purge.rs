//! cache_purge tool implementation.
//!
//! Purges entries of the current bucket by key, URL pattern, or count, or
//! deletes a whole named bucket.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use waystation_client::CacheManager;
use waystation_core::Error;

use crate::tools::json_result;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Delete the entry with this key hash.
    #[serde(default)]
    pub hash: Option<String>,

    /// Delete entries whose URL contains this pattern.
    #[serde(default)]
    pub url_pattern: Option<String>,

    /// Keep only the N most recently used entries (LRU purge).
    #[serde(default)]
    pub max_entries: Option<usize>,

    /// Delete this bucket and all its entries.
    #[serde(default)]
    pub bucket: Option<String>,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of entries deleted from the current bucket.
    pub deleted: u64,

    /// Whether the named bucket was deleted.
    pub bucket_deleted: bool,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(cache: &CacheManager, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    if params.hash.is_none() && params.url_pattern.is_none() && params.max_entries.is_none() && params.bucket.is_none()
    {
        return Err(Error::InvalidInput(
            "At least one of hash, url_pattern, max_entries, or bucket must be specified".to_string(),
        )
        .into());
    }

    let db = cache.db();
    let mut deleted_total = 0u64;

    if let Some(hash) = params.hash
        && db.delete_entry(cache.bucket(), &hash).await?
    {
        deleted_total += 1;
    }

    if let Some(pattern) = params.url_pattern {
        if pattern.is_empty() {
            return Err(Error::InvalidInput("url_pattern cannot be empty".into()).into());
        }
        deleted_total += db.purge_entries_by_url(cache.bucket(), &pattern).await?;
    }

    if let Some(max_entries) = params.max_entries {
        deleted_total += db.purge_lru_entries(cache.bucket(), max_entries).await?;
    }

    let mut bucket_deleted = false;
    if let Some(bucket) = params.bucket {
        if bucket == cache.bucket() {
            tracing::warn!(%bucket, "deleting the current bucket");
        }
        bucket_deleted = db.delete_bucket(&bucket).await?;
    }

    json_result(&CachePurgeOutput { deleted: deleted_total, bucket_deleted })
}
