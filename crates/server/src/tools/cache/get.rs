//! cache_get tool implementation.
//!
//! Retrieves an entry of the current bucket by URL or by key hash. Lookups
//! here do not count as hits, so inspecting the cache leaves the LRU order
//! as it was.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use waystation_client::CacheManager;
use waystation_core::cache::hash::is_valid_key;
use waystation_core::{CachedEntry, Error};

use crate::tools::json_result;

/// Parameters for the cache_get tool. Exactly one of `url` and `hash`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// URL of the entry, absolute or relative to the app origin.
    #[serde(default)]
    pub url: Option<String>,

    /// Key hash of the entry (64 hex characters).
    #[serde(default)]
    pub hash: Option<String>,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub bucket: String,
    pub hash: String,
    pub method: String,
    pub url: String,
    pub stored_at: String,
    pub hit_count: i64,
    pub last_hit_at: Option<String>,
    pub status: u16,
    pub status_text: String,
    pub response_type: String,
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8, lossily.
    pub body: String,
}

impl CacheGetOutput {
    fn new(bucket: &str, entry: CachedEntry) -> Self {
        let body = entry.response.body_text();
        Self {
            bucket: bucket.to_string(),
            hash: entry.key_hash,
            method: entry.method.to_string(),
            url: entry.url,
            stored_at: entry.stored_at,
            hit_count: entry.hit_count,
            last_hit_at: entry.last_hit_at,
            status: entry.response.status,
            status_text: entry.response.status_text,
            response_type: entry.response.response_type.to_string(),
            headers: entry.response.headers,
            body,
        }
    }
}

/// Implementation of the cache_get tool.
pub async fn get_impl(cache: &CacheManager, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let entry = match (params.url, params.hash) {
        (Some(url), None) => cache.peek(&url).await?.ok_or(Error::CacheMiss(url))?,
        (None, Some(hash)) => {
            if !is_valid_key(&hash) {
                return Err(Error::InvalidInput(format!("not a key hash: {hash}")).into());
            }
            cache
                .db()
                .peek_entry(cache.bucket(), &hash)
                .await?
                .ok_or(Error::CacheMiss(hash))?
        }
        _ => return Err(Error::InvalidInput("Exactly one of url or hash must be specified".into()).into()),
    };

    json_result(&CacheGetOutput::new(cache.bucket(), entry))
}
