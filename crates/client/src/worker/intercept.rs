//! Fetch Interceptor: per-request strategy selection.
//!
//! | Request                         | Strategy                                   |
//! |---------------------------------|--------------------------------------------|
//! | same origin                     | cache-first, refresh in background         |
//! | cross origin, API host          | network-first, offline document on failure |
//! | cross origin, any other host    | pass-through, untouched                    |
//!
//! Every branch resolves: network errors and cache failures become a
//! cached response, the offline document, or a bare 503.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;
use waystation_core::{Error, FetchRequest, FetchResponse, ResponseType};

use super::cache::CacheManager;
use super::dispatch::{Event, EventHandler, Outcome};
use super::tasks::BackgroundTasks;
use crate::fetch::{Network, host_matches, same_origin};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    PassThrough,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::CacheFirst => "cache-first",
            Strategy::NetworkFirst => "network-first",
            Strategy::PassThrough => "pass-through",
        }
    }
}

/// Where a resolved response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Network,
    Cache,
    /// The offline document.
    Fallback,
    /// Generated 503.
    Synthetic,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Network => "network",
            Source::Cache => "cache",
            Source::Fallback => "fallback",
            Source::Synthetic => "synthetic",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub strategy: Strategy,
    pub source: Source,
    pub response: FetchResponse,
}

/// Result of intercepting one request.
#[derive(Debug, Clone)]
pub enum Interception {
    /// Not intercepted; the caller performs the request itself.
    PassThrough(FetchRequest),
    Resolved(Resolution),
}

impl Interception {
    pub fn strategy(&self) -> Strategy {
        match self {
            Interception::PassThrough(_) => Strategy::PassThrough,
            Interception::Resolved(resolution) => resolution.strategy,
        }
    }
}

pub struct FetchInterceptor {
    cache: Arc<CacheManager>,
    network: Arc<dyn Network>,
    tasks: BackgroundTasks,
    api_host_pattern: String,
    offline_path: String,
}

impl FetchInterceptor {
    pub fn new(
        cache: Arc<CacheManager>, network: Arc<dyn Network>, tasks: BackgroundTasks, api_host_pattern: impl Into<String>,
        offline_path: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            network,
            tasks,
            api_host_pattern: api_host_pattern.into(),
            offline_path: offline_path.into(),
        }
    }

    /// Pick the strategy for an already resolved URL.
    pub fn classify(&self, url: &Url) -> Strategy {
        if same_origin(self.cache.origin(), url) {
            Strategy::CacheFirst
        } else if host_matches(url, &self.api_host_pattern) {
            Strategy::NetworkFirst
        } else {
            Strategy::PassThrough
        }
    }

    pub async fn intercept(&self, request: FetchRequest) -> Interception {
        let url = match self.cache.resolve(&request.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "unresolvable request passed through");
                return Interception::PassThrough(request);
            }
        };

        let strategy = self.classify(&url);
        if strategy == Strategy::PassThrough {
            return Interception::PassThrough(request);
        }

        let request = FetchRequest { url: url.to_string(), ..request };
        let resolution = match strategy {
            Strategy::NetworkFirst => self.network_first(request).await,
            _ => self.cache_first(request).await,
        };

        tracing::debug!(
            url = %url,
            strategy = ?resolution.strategy,
            source = ?resolution.source,
            status = resolution.response.status,
            "fetch resolved"
        );
        Interception::Resolved(resolution)
    }

    async fn network_first(&self, request: FetchRequest) -> Resolution {
        match self.network.fetch(&request).await {
            Ok(response) => Resolution { strategy: Strategy::NetworkFirst, source: Source::Network, response },
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "network-first fetch failed");
                self.offline_document(Strategy::NetworkFirst).await
            }
        }
    }

    async fn cache_first(&self, request: FetchRequest) -> Resolution {
        match self.cache.read(&request).await {
            Ok(Some(cached)) => {
                self.refresh_in_background(request).await;
                return Resolution { strategy: Strategy::CacheFirst, source: Source::Cache, response: cached };
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(url = %request.url, error = %e, "cache read failed"),
        }

        match self.network.fetch(&request).await {
            Ok(response) => {
                if response.status == 200
                    && response.response_type == ResponseType::Basic
                    && let Err(e) = self.cache.write(&request, &response).await
                {
                    tracing::warn!(url = %request.url, error = %e, "cache write failed");
                }
                Resolution { strategy: Strategy::CacheFirst, source: Source::Network, response }
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "cache-first miss and network failed");
                if request.is_navigation() {
                    self.offline_document(Strategy::CacheFirst).await
                } else {
                    Resolution {
                        strategy: Strategy::CacheFirst,
                        source: Source::Synthetic,
                        response: FetchResponse::offline(),
                    }
                }
            }
        }
    }

    /// Re-fetch `request` and overwrite its entry; the caller does not wait.
    async fn refresh_in_background(&self, request: FetchRequest) {
        let cache = Arc::clone(&self.cache);
        let network = Arc::clone(&self.network);
        self.tasks
            .spawn("refresh", async move {
                let response = network.fetch(&request).await?;
                if cache.write(&request, &response).await? {
                    tracing::debug!(url = %request.url, "refreshed cache entry");
                }
                Ok(())
            })
            .await;
    }

    /// The cached offline document, or a bare 503 if it was never cached.
    async fn offline_document(&self, strategy: Strategy) -> Resolution {
        match self.cache.read_url(&self.offline_path).await {
            Ok(Some(response)) => Resolution { strategy, source: Source::Fallback, response },
            Ok(None) => {
                tracing::warn!(path = %self.offline_path, "offline document not cached");
                Resolution { strategy, source: Source::Synthetic, response: FetchResponse::offline() }
            }
            Err(e) => {
                tracing::warn!(path = %self.offline_path, error = %e, "offline document read failed");
                Resolution { strategy, source: Source::Synthetic, response: FetchResponse::offline() }
            }
        }
    }
}

#[async_trait]
impl EventHandler for FetchInterceptor {
    async fn handle(&self, event: Event) -> Result<Outcome, Error> {
        match event {
            Event::Fetch(request) => Ok(Outcome::Fetched(self.intercept(request).await)),
            _ => Ok(Outcome::Unhandled),
        }
    }
}
