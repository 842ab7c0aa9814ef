//! Worker lifecycle states and the install / activate handlers.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use waystation_core::Error;

use super::cache::CacheManager;
use super::dispatch::{Event, EventHandler, Outcome};
use crate::fetch::Network;

/// Worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Constructed, never installed.
    #[default]
    Parsed,
    /// Populating the bucket from the manifest.
    Installing,
    /// Bucket populated, waiting to activate.
    Installed,
    /// Reaping old buckets.
    Activating,
    /// Intercepting fetches.
    Activated,
    /// Last install failed; install may be retried.
    Redundant,
}

impl WorkerState {
    /// Only an active worker intercepts fetches.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }

    pub fn can_install(&self) -> bool {
        matches!(self, WorkerState::Parsed | WorkerState::Installed | WorkerState::Redundant)
    }

    pub fn can_activate(&self) -> bool {
        matches!(self, WorkerState::Installed | WorkerState::Activated)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Populates the current bucket from the manifest.
pub struct InstallHandler {
    cache: Arc<CacheManager>,
    network: Arc<dyn Network>,
}

impl InstallHandler {
    pub fn new(cache: Arc<CacheManager>, network: Arc<dyn Network>) -> Self {
        Self { cache, network }
    }
}

#[async_trait]
impl EventHandler for InstallHandler {
    async fn handle(&self, event: Event) -> Result<Outcome, Error> {
        let Event::Install = event else {
            return Ok(Outcome::Unhandled);
        };
        let cached = self.cache.initialize(self.network.as_ref()).await?;
        Ok(Outcome::Installed { bucket: self.cache.bucket().to_string(), cached })
    }
}

/// Deletes every bucket but the current one.
pub struct ActivateHandler {
    cache: Arc<CacheManager>,
}

impl ActivateHandler {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl EventHandler for ActivateHandler {
    async fn handle(&self, event: Event) -> Result<Outcome, Error> {
        let Event::Activate = event else {
            return Ok(Outcome::Unhandled);
        };
        let deleted = self.cache.reap().await?;
        Ok(Outcome::Activated { bucket: self.cache.bucket().to_string(), deleted })
    }
}
