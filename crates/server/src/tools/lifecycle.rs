//! worker_install, worker_activate and worker_status tools.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use waystation_client::{Event, Outcome, Worker};
use waystation_core::cache::BucketInfo;

use super::json_result;

/// Output of worker_install and worker_activate.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LifecycleOutput {
    /// Worker state after the call.
    pub state: String,
    /// Current bucket name.
    pub bucket: String,
    /// Manifest entries stored by the install, if one ran.
    pub cached: Option<usize>,
    /// Old buckets deleted by the activation, if one ran.
    pub deleted: Vec<String>,
}

/// Output of worker_status.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatusOutput {
    pub state: String,
    pub bucket: String,
    pub origin: String,
    pub manifest: Vec<String>,
    /// Every bucket in the store, current one included.
    pub buckets: Vec<BucketInfo>,
    /// URLs stored in the current bucket.
    pub cached_urls: Vec<String>,
    /// Background refreshes not yet reaped.
    pub pending_tasks: usize,
}

fn absorb(output: &mut LifecycleOutput, outcome: Outcome) {
    match outcome {
        Outcome::Installed { cached, .. } => output.cached = Some(cached),
        Outcome::Activated { deleted, .. } => output.deleted = deleted,
        _ => {}
    }
}

/// Install, then activate when the worker skips waiting.
pub async fn install_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    let mut output = LifecycleOutput {
        state: String::new(),
        bucket: worker.cache().bucket().to_string(),
        cached: None,
        deleted: Vec::new(),
    };

    absorb(&mut output, worker.dispatch(Event::Install).await?);
    if worker.skip_waiting() {
        absorb(&mut output, worker.dispatch(Event::Activate).await?);
    }

    output.state = worker.state().await.to_string();
    json_result(&output)
}

pub async fn activate_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    let mut output = LifecycleOutput {
        state: String::new(),
        bucket: worker.cache().bucket().to_string(),
        cached: None,
        deleted: Vec::new(),
    };

    absorb(&mut output, worker.dispatch(Event::Activate).await?);

    output.state = worker.state().await.to_string();
    json_result(&output)
}

pub async fn status_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    let cache = worker.cache();
    let output = StatusOutput {
        state: worker.state().await.to_string(),
        bucket: cache.bucket().to_string(),
        origin: cache.origin().to_string(),
        manifest: cache.manifest().to_vec(),
        buckets: cache.db().list_buckets().await?,
        cached_urls: cache.db().entry_urls(cache.bucket()).await?,
        pending_tasks: worker.tasks().pending().await,
    };
    json_result(&output)
}
