//! worker_push, worker_notification_click and worker_sync tools.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use waystation_client::{Event, NotificationClick, Outcome, PushMessage, Worker};
use waystation_core::Error;

use super::json_result;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PushParams {
    /// Push payload text; empty or absent uses the default body.
    #[serde(default)]
    pub payload: Option<String>,
}

/// The notification the host should display.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PushOutput {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    /// Opened when the notification is clicked.
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NotificationClickParams {
    /// URL carried by the clicked notification.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NotificationClickOutput {
    /// Window the host should open.
    pub open_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncParams {
    /// Background sync tag, e.g. "sync-leads".
    pub tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncOutput {
    pub tag: String,
    /// Whether the tag is one the worker acts on.
    pub recognized: bool,
}

fn unexpected(tool: &str, outcome: &Outcome) -> McpError {
    Error::InvalidState(format!("{tool}: unexpected outcome {outcome:?}")).into()
}

pub async fn push_impl(worker: &Worker, params: PushParams) -> Result<CallToolResult, McpError> {
    let outcome = worker.dispatch(Event::Push(PushMessage { payload: params.payload })).await?;
    let notification = match outcome {
        Outcome::Notify(notification) => notification,
        other => return Err(unexpected("worker_push", &other)),
    };

    json_result(&PushOutput {
        title: notification.title,
        body: notification.body,
        icon: notification.icon,
        badge: notification.badge,
        vibrate: notification.vibrate,
        url: notification.url,
    })
}

pub async fn click_impl(worker: &Worker, params: NotificationClickParams) -> Result<CallToolResult, McpError> {
    let outcome = worker
        .dispatch(Event::NotificationClick(NotificationClick { url: params.url }))
        .await?;
    let url = match outcome {
        Outcome::OpenWindow { url } => url,
        other => return Err(unexpected("worker_notification_click", &other)),
    };

    json_result(&NotificationClickOutput { open_url: url })
}

pub async fn sync_impl(worker: &Worker, params: SyncParams) -> Result<CallToolResult, McpError> {
    if params.tag.trim().is_empty() {
        return Err(Error::InvalidInput("tag cannot be empty".into()).into());
    }

    let outcome = worker.dispatch(Event::Sync(params.tag)).await?;
    match outcome {
        Outcome::Synced { tag, recognized } => json_result(&SyncOutput { tag, recognized }),
        other => Err(unexpected("worker_sync", &other)),
    }
}
