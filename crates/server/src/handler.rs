//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.

use std::sync::Arc;

use crate::tools::api_call::{ApiCallParams, api_call_impl};
use crate::tools::cache::{CacheGetParams, CachePurgeParams, get_impl, purge_impl};
use crate::tools::events::{NotificationClickParams, PushParams, SyncParams, click_impl, push_impl, sync_impl};
use crate::tools::fetch::{WorkerFetchParams, fetch_impl};
use crate::tools::lifecycle::{activate_impl, install_impl, status_impl};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use waystation_client::{ScriptApi, Worker};
use waystation_core::{AppConfig, Error};

/// The main MCP server handler for waystation.
#[derive(Clone)]
pub struct WaystationServer {
    tool_router: ToolRouter<Self>,
    worker: Arc<Worker>,
    api: Option<Arc<ScriptApi>>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl WaystationServer {
    /// Create a new server handler around `worker`.
    ///
    /// API calls are routed through the worker when `api_url` is configured.
    pub fn new(config: &AppConfig, worker: Arc<Worker>) -> Result<Self, Error> {
        let api = match config.api_url.as_deref() {
            Some(endpoint) => Some(Arc::new(ScriptApi::new(endpoint, worker.clone())?)),
            None => None,
        };
        Ok(Self { tool_router: Self::tool_router(), worker, api })
    }

    #[tool(description = "Install the worker: fetch and store every static asset. Activates right away when skip_waiting is set.")]
    async fn worker_install(&self) -> Result<CallToolResult, McpError> {
        install_impl(&self.worker).await
    }

    #[tool(description = "Activate an installed worker, deleting every cache bucket but the current one.")]
    async fn worker_activate(&self) -> Result<CallToolResult, McpError> {
        activate_impl(&self.worker).await
    }

    #[tool(description = "Report the worker state, current bucket, stored buckets and cached URLs.")]
    async fn worker_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.worker).await
    }

    /// Send a request through the worker.
    ///
    /// Same-origin requests are cache-first, API requests network-first, and
    /// anything else is fetched directly.
    #[tool(description = "Fetch a URL through the worker. Reports which strategy and source answered the request.")]
    async fn worker_fetch(&self, params: Parameters<WorkerFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.worker, params.0).await
    }

    #[tool(description = "Deliver a push message. Returns the notification to display.")]
    async fn worker_push(&self, params: Parameters<PushParams>) -> Result<CallToolResult, McpError> {
        push_impl(&self.worker, params.0).await
    }

    #[tool(description = "Deliver a notification click. Returns the URL to open.")]
    async fn worker_notification_click(
        &self, params: Parameters<NotificationClickParams>,
    ) -> Result<CallToolResult, McpError> {
        click_impl(&self.worker, params.0).await
    }

    #[tool(description = "Deliver a background sync event for a tag.")]
    async fn worker_sync(&self, params: Parameters<SyncParams>) -> Result<CallToolResult, McpError> {
        sync_impl(&self.worker, params.0).await
    }

    #[tool(description = "Get a cached entry of the current bucket by URL or key hash.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(self.worker.cache(), params.0).await
    }

    #[tool(description = "Purge cache entries by key hash, URL pattern or count, or delete a named bucket.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(self.worker.cache(), params.0).await
    }

    #[tool(description = "Call an action on the remote API. Returns the data field of its reply.")]
    async fn api_call(&self, params: Parameters<ApiCallParams>) -> Result<CallToolResult, McpError> {
        api_call_impl(self.api.as_deref(), params.0).await
    }
}

impl ServerHandler for WaystationServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "waystation".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
