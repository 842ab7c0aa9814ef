//! worker_fetch tool implementation.
//!
//! Sends a request through the worker. Intercepted requests report the
//! strategy and source that answered them; pass-throughs are performed
//! directly on the network, as a page would without a worker.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use waystation_client::{Interception, Worker};
use waystation_core::{Error, FetchRequest, FetchResponse, Method, RequestMode};

use super::json_result;

/// Input parameters for worker_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerFetchParams {
    /// Absolute URL, or a path relative to the app origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default)]
    pub method: Option<String>,

    /// Request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Request body as text.
    #[serde(default)]
    pub body: Option<String>,

    /// Treat the request as a page navigation.
    #[serde(default)]
    pub navigate: bool,
}

/// Output structure for worker_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerFetchOutput {
    /// Whether the worker answered the request itself.
    pub intercepted: bool,
    /// "cache-first", "network-first" or "pass-through".
    pub strategy: String,
    /// "network", "cache", "fallback" or "synthetic"; absent for pass-throughs.
    pub source: Option<String>,
    pub status: u16,
    pub status_text: String,
    pub response_type: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8, lossily.
    pub body: String,
}

impl WorkerFetchOutput {
    fn new(strategy: &str, source: Option<&str>, response: FetchResponse) -> Self {
        let body = response.body_text();
        Self {
            intercepted: source.is_some(),
            strategy: strategy.to_string(),
            source: source.map(str::to_string),
            status: response.status,
            status_text: response.status_text,
            response_type: response.response_type.to_string(),
            url: response.url,
            headers: response.headers,
            body,
        }
    }
}

fn build_request(params: WorkerFetchParams) -> Result<FetchRequest, Error> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()));
    }

    let method = match params.method.as_deref() {
        Some(method) => method.parse::<Method>().map_err(Error::InvalidInput)?,
        None => Method::Get,
    };

    let mut request = FetchRequest::get(params.url).with_method(method);
    request.headers = params.headers;
    request.body = params.body.map(String::into_bytes);
    if params.navigate {
        request.mode = RequestMode::Navigate;
    }
    Ok(request)
}

/// Implementation of the worker_fetch tool.
pub async fn fetch_impl(worker: &Worker, params: WorkerFetchParams) -> Result<CallToolResult, McpError> {
    let request = build_request(params)?;

    let output = match worker.intercept(request).await? {
        Interception::Resolved(resolution) => WorkerFetchOutput::new(
            resolution.strategy.as_str(),
            Some(resolution.source.as_str()),
            resolution.response,
        ),
        Interception::PassThrough(request) => {
            tracing::debug!(url = %request.url, "fetch not intercepted");
            let response = worker.pass_through(request).await?;
            WorkerFetchOutput::new("pass-through", None, response)
        }
    };

    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{API_URL, StubNetwork, output, worker};

    fn params(url: &str) -> WorkerFetchParams {
        WorkerFetchParams { url: url.to_string(), method: None, headers: BTreeMap::new(), body: None, navigate: false }
    }

    #[tokio::test]
    async fn test_fetch_served_from_cache() {
        let network = StubNetwork::new();
        let worker = worker(&network).await;
        worker.start().await.unwrap();

        let result = fetch_impl(&worker, params("/index.html")).await.unwrap();
        let out: WorkerFetchOutput = output(&result);
        assert!(out.intercepted);
        assert_eq!(out.strategy, "cache-first");
        assert_eq!(out.source.as_deref(), Some("cache"));
        assert_eq!(out.body, "<h1>leads</h1>");

        worker.tasks().drain().await;
    }

    #[tokio::test]
    async fn test_offline_navigation() {
        let network = StubNetwork::new();
        let worker = worker(&network).await;
        worker.start().await.unwrap();

        let result = fetch_impl(&worker, WorkerFetchParams { navigate: true, ..params("/leads/42") })
            .await
            .unwrap();
        let out: WorkerFetchOutput = output(&result);
        assert_eq!(out.source.as_deref(), Some("fallback"));
        assert_eq!(out.body, "you are offline");
    }

    #[tokio::test]
    async fn test_api_is_network_first() {
        let network = StubNetwork::new();
        let worker = worker(&network).await;
        worker.start().await.unwrap();
        network.respond(API_URL, 200, r#"{"success":true}"#);

        let result = fetch_impl(&worker, params(API_URL)).await.unwrap();
        let out: WorkerFetchOutput = output(&result);
        assert_eq!(out.strategy, "network-first");
        assert_eq!(out.source.as_deref(), Some("network"));
        assert_eq!(out.response_type, "cors");
    }

    #[tokio::test]
    async fn test_pass_through_fetches_directly() {
        let network = StubNetwork::new();
        let worker = worker(&network).await;
        worker.start().await.unwrap();
        network.respond("https://cdn.example.com/lib.js", 200, "lib");

        let result = fetch_impl(&worker, params("https://cdn.example.com/lib.js")).await.unwrap();
        let out: WorkerFetchOutput = output(&result);
        assert!(!out.intercepted);
        assert_eq!(out.strategy, "pass-through");
        assert_eq!(out.body, "lib");
    }

    #[tokio::test]
    async fn test_relative_pass_through_before_activation() {
        let network = StubNetwork::new();
        let worker = worker(&network).await;

        let result = fetch_impl(&worker, params("/index.html")).await.unwrap();
        let out: WorkerFetchOutput = output(&result);
        assert!(!out.intercepted);
        assert_eq!(out.url, "http://localhost:8080/index.html");
        assert_eq!(out.body, "<h1>leads</h1>");
    }

    #[tokio::test]
    async fn test_bad_method_rejected() {
        let network = StubNetwork::new();
        let worker = worker(&network).await;
        let result = fetch_impl(&worker, WorkerFetchParams { method: Some("BREW".into()), ..params("/") }).await;
        assert!(result.is_err());
    }
}
