//! Test fixtures shared by the tool tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rmcp::model::CallToolResult;
use serde::de::DeserializeOwned;
use waystation_client::{Network, Worker};
use waystation_core::{AppConfig, CacheDb, Error, FetchRequest, FetchResponse, ResponseType};

pub(crate) const ORIGIN: &str = "http://localhost:8080";
pub(crate) const API_URL: &str = "https://script.google.com/macros/s/abc/exec";

/// Canned responses keyed by absolute URL; anything else is unreachable.
#[derive(Default)]
pub(crate) struct StubNetwork {
    routes: Mutex<HashMap<String, FetchResponse>>,
}

impl StubNetwork {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, url: &str, status: u16, body: &str) {
        let url = if url.starts_with('/') { format!("{ORIGIN}{url}") } else { url.to_string() };
        let response_type = if url.starts_with(ORIGIN) { ResponseType::Basic } else { ResponseType::Cors };
        let response = FetchResponse::new(status, body.to_string())
            .with_type(response_type)
            .with_url(url.clone());
        self.routes.lock().unwrap().insert(url, response);
    }

    pub(crate) fn clear(&self) {
        self.routes.lock().unwrap().clear();
    }
}

#[async_trait]
impl Network for StubNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, Error> {
        self.routes
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .ok_or_else(|| Error::Network(format!("{}: unreachable", request.url)))
    }
}

pub(crate) fn config() -> AppConfig {
    AppConfig {
        origin: ORIGIN.to_string(),
        api_url: Some(API_URL.to_string()),
        static_assets: vec!["/index.html".to_string(), "/offline.html".to_string()],
        ..AppConfig::default()
    }
}

/// A worker over an in-memory store whose manifest is already served.
pub(crate) async fn worker(network: &Arc<StubNetwork>) -> Arc<Worker> {
    network.respond("/index.html", 200, "<h1>leads</h1>");
    network.respond("/offline.html", 200, "you are offline");
    let db = CacheDb::open_in_memory().await.unwrap();
    Arc::new(Worker::new(&config(), db, network.clone()).unwrap())
}

/// Decode the JSON text content of a tool result.
pub(crate) fn output<T: DeserializeOwned>(result: &CallToolResult) -> T {
    let content = serde_json::to_value(&result.content[0]).unwrap();
    let text = content
        .get("text")
        .and_then(|v| v.as_str())
        .expect("Expected text field in content");
    serde_json::from_str(text).unwrap()
}
