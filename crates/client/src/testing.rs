//! Scripted [`Network`] for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;
use waystation_core::{AppConfig, Error, FetchRequest, FetchResponse, ResponseType};

use crate::fetch::Network;

pub(crate) const ORIGIN: &str = "http://localhost:8080";
pub(crate) const API_URL: &str = "https://script.google.com/macros/s/abc/exec";

#[derive(Clone)]
enum Route {
    Respond(FetchResponse),
    Fail,
    Hang,
}

/// Answers requests from a route table keyed by absolute URL.
///
/// Route helpers take paths starting with `/` relative to [`ORIGIN`];
/// requests must carry absolute URLs, as they would on the wire. Unknown
/// URLs fail like an unreachable host.
#[derive(Default)]
pub(crate) struct FakeNetwork {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<HashMap<String, usize>>,
}

fn absolute(url: &str) -> String {
    if url.starts_with('/') { format!("{ORIGIN}{url}") } else { url.to_string() }
}

impl FakeNetwork {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, url: &str, status: u16, body: &str) {
        self.respond_with(url, FetchResponse::new(status, body.to_string()));
    }

    /// Route `url` to `response`. Responses keep the type they were built
    /// with unless it is the default, in which case the type follows the
    /// origin of `url`.
    pub(crate) fn respond_with(&self, url: &str, response: FetchResponse) {
        let url = absolute(url);
        let mut response = response;
        if response.response_type == ResponseType::Default {
            response.response_type =
                if url.starts_with(ORIGIN) { ResponseType::Basic } else { ResponseType::Cors };
        }
        response.url = url.clone();
        self.routes.lock().unwrap().insert(url, Route::Respond(response));
    }

    pub(crate) fn fail(&self, url: &str) {
        self.routes.lock().unwrap().insert(absolute(url), Route::Fail);
    }

    /// Requests to `url` never complete.
    pub(crate) fn hang(&self, url: &str) {
        self.routes.lock().unwrap().insert(absolute(url), Route::Hang);
    }

    pub(crate) fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(&absolute(url)).copied().unwrap_or(0)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, Error> {
        if Url::parse(&request.url).is_err() {
            return Err(Error::InvalidUrl(format!("{}: not absolute", request.url)));
        }
        let url = request.url.clone();
        *self.calls.lock().unwrap().entry(url.clone()).or_default() += 1;

        let route = self.routes.lock().unwrap().get(&url).cloned();
        match route {
            Some(Route::Respond(response)) => Ok(response),
            Some(Route::Fail) | None => Err(Error::Network(format!("{url}: connection refused"))),
            Some(Route::Hang) => std::future::pending().await,
        }
    }
}

/// Config with a two-entry manifest served from [`ORIGIN`].
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        origin: ORIGIN.to_string(),
        api_url: Some(API_URL.to_string()),
        static_assets: vec!["/a.html".to_string(), "/offline.html".to_string()],
        ..AppConfig::default()
    }
}
