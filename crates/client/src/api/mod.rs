//! Client for the remote scripting API.
//!
//! Every call names an `action`. Calls without parameters are sent as
//! `GET {endpoint}?action=...`; calls with parameters are form-encoded
//! `POST`s carrying `action` and a JSON-encoded `params` field. The reply
//! is a JSON envelope `{success, message, data}`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;
use url::form_urlencoded;
use waystation_core::{Error, FetchRequest, Method};

use crate::fetch::{Network, media_type};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Reply envelope of every API action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

pub struct ScriptApi {
    endpoint: Url,
    network: Arc<dyn Network>,
}

impl ScriptApi {
    pub fn new(endpoint: &str, network: Arc<dyn Network>) -> Result<Self, Error> {
        let endpoint = Url::parse(endpoint).map_err(|e| Error::InvalidUrl(format!("{endpoint}: {e}")))?;
        Ok(Self { endpoint, network })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Build the request for `action`; `params` of `None`, `null` or an
    /// empty object selects the GET form.
    pub fn build_request(&self, action: &str, params: Option<&Value>) -> Result<FetchRequest, Error> {
        if action.trim().is_empty() {
            return Err(Error::InvalidInput("action cannot be empty".into()));
        }

        let params = params.filter(|p| !is_empty_params(p));
        let Some(params) = params else {
            let mut url = self.endpoint.clone();
            url.query_pairs_mut().append_pair("action", action);
            return Ok(FetchRequest::get(url.as_str()));
        };

        let json = serde_json::to_string(params).map_err(|e| Error::InvalidInput(format!("params: {e}")))?;
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("action", action)
            .append_pair("params", &json)
            .finish();

        Ok(FetchRequest::get(self.endpoint.as_str())
            .with_method(Method::Post)
            .with_header("content-type", FORM_CONTENT_TYPE)
            .with_body(body))
    }

    /// Call `action` and return the envelope's `data`.
    pub async fn call(&self, action: &str, params: Option<&Value>) -> Result<Option<Value>, Error> {
        let request = self.build_request(action, params)?;
        let response = self.network.fetch(&request).await?;

        let envelope: ApiEnvelope = serde_json::from_slice(&response.body).map_err(|e| {
            let media = media_type(&response).unwrap_or("unknown type");
            Error::ApiUnavailable(format!("{action}: status {} with non-JSON body ({media}): {e}", response.status))
        })?;

        if !envelope.success {
            let message = envelope.message.unwrap_or_else(|| "request failed".to_string());
            tracing::debug!(%action, %message, "api call rejected");
            return Err(Error::Api(message));
        }

        tracing::debug!(%action, "api call succeeded");
        Ok(envelope.data)
    }
}

fn is_empty_params(params: &Value) -> bool {
    match params {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
