//! api_call tool implementation.
//!
//! Calls an action on the remote scripting API. Requests go through the
//! worker, so a failed call while offline surfaces as `API_UNAVAILABLE`
//! rather than a transport error.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use waystation_client::ScriptApi;
use waystation_core::Error;

use super::json_result;

/// Input parameters for api_call tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ApiCallParams {
    /// Action name, e.g. "getLeads".
    pub action: String,

    /// Action parameters; omit for zero-argument actions.
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ApiCallOutput {
    pub action: String,
    /// The envelope's `data` field.
    pub data: Option<Value>,
}

/// Implementation of the api_call tool.
pub async fn api_call_impl(api: Option<&ScriptApi>, params: ApiCallParams) -> Result<CallToolResult, McpError> {
    let Some(api) = api else {
        return Err(Error::InvalidInput("api_url is not configured; set WAYSTATION_API_URL".into()).into());
    };

    let data = api.call(&params.action, params.params.as_ref()).await?;
    json_result(&ApiCallOutput { action: params.action, data })
}
