//! Wire DTOs for the Request API's HTTP surface (§6, ambient per SPEC_FULL §3).
//!
//! These are the shapes clients actually POST/GET; they are converted to and
//! from store rows at the boundary and never passed into the store or the
//! dispatch loop directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One model configuration, as submitted by a client.
///
/// Doubles as the opaque `llm_config` equality key once serialized to JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub modeltyp: String,
    pub model: String,
    pub uses_chat_template: bool,
    pub args: Args,
}

/// Freeform prompting/deployment parameters, opaque to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Args {
    pub prompting: Value,
    pub deployment: Value,
}

/// Body of `POST /promptingservice/request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPayload {
    pub llms: Vec<LlmConfig>,
    #[serde(rename = "measurementId")]
    pub measurement_id: i64,
}

/// One entry of a submit response.
#[derive(Debug, Clone, Serialize)]
pub struct RequestSingleResponse {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub llmconfig: LlmConfig,
}

/// Response of `POST /promptingservice/request`.
#[derive(Debug, Clone, Serialize)]
pub struct RequestResponse {
    pub requests: Vec<RequestSingleResponse>,
}

/// Response of `GET /promptingservice/request/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct RequestStatusView {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub llmconfig: LlmConfig,
    pub status: String,
    #[serde(rename = "measurementId")]
    pub measurement_id: i64,
    pub address: Option<String>,
}
