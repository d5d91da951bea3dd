//! The `Request` entity (§3).

use super::status::RequestStatus;

/// A single model-configuration slot for a measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: String,
    pub llm_config: String,
    pub status: RequestStatus,
    pub measurement_id: i64,
    pub address: Option<String>,
}
