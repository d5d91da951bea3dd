//! The `Measurement` entity (§3).

use super::status::MeasurementStatus;

/// A client-visible job aggregating N requests.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub id: i64,
    pub status: MeasurementStatus,
    pub wrapper_id: Option<i64>,
}
