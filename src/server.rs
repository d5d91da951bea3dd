//! HTTP binding for the Request API (§4.6, §6): `/promptingservice/request`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

use crate::api::RequestApi;
use crate::domain::{RequestPayload, RequestResponse, RequestStatusView};
use crate::error::RegistryError;

/// Wraps `RegistryError` for the HTTP boundary (§7 propagation policy):
/// `InvalidState`/`NotFound` surface their detail; everything else becomes
/// an opaque 500 with a correlation id, logged server-side.
struct ApiError(RegistryError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            RegistryError::NotFound(detail) => (StatusCode::NOT_FOUND, detail).into_response(),
            RegistryError::InvalidState(detail) => (StatusCode::CONFLICT, detail).into_response(),
            other => {
                let correlation_id = Uuid::new_v4();
                error!(%correlation_id, error = %other, "unhandled registry error");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("internal error, correlation id {correlation_id}")).into_response()
            }
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        Self(e)
    }
}

pub fn router(request_api: Arc<RequestApi>) -> Router {
    Router::new()
        .route("/promptingservice/request", post(submit).get(list_unsupported))
        .route("/promptingservice/request/:request_id", axum::routing::get(status).delete(release))
        .layer(TraceLayer::new_for_http())
        .with_state(request_api)
}

async fn submit(State(api): State<Arc<RequestApi>>, Json(payload): Json<RequestPayload>) -> Result<(StatusCode, Json<RequestResponse>), ApiError> {
    let response = api.submit(payload)?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn status(State(api): State<Arc<RequestApi>>, Path(request_id): Path<String>) -> Result<Json<RequestStatusView>, ApiError> {
    let view = api.status(&request_id)?;
    Ok(Json(view))
}

async fn release(State(api): State<Arc<RequestApi>>, Path(request_id): Path<String>) -> Result<StatusCode, ApiError> {
    api.release(&request_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_unsupported() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}
