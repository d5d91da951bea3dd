//! The Request API (E, §4.6): submit/status/release over the store. Never
//! touches the `WorkerAdapter` directly — matching is the dispatch loop's job.

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::info;
use uuid::Uuid;

use crate::domain::{LlmConfig, MeasurementStatus, RequestPayload, RequestResponse, RequestSingleResponse, RequestStatusView, WrapperStatus};
use crate::error::{RegistryError, RegistryResult};
use crate::store::Store;

/// Pure request-lifecycle operations, backed by the store.
pub struct RequestApi {
    store: Arc<Store>,
    dispatch_notify: Arc<Notify>,
}

impl RequestApi {
    pub fn new(store: Arc<Store>, dispatch_notify: Arc<Notify>) -> Self {
        Self { store, dispatch_notify }
    }

    /// Create one `queued` request per `LlmConfig` entry, sharing `measurementId`.
    ///
    /// Requires a positive `measurement_id` and a non-empty `llms` list (§4.6);
    /// neither mutates the store.
    pub fn submit(&self, payload: RequestPayload) -> RegistryResult<RequestResponse> {
        if payload.measurement_id <= 0 {
            return Err(RegistryError::InvalidState(format!("measurement_id must be positive, got {}", payload.measurement_id)));
        }
        if payload.llms.is_empty() {
            return Err(RegistryError::InvalidState("llms must be a non-empty list".to_string()));
        }

        self.store.add_measurement(payload.measurement_id)?;

        let mut requests = Vec::with_capacity(payload.llms.len());
        for llm in payload.llms {
            let config_json = serde_json::to_string(&llm)?;
            let request_id = Uuid::new_v4().to_string();
            self.store.add_request(&request_id, &config_json, payload.measurement_id)?;
            info!(request_id, measurement_id = payload.measurement_id, "request queued");
            requests.push(RequestSingleResponse { request_id, llmconfig: llm });
        }

        self.dispatch_notify.notify_one();
        Ok(RequestResponse { requests })
    }

    pub fn status(&self, request_id: &str) -> RegistryResult<RequestStatusView> {
        let request = self.store.get_request(request_id)?.ok_or_else(|| RegistryError::NotFound(format!("request {request_id}")))?;
        let llmconfig: LlmConfig = serde_json::from_str(&request.llm_config)?;
        Ok(RequestStatusView {
            request_id: request.id,
            llmconfig,
            status: request.status.to_string(),
            measurement_id: request.measurement_id,
            address: request.address,
        })
    }

    /// Release the wrapper a request occupies (§4.6): the wrapper returns to
    /// `not_ready` (the health loop will re-poll it back into `idle`/`ready`)
    /// and its measurement becomes `deployments_pending` again so the next
    /// request in that measurement can be serviced. A request that was never
    /// deployed, or whose wrapper has moved on, fails with `invalid_state`
    /// and mutates nothing.
    pub fn release(&self, request_id: &str) -> RegistryResult<()> {
        let request = self.store.get_request(request_id)?.ok_or_else(|| RegistryError::NotFound(format!("request {request_id}")))?;

        let address = request
            .address
            .ok_or_else(|| RegistryError::InvalidState(format!("request {request_id} has no bound wrapper to release")))?;
        let wrapper = self
            .store
            .get_wrapper_by_address(&address)?
            .ok_or_else(|| RegistryError::InvalidState(format!("request {request_id}'s wrapper at {address} no longer exists")))?;
        if wrapper.status != WrapperStatus::Prompting {
            return Err(RegistryError::InvalidState(format!(
                "wrapper {} is {}, not prompting; cannot release",
                wrapper.id, wrapper.status
            )));
        }

        self.store.set_wrapper_status(wrapper.id, WrapperStatus::NotReady)?;
        self.store.set_measurement_status(request.measurement_id, MeasurementStatus::DeploymentsPending)?;
        self.dispatch_notify.notify_one();
        Ok(())
    }
}
