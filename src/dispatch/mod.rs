//! The Dispatch Loop (D, §4.5): matches queued requests to ready/idle
//! wrappers, issuing `deploy`/`stop` as the wrapper state machine (§4.3)
//! requires, and marks measurements `finished` once their queue drains.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, Notify};
use tracing::{debug, error, warn};

use crate::domain::{Measurement, MeasurementStatus, RequestStatus, Wrapper, WrapperStatus};
use crate::error::RegistryResult;
use crate::store::Store;
use crate::worker::{DeployOutcome, StopOutcome, WorkerAdapter};

const MIN_INTERVAL: Duration = Duration::from_secs(5);
const MAX_INTERVAL: Duration = Duration::from_secs(10);
const INTERVAL_STEP: Duration = Duration::from_secs(1);

const DEPLOY_CALL_TIMEOUT: Duration = Duration::from_secs(300);
const STOP_CALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Matches requests to wrappers on an adaptive schedule: it speeds up while
/// there's work and backs off while idle (§4.5, §5).
pub struct DispatchLoop {
    store: Arc<Store>,
    adapter: Arc<dyn WorkerAdapter>,
    coordination: Arc<AsyncMutex<()>>,
    shutdown: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
    /// Woken by the Request API on submit/release so new work isn't stuck
    /// waiting out the current backoff interval.
    work_notify: Arc<Notify>,
}

impl DispatchLoop {
    pub fn new(
        store: Arc<Store>,
        adapter: Arc<dyn WorkerAdapter>,
        coordination: Arc<AsyncMutex<()>>,
        shutdown: Arc<AtomicBool>,
        shutdown_notify: Arc<Notify>,
        work_notify: Arc<Notify>,
    ) -> Self {
        Self { store, adapter, coordination, shutdown, shutdown_notify, work_notify }
    }

    pub async fn run(&self) {
        let mut interval = MIN_INTERVAL;
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.shutdown_notify.notified() => {
                    if self.shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                }
                _ = self.work_notify.notified() => {}
            }
            match self.run_once().await {
                Ok(did_work) => {
                    interval = if did_work { MIN_INTERVAL } else { (interval + INTERVAL_STEP).min(MAX_INTERVAL) };
                }
                Err(e) => {
                    error!(error = %e, "dispatch loop iteration failed");
                }
            }
        }
        debug!("dispatch loop exiting");
    }

    /// One matching sweep: phase 1 before phase 2 (§5 ordering guarantee).
    /// Returns whether any request made progress, which drives backoff.
    pub async fn run_once(&self) -> RegistryResult<bool> {
        let mut did_work = false;
        did_work |= self.phase1_zero_cost_matching().await?;
        did_work |= self.phase2_general_matching().await?;
        Ok(did_work)
    }

    /// Phase 1: a queued request whose `llm_config` already matches a
    /// `ready` wrapper with an unbound measurement. Still calls `deploy` —
    /// "zero-cost" means no candidate search or stop-before-redeploy, not
    /// that the remote round trip is skipped.
    async fn phase1_zero_cost_matching(&self) -> RegistryResult<bool> {
        let candidates = {
            let _guard = self.coordination.lock().await;
            self.store.find_best_deployments()?
        };

        let mut did_work = false;
        for best in candidates {
            let ok = self.call_deploy(best.wrapper_id, &best.wrapper_address, &best.llm_config).await?;

            let _guard = self.coordination.lock().await;
            if ok {
                self.store.set_request_address(&best.request_id, &best.wrapper_address)?;
                self.store.set_wrapper_status(best.wrapper_id, WrapperStatus::Prompting)?;
                self.store.set_measurement_wrapper(best.measurement_id, Some(best.wrapper_id))?;
                did_work = true;
            } else {
                self.store.set_wrapper_status(best.wrapper_id, WrapperStatus::Failure)?;
                self.store.set_request_status(&best.request_id, RequestStatus::Queued)?;
            }
        }
        Ok(did_work)
    }

    /// Phase 2: every measurement still `deployments_pending` gets a
    /// candidate wrapper — its own bound idle/ready wrapper if it has one,
    /// otherwise the idle pool, falling back to the ready pool.
    async fn phase2_general_matching(&self) -> RegistryResult<bool> {
        let pending = {
            let _guard = self.coordination.lock().await;
            self.store.list_measurements_by_status(MeasurementStatus::DeploymentsPending)?
        };

        let mut did_work = false;
        for measurement in pending {
            did_work |= self.dispatch_measurement(&measurement).await?;
        }
        Ok(did_work)
    }

    async fn dispatch_measurement(&self, measurement: &Measurement) -> RegistryResult<bool> {
        let (candidates, request) = {
            let _guard = self.coordination.lock().await;
            let Some(candidates) = self.candidate_wrappers(measurement)? else {
                return Ok(false);
            };
            let request = self.store.next_queued_request_for_measurement(measurement.id)?;
            (candidates, request)
        };

        let Some(request) = request else {
            let _guard = self.coordination.lock().await;
            self.store.set_measurement_status(measurement.id, MeasurementStatus::Finished)?;
            debug!(measurement_id = measurement.id, "measurement finished, no queued requests remain");
            return Ok(true);
        };

        for candidate in candidates {
            if candidate.status == WrapperStatus::Ready {
                {
                    let _guard = self.coordination.lock().await;
                    self.store.set_wrapper_status(candidate.id, WrapperStatus::Stopping)?;
                }
                let stopped = self.call_stop(candidate.id, &candidate.address).await?;
                let _guard = self.coordination.lock().await;
                if stopped {
                    self.store.set_wrapper_status(candidate.id, WrapperStatus::Idle)?;
                } else {
                    self.store.set_wrapper_status(candidate.id, WrapperStatus::Failure)?;
                    continue;
                }
            }

            let deployed = self.call_deploy(candidate.id, &candidate.address, &request.llm_config).await?;
            let _guard = self.coordination.lock().await;
            if deployed {
                self.store.set_request_address(&request.id, &candidate.address)?;
                self.store.set_wrapper_status(candidate.id, WrapperStatus::Prompting)?;
                self.store.set_wrapper_config(candidate.id, &request.llm_config)?;
                if measurement.wrapper_id.is_none() {
                    self.store.set_measurement_wrapper(measurement.id, Some(candidate.id))?;
                }
                self.store.set_measurement_status(measurement.id, MeasurementStatus::Prompting)?;
                return Ok(true);
            } else {
                self.store.set_wrapper_status(candidate.id, WrapperStatus::Failure)?;
            }
        }
        Ok(false)
    }

    /// `None` means skip this measurement this round (its bound wrapper is
    /// busy with something else, §4.5 step 1).
    fn candidate_wrappers(&self, measurement: &Measurement) -> RegistryResult<Option<Vec<Wrapper>>> {
        if let Some(wrapper_id) = measurement.wrapper_id {
            let bound = self.store.get_wrapper_by_id(wrapper_id)?;
            return Ok(match bound {
                Some(w) if w.status.is_dispatch_candidate() => Some(vec![w]),
                _ => None,
            });
        }

        let idle = self.store.find_wrappers_by_status(WrapperStatus::Idle)?;
        if !idle.is_empty() {
            return Ok(Some(idle));
        }
        Ok(Some(self.store.find_wrappers_by_status(WrapperStatus::Ready)?))
    }

    /// `stop`'s only failure edge in the state machine goes to `failure`
    /// (§4.3), so transport errors fold into the same outcome as a
    /// well-formed negative reply.
    async fn call_stop(&self, wrapper_id: i64, address: &str) -> RegistryResult<bool> {
        match tokio::time::timeout(STOP_CALL_TIMEOUT, self.adapter.stop(address)).await {
            Ok(Ok(StopOutcome::Stopped)) => Ok(true),
            Ok(Ok(StopOutcome::Failure)) => {
                warn!(wrapper_id, "stop reported failure");
                Ok(false)
            }
            Ok(Err(e)) => {
                warn!(wrapper_id, error = %e, "stop call failed");
                Ok(false)
            }
            Err(_) => {
                warn!(wrapper_id, "stop timed out");
                Ok(false)
            }
        }
    }

    /// `deploy`'s only failure edge also goes to `failure` (§4.3, §4.5 "deploy()
    /// failures always leave the wrapper in failure").
    async fn call_deploy(&self, wrapper_id: i64, address: &str, config: &str) -> RegistryResult<bool> {
        match tokio::time::timeout(DEPLOY_CALL_TIMEOUT, self.adapter.deploy(address, config)).await {
            Ok(Ok(DeployOutcome::Ready)) => Ok(true),
            Ok(Ok(DeployOutcome::Failure)) => {
                warn!(wrapper_id, "deploy reported failure");
                Ok(false)
            }
            Ok(Err(e)) => {
                warn!(wrapper_id, error = %e, "deploy call failed");
                Ok(false)
            }
            Err(_) => {
                warn!(wrapper_id, "deploy timed out");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::fake::FakeWorkerAdapter;

    fn dispatch_loop(store: Arc<Store>, adapter: Arc<FakeWorkerAdapter>) -> DispatchLoop {
        DispatchLoop::new(
            store,
            adapter,
            Arc::new(AsyncMutex::new(())),
            Arc::new(AtomicBool::new(false)),
            Arc::new(Notify::new()),
            Arc::new(Notify::new()),
        )
    }

    #[tokio::test]
    async fn zero_cost_match_still_calls_deploy() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let wrapper_id = store.add_wrapper("llama", "10.0.0.1", "u", "p", WrapperStatus::Ready).unwrap();
        store.set_wrapper_config(wrapper_id, "config-x").unwrap();
        store.add_measurement(1).unwrap();
        store.add_request("r1", "config-x", 1).unwrap();
        let adapter = Arc::new(FakeWorkerAdapter::new());
        adapter.queue_deploy("10.0.0.1", Ok(DeployOutcome::Ready));

        let did_work = dispatch_loop(store.clone(), adapter.clone()).run_once().await.unwrap();

        assert!(did_work);
        assert_eq!(adapter.call_count("deploy", "10.0.0.1"), 1);
        assert_eq!(adapter.call_count("stop", "10.0.0.1"), 0);
        assert_eq!(store.get_request("r1").unwrap().unwrap().status, RequestStatus::Deployed);
        assert_eq!(store.get_wrapper_by_id(wrapper_id).unwrap().unwrap().status, WrapperStatus::Prompting);
        assert_eq!(store.get_measurement(1).unwrap().unwrap().wrapper_id, Some(wrapper_id));
    }

    #[tokio::test]
    async fn zero_cost_match_failure_leaves_wrapper_failure_and_request_queued() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let wrapper_id = store.add_wrapper("llama", "10.0.0.1", "u", "p", WrapperStatus::Ready).unwrap();
        store.set_wrapper_config(wrapper_id, "config-x").unwrap();
        store.add_measurement(1).unwrap();
        store.add_request("r1", "config-x", 1).unwrap();
        let adapter = Arc::new(FakeWorkerAdapter::new());
        adapter.queue_deploy("10.0.0.1", Ok(DeployOutcome::Failure));

        dispatch_loop(store.clone(), adapter.clone()).run_once().await.unwrap();

        assert_eq!(store.get_request("r1").unwrap().unwrap().status, RequestStatus::Queued);
        assert_eq!(store.get_wrapper_by_id(wrapper_id).unwrap().unwrap().status, WrapperStatus::Failure);
    }

    #[tokio::test]
    async fn idle_candidate_is_deployed_to_and_measurement_becomes_prompting() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let wrapper_id = store.add_wrapper("llama", "10.0.0.1", "u", "p", WrapperStatus::Idle).unwrap();
        store.add_measurement(1).unwrap();
        store.add_request("r1", "config-x", 1).unwrap();
        let adapter = Arc::new(FakeWorkerAdapter::new());
        adapter.queue_deploy("10.0.0.1", Ok(DeployOutcome::Ready));

        let did_work = dispatch_loop(store.clone(), adapter.clone()).run_once().await.unwrap();

        assert!(did_work);
        let wrapper = store.get_wrapper_by_id(wrapper_id).unwrap().unwrap();
        assert_eq!(wrapper.status, WrapperStatus::Prompting);
        assert_eq!(wrapper.llm_config.as_deref(), Some("config-x"));
        assert_eq!(store.get_measurement(1).unwrap().unwrap().wrapper_id, Some(wrapper_id));
        assert_eq!(store.get_measurement(1).unwrap().unwrap().status, MeasurementStatus::Prompting);
    }

    #[tokio::test]
    async fn ready_candidate_with_mismatched_config_is_stopped_before_redeploy() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let wrapper_id = store.add_wrapper("llama", "10.0.0.1", "u", "p", WrapperStatus::Ready).unwrap();
        store.set_wrapper_config(wrapper_id, "config-old").unwrap();
        // Unbound measurement so phase 1's exact-match query can't fire on config-old.
        store.add_measurement(1).unwrap();
        store.add_request("r1", "config-new", 1).unwrap();
        let adapter = Arc::new(FakeWorkerAdapter::new());
        adapter.queue_stop("10.0.0.1", Ok(StopOutcome::Stopped));
        adapter.queue_deploy("10.0.0.1", Ok(DeployOutcome::Ready));

        let did_work = dispatch_loop(store.clone(), adapter.clone()).run_once().await.unwrap();

        assert!(did_work);
        assert_eq!(adapter.call_count("stop", "10.0.0.1"), 1);
        assert_eq!(adapter.call_count("deploy", "10.0.0.1"), 1);
        assert_eq!(store.get_wrapper_by_id(wrapper_id).unwrap().unwrap().llm_config.as_deref(), Some("config-new"));
    }

    #[tokio::test]
    async fn measurement_with_no_queued_requests_is_marked_finished_by_measurement_id() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let wrapper_id = store.add_wrapper("llama", "10.0.0.1", "u", "p", WrapperStatus::Prompting).unwrap();
        store.add_measurement(42).unwrap();
        store.set_measurement_wrapper(42, Some(wrapper_id)).unwrap();
        // No requests at all for measurement 42: next_queued_request_for_measurement returns None.
        let adapter = Arc::new(FakeWorkerAdapter::new());

        let did_work = dispatch_loop(store.clone(), adapter.clone()).run_once().await.unwrap();

        assert!(did_work);
        assert_eq!(store.get_measurement(42).unwrap().unwrap().status, MeasurementStatus::Finished);
    }

    #[tokio::test]
    async fn measurement_with_busy_bound_wrapper_is_skipped_this_round() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let wrapper_id = store.add_wrapper("llama", "10.0.0.1", "u", "p", WrapperStatus::Prompting).unwrap();
        store.add_measurement(1).unwrap();
        store.set_measurement_wrapper(1, Some(wrapper_id)).unwrap();
        store.add_request("r1", "config-x", 1).unwrap();
        let adapter = Arc::new(FakeWorkerAdapter::new());

        let did_work = dispatch_loop(store.clone(), adapter.clone()).run_once().await.unwrap();

        assert!(!did_work);
        assert_eq!(store.get_request("r1").unwrap().unwrap().status, RequestStatus::Queued);
    }

    #[tokio::test]
    async fn no_candidates_leaves_request_queued() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.add_measurement(1).unwrap();
        store.add_request("r1", "config-x", 1).unwrap();
        let adapter = Arc::new(FakeWorkerAdapter::new());

        let did_work = dispatch_loop(store.clone(), adapter.clone()).run_once().await.unwrap();

        assert!(!did_work);
        assert_eq!(store.get_request("r1").unwrap().unwrap().status, RequestStatus::Queued);
    }
}
