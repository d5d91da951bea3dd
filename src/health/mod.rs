//! The Health Loop (C, §4.3, §4.4): reconciles every wrapper's status once
//! per fixed period, issuing the restart/install/poll action its current
//! status calls for.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::domain::{Wrapper, WrapperStatus};
use crate::error::RegistryResult;
use crate::store::Store;
use crate::worker::{ProvisionOutcome, WorkerAdapter};

/// Fixed period between health sweeps (§4.4 — unlike Dispatch, no backoff).
pub const HEALTH_PERIOD: Duration = Duration::from_secs(60);

/// `install()`'s own duration is unbounded by design (§4.2) — this timeout
/// only bounds how long the health loop's task-join waits at shutdown.
const INSTALL_TIMEOUT: Duration = Duration::from_secs(600);
const RESTART_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_TIMEOUT: Duration = Duration::from_secs(15);

/// Reconciles wrapper status once per `HEALTH_PERIOD`, cooperatively.
pub struct HealthLoop {
    store: Arc<Store>,
    adapter: Arc<dyn WorkerAdapter>,
    coordination: Arc<AsyncMutex<()>>,
    shutdown: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl HealthLoop {
    pub fn new(store: Arc<Store>, adapter: Arc<dyn WorkerAdapter>, coordination: Arc<AsyncMutex<()>>, shutdown: Arc<AtomicBool>, notify: Arc<Notify>) -> Self {
        Self { store, adapter, coordination, shutdown, notify }
    }

    /// Runs until `shutdown` is observed, sleeping `HEALTH_PERIOD` between sweeps.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(HEALTH_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.notify.notified() => {
                    if self.shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                }
            }
            if let Err(e) = self.run_once().await {
                error!(error = %e, "health loop iteration failed");
            }
        }
        debug!("health loop exiting");
    }

    /// One reconciliation sweep over every wrapper.
    ///
    /// The coordination mutex serializes this sweep's bookkeeping against the
    /// dispatch loop's, but per §5 it is never held across a remote call —
    /// each wrapper's snapshot and status writes are guarded individually so
    /// a slow host can't stall the other loop (§5, "Shared-resource policy").
    pub async fn run_once(&self) -> RegistryResult<()> {
        let wrappers = {
            let _guard = self.coordination.lock().await;
            self.store.list_wrappers()?
        };
        for wrapper in wrappers {
            self.reconcile_wrapper(wrapper).await;
        }
        Ok(())
    }

    async fn reconcile_wrapper(&self, wrapper: Wrapper) {
        match wrapper.status {
            WrapperStatus::Failure => self.handle_restart(&wrapper).await,
            WrapperStatus::NotInstalled => self.handle_install(&wrapper).await,
            status if !status.is_pollable() => {
                debug!(wrapper_id = wrapper.id, status = %status, "skipping non-pollable wrapper");
            }
            _ => self.handle_poll(&wrapper).await,
        }
    }

    /// `failure --(H:observes failure)--> restarting --(R:ok)--> not_ready | --(R:fail)--> unresponsive`.
    async fn handle_restart(&self, wrapper: &Wrapper) {
        if !self.mark(wrapper.id, WrapperStatus::Restarting).await {
            return;
        }
        let outcome = tokio::time::timeout(RESTART_TIMEOUT, self.adapter.restart(&wrapper.address, &wrapper.username, &wrapper.password)).await;
        let next = match outcome {
            Ok(Ok(ProvisionOutcome::Ok)) => WrapperStatus::NotReady,
            Ok(Ok(ProvisionOutcome::Failure)) => {
                warn!(wrapper_id = wrapper.id, "restart reported failure");
                WrapperStatus::Unresponsive
            }
            Ok(Err(e)) => {
                warn!(wrapper_id = wrapper.id, error = %e, "restart call failed");
                WrapperStatus::Unresponsive
            }
            Err(_) => {
                warn!(wrapper_id = wrapper.id, "restart timed out");
                WrapperStatus::Unresponsive
            }
        };
        self.mark(wrapper.id, next).await;
    }

    /// `not_installed --(H:install start)--> installing --(R:ok)--> not_ready | --(R:fail)--> unresponsive`.
    async fn handle_install(&self, wrapper: &Wrapper) {
        if !self.mark(wrapper.id, WrapperStatus::Installing).await {
            return;
        }
        let outcome = tokio::time::timeout(INSTALL_TIMEOUT, self.adapter.install(&wrapper.address, &wrapper.username, &wrapper.password)).await;
        let next = match outcome {
            Ok(Ok(ProvisionOutcome::Ok)) => WrapperStatus::NotReady,
            Ok(Ok(ProvisionOutcome::Failure)) => {
                warn!(wrapper_id = wrapper.id, "install reported failure");
                WrapperStatus::Unresponsive
            }
            Ok(Err(e)) => {
                warn!(wrapper_id = wrapper.id, error = %e, "install call failed");
                WrapperStatus::Unresponsive
            }
            Err(_) => {
                warn!(wrapper_id = wrapper.id, "install timed out");
                WrapperStatus::Unresponsive
            }
        };
        self.mark(wrapper.id, next).await;
    }

    /// `not_ready --(H:poll)--> idle | ready | prompting | failure (per remote)`.
    async fn handle_poll(&self, wrapper: &Wrapper) {
        let outcome = tokio::time::timeout(POLL_TIMEOUT, self.adapter.status(&wrapper.address)).await;
        let next = match outcome {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                warn!(wrapper_id = wrapper.id, error = %e, "status poll failed");
                WrapperStatus::Unresponsive
            }
            Err(_) => {
                warn!(wrapper_id = wrapper.id, "status poll timed out");
                WrapperStatus::Unresponsive
            }
        };
        self.mark(wrapper.id, next).await;
    }

    /// Persists a status transition under the coordination lock, scoped to
    /// just this write so the lock never spans a remote call (§5).
    async fn mark(&self, wrapper_id: i64, status: WrapperStatus) -> bool {
        let _guard = self.coordination.lock().await;
        match self.store.set_wrapper_status(wrapper_id, status) {
            Ok(()) => true,
            Err(e) => {
                error!(wrapper_id, error = %e, "failed to persist wrapper status");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::fake::FakeWorkerAdapter;

    fn health_loop(store: Arc<Store>, adapter: Arc<FakeWorkerAdapter>) -> HealthLoop {
        HealthLoop::new(store, adapter, Arc::new(AsyncMutex::new(())), Arc::new(AtomicBool::new(false)), Arc::new(Notify::new()))
    }

    #[tokio::test]
    async fn failure_wrapper_triggers_restart_and_becomes_not_ready() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let id = store.add_wrapper("llama", "10.0.0.1", "root", "pw", WrapperStatus::Failure).unwrap();
        let adapter = Arc::new(FakeWorkerAdapter::new());
        adapter.queue_restart("10.0.0.1", Ok(ProvisionOutcome::Ok));

        health_loop(store.clone(), adapter.clone()).run_once().await.unwrap();

        assert_eq!(adapter.call_count("restart", "10.0.0.1"), 1);
        assert_eq!(store.get_wrapper_by_id(id).unwrap().unwrap().status, WrapperStatus::NotReady);
    }

    #[tokio::test]
    async fn failed_restart_becomes_unresponsive() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let id = store.add_wrapper("llama", "10.0.0.1", "root", "pw", WrapperStatus::Failure).unwrap();
        let adapter = Arc::new(FakeWorkerAdapter::new());
        adapter.queue_restart("10.0.0.1", Ok(ProvisionOutcome::Failure));

        health_loop(store.clone(), adapter.clone()).run_once().await.unwrap();

        assert_eq!(store.get_wrapper_by_id(id).unwrap().unwrap().status, WrapperStatus::Unresponsive);
    }

    #[tokio::test]
    async fn not_installed_wrapper_triggers_install_and_becomes_not_ready() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let id = store.add_wrapper("llama", "10.0.0.1", "root", "pw", WrapperStatus::NotInstalled).unwrap();
        let adapter = Arc::new(FakeWorkerAdapter::new());
        adapter.queue_install("10.0.0.1", Ok(ProvisionOutcome::Ok));

        health_loop(store.clone(), adapter.clone()).run_once().await.unwrap();

        assert_eq!(adapter.call_count("install", "10.0.0.1"), 1);
        assert_eq!(store.get_wrapper_by_id(id).unwrap().unwrap().status, WrapperStatus::NotReady);
    }

    #[tokio::test]
    async fn failed_install_becomes_unresponsive() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let id = store.add_wrapper("llama", "10.0.0.1", "root", "pw", WrapperStatus::NotInstalled).unwrap();
        let adapter = Arc::new(FakeWorkerAdapter::new());
        adapter.queue_install("10.0.0.1", Ok(ProvisionOutcome::Failure));

        health_loop(store.clone(), adapter.clone()).run_once().await.unwrap();

        assert_eq!(store.get_wrapper_by_id(id).unwrap().unwrap().status, WrapperStatus::Unresponsive);
    }

    #[tokio::test]
    async fn pollable_wrapper_status_is_overwritten() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let id = store.add_wrapper("llama", "10.0.0.1", "root", "pw", WrapperStatus::Ready).unwrap();
        let adapter = Arc::new(FakeWorkerAdapter::new());
        adapter.queue_status("10.0.0.1", Ok(WrapperStatus::NotReady));

        health_loop(store.clone(), adapter.clone()).run_once().await.unwrap();

        assert_eq!(adapter.call_count("status", "10.0.0.1"), 1);
        assert_eq!(store.get_wrapper_by_id(id).unwrap().unwrap().status, WrapperStatus::NotReady);
    }

    #[tokio::test]
    async fn non_pollable_wrapper_is_skipped() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.add_wrapper("llama", "10.0.0.1", "root", "pw", WrapperStatus::Deploying).unwrap();
        let adapter = Arc::new(FakeWorkerAdapter::new());

        health_loop(store.clone(), adapter.clone()).run_once().await.unwrap();

        assert_eq!(adapter.call_count("status", "10.0.0.1"), 0);
        assert_eq!(adapter.call_count("restart", "10.0.0.1"), 0);
        assert_eq!(adapter.call_count("install", "10.0.0.1"), 0);
    }

    #[tokio::test]
    async fn unreachable_wrapper_becomes_unresponsive() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let id = store.add_wrapper("llama", "10.0.0.1", "root", "pw", WrapperStatus::Idle).unwrap();
        let adapter = Arc::new(FakeWorkerAdapter::new());
        adapter.queue_status("10.0.0.1", Err(crate::worker::AdapterError("refused".to_string())));

        health_loop(store.clone(), adapter.clone()).run_once().await.unwrap();

        assert_eq!(store.get_wrapper_by_id(id).unwrap().unwrap().status, WrapperStatus::Unresponsive);
    }
}
