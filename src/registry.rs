//! Process-wide wiring (§9 design note c): owns the store, the worker
//! adapter, and both control loops, and hands out the coordination/shutdown
//! primitives they share.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::RequestApi;
use crate::dispatch::DispatchLoop;
use crate::health::HealthLoop;
use crate::store::Store;
use crate::worker::WorkerAdapter;

const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the long-lived pieces of the registry process: the store, the two
/// control loops, and the handles needed to stop them cleanly.
pub struct Registry {
    pub store: Arc<Store>,
    pub request_api: Arc<RequestApi>,
    shutdown: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
    health_handle: JoinHandle<()>,
    dispatch_handle: JoinHandle<()>,
}

impl Registry {
    /// Build the registry and spawn both control loops. A single
    /// `tokio::sync::Mutex<()>` serializes each loop's full iteration body
    /// against the other's (§5); it is never held across a remote call.
    pub fn spawn(store: Arc<Store>, adapter: Arc<dyn WorkerAdapter>) -> Self {
        let coordination = Arc::new(tokio::sync::Mutex::new(()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_notify = Arc::new(Notify::new());
        let work_notify = Arc::new(Notify::new());

        let health = HealthLoop::new(store.clone(), adapter.clone(), coordination.clone(), shutdown.clone(), shutdown_notify.clone());
        let dispatch = DispatchLoop::new(store.clone(), adapter, coordination, shutdown.clone(), shutdown_notify.clone(), work_notify.clone());

        let health_handle = tokio::spawn(async move { health.run().await });
        let dispatch_handle = tokio::spawn(async move { dispatch.run().await });

        let request_api = Arc::new(RequestApi::new(store.clone(), work_notify));

        Self { store, request_api, shutdown, shutdown_notify, health_handle, dispatch_handle }
    }

    /// Flip the shutdown flag, wake both loops, and wait (bounded) for them
    /// to exit their current iteration and return.
    pub async fn shutdown(self) {
        info!("registry shutting down");
        self.shutdown.store(true, Ordering::Relaxed);
        self.shutdown_notify.notify_waiters();

        let joined = tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, async {
            let _ = self.health_handle.await;
            let _ = self.dispatch_handle.await;
        })
        .await;

        if joined.is_err() {
            warn!("control loops did not exit within the shutdown timeout");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::fake::FakeWorkerAdapter;

    #[tokio::test]
    async fn spawn_and_shutdown_round_trips() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let adapter: Arc<dyn WorkerAdapter> = Arc::new(FakeWorkerAdapter::new());
        let registry = Registry::spawn(store, adapter);
        registry.shutdown().await;
    }
}
