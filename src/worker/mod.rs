//! The Remote Worker Adapter (B, §4.2): a pluggable capability set over a
//! single remote wrapper host, reached over HTTP (deploy/stop/status) and
//! SSH (install/restart).

mod remote;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use remote::RemoteWorkerAdapter;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::WrapperStatus;

/// Transport-level failure: timeout, connection refused, DNS failure, etc.
/// The core folds this into `unresponsive`/`failure` at the call site; it is
/// never surfaced to API clients (§7, `TransientRemote`).
#[derive(Debug, Error, Clone, PartialEq)]
#[error("remote host unreachable: {0}")]
pub struct AdapterError(pub String);

/// Outcome of `deploy(config)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    Ready,
    Failure,
}

/// Outcome of `stop()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    Failure,
}

/// Outcome of `install()` / `restart()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Ok,
    Failure,
}

/// Capability set exposed per wrapper, keyed by `address` (§4.2).
///
/// All operations are blocking from the caller's viewpoint; callers run them
/// in dedicated tasks so the control loops never block on a slow host.
#[async_trait]
pub trait WorkerAdapter: Send + Sync {
    async fn deploy(&self, address: &str, config: &str) -> Result<DeployOutcome, AdapterError>;
    async fn stop(&self, address: &str) -> Result<StopOutcome, AdapterError>;
    async fn status(&self, address: &str) -> Result<WrapperStatus, AdapterError>;
    async fn install(&self, address: &str, username: &str, password: &str) -> Result<ProvisionOutcome, AdapterError>;
    async fn restart(&self, address: &str, username: &str, password: &str) -> Result<ProvisionOutcome, AdapterError>;
}
