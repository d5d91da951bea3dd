//! Deterministic in-memory fake for `WorkerAdapter` (§9 — tests never touch
//! real HTTP/SSH). Per-address response queues are consumed in FIFO order;
//! once a queue runs dry, calls fall back to a benign default so tests only
//! need to script the outcomes they care about.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::WrapperStatus;

use super::{AdapterError, DeployOutcome, ProvisionOutcome, StopOutcome, WorkerAdapter};

type Queue<T> = VecDeque<Result<T, AdapterError>>;

#[derive(Default)]
struct FakeState {
    deploy: HashMap<String, Queue<DeployOutcome>>,
    stop: HashMap<String, Queue<StopOutcome>>,
    status: HashMap<String, Queue<WrapperStatus>>,
    install: HashMap<String, Queue<ProvisionOutcome>>,
    restart: HashMap<String, Queue<ProvisionOutcome>>,
    calls: HashMap<(&'static str, String), usize>,
}

/// A `WorkerAdapter` backed entirely by preset, per-address response queues.
pub struct FakeWorkerAdapter {
    state: Mutex<FakeState>,
}

impl FakeWorkerAdapter {
    pub fn new() -> Self {
        Self { state: Mutex::new(FakeState::default()) }
    }

    pub fn queue_deploy(&self, address: &str, result: Result<DeployOutcome, AdapterError>) {
        self.state.lock().unwrap().deploy.entry(address.to_string()).or_default().push_back(result);
    }

    pub fn queue_stop(&self, address: &str, result: Result<StopOutcome, AdapterError>) {
        self.state.lock().unwrap().stop.entry(address.to_string()).or_default().push_back(result);
    }

    pub fn queue_status(&self, address: &str, result: Result<WrapperStatus, AdapterError>) {
        self.state.lock().unwrap().status.entry(address.to_string()).or_default().push_back(result);
    }

    pub fn queue_install(&self, address: &str, result: Result<ProvisionOutcome, AdapterError>) {
        self.state.lock().unwrap().install.entry(address.to_string()).or_default().push_back(result);
    }

    pub fn queue_restart(&self, address: &str, result: Result<ProvisionOutcome, AdapterError>) {
        self.state.lock().unwrap().restart.entry(address.to_string()).or_default().push_back(result);
    }

    pub fn call_count(&self, op: &'static str, address: &str) -> usize {
        *self.state.lock().unwrap().calls.get(&(op, address.to_string())).unwrap_or(&0)
    }

    fn record(&self, op: &'static str, address: &str) {
        *self.state.lock().unwrap().calls.entry((op, address.to_string())).or_insert(0) += 1;
    }
}

impl Default for FakeWorkerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerAdapter for FakeWorkerAdapter {
    async fn deploy(&self, address: &str, _config: &str) -> Result<DeployOutcome, AdapterError> {
        self.record("deploy", address);
        let mut state = self.state.lock().unwrap();
        Ok(state.deploy.entry(address.to_string()).or_default().pop_front().unwrap_or(Ok(DeployOutcome::Ready))?)
    }

    async fn stop(&self, address: &str) -> Result<StopOutcome, AdapterError> {
        self.record("stop", address);
        let mut state = self.state.lock().unwrap();
        Ok(state.stop.entry(address.to_string()).or_default().pop_front().unwrap_or(Ok(StopOutcome::Stopped))?)
    }

    async fn status(&self, address: &str) -> Result<WrapperStatus, AdapterError> {
        self.record("status", address);
        let mut state = self.state.lock().unwrap();
        Ok(state.status.entry(address.to_string()).or_default().pop_front().unwrap_or(Ok(WrapperStatus::Idle))?)
    }

    async fn install(&self, address: &str, _username: &str, _password: &str) -> Result<ProvisionOutcome, AdapterError> {
        self.record("install", address);
        let mut state = self.state.lock().unwrap();
        Ok(state.install.entry(address.to_string()).or_default().pop_front().unwrap_or(Ok(ProvisionOutcome::Ok))?)
    }

    async fn restart(&self, address: &str, _username: &str, _password: &str) -> Result<ProvisionOutcome, AdapterError> {
        self.record("restart", address);
        let mut state = self.state.lock().unwrap();
        Ok(state.restart.entry(address.to_string()).or_default().pop_front().unwrap_or(Ok(ProvisionOutcome::Ok))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_responses_are_benign() {
        let fake = FakeWorkerAdapter::new();
        assert_eq!(fake.deploy("10.0.0.1", "{}").await.unwrap(), DeployOutcome::Ready);
        assert_eq!(fake.stop("10.0.0.1").await.unwrap(), StopOutcome::Stopped);
        assert_eq!(fake.status("10.0.0.1").await.unwrap(), WrapperStatus::Idle);
    }

    #[tokio::test]
    async fn queued_responses_are_consumed_fifo() {
        let fake = FakeWorkerAdapter::new();
        fake.queue_deploy("10.0.0.1", Ok(DeployOutcome::Failure));
        fake.queue_deploy("10.0.0.1", Ok(DeployOutcome::Ready));

        assert_eq!(fake.deploy("10.0.0.1", "{}").await.unwrap(), DeployOutcome::Failure);
        assert_eq!(fake.deploy("10.0.0.1", "{}").await.unwrap(), DeployOutcome::Ready);
        assert_eq!(fake.call_count("deploy", "10.0.0.1"), 2);
    }

    #[tokio::test]
    async fn unreachable_propagates_as_err() {
        let fake = FakeWorkerAdapter::new();
        fake.queue_status("10.0.0.1", Err(AdapterError("timeout".to_string())));
        assert!(fake.status("10.0.0.1").await.is_err());
    }
}
