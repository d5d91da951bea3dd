//! HTTP + SSH implementation of `WorkerAdapter` (§4.2, §6).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::key::PublicKey;
use russh::ChannelMsg;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::WrapperStatus;

use super::{AdapterError, DeployOutcome, ProvisionOutcome, StopOutcome, WorkerAdapter};

const SSH_PORT: u16 = 22;

const DEPLOY_TIMEOUT: Duration = Duration::from_secs(300);
const STOP_TIMEOUT: Duration = Duration::from_secs(300);
const STATUS_TIMEOUT: Duration = Duration::from_secs(10);
const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The provisioning script run over SSH by `install()`: package install,
/// repo clone, service file write, enable+start (§6 worker SSH contract). A
/// non-zero exit of any step fails the whole operation.
const INSTALL_STEPS: &[&str] = &[
    "sudo apt-get update -y && sudo apt-get install -y python3 python3-pip",
    "git clone https://github.com/example/llm-wrapper.git /opt/llm-wrapper || (cd /opt/llm-wrapper && git pull)",
    "sudo cp /opt/llm-wrapper/deploy/llm-wrapper.service /etc/systemd/system/llm-wrapper.service",
    "sudo systemctl daemon-reload && sudo systemctl enable llm-wrapper && sudo systemctl start llm-wrapper",
];

const RESTART_STEPS: &[&str] = &["sudo systemctl restart llm-wrapper"];

/// Accepts any host key. These hosts are provisioned dynamically from the
/// `[llm] llm_wrapper_machines` roster, so there is no fixed known_hosts file
/// to check against.
struct TrustingHandler;

#[async_trait]
impl client::Handler for TrustingHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    message: String,
}

/// One shared HTTP client fans out to every wrapper address; SSH sessions
/// are opened per call since install/restart are infrequent.
pub struct RemoteWorkerAdapter {
    client: reqwest::Client,
}

impl RemoteWorkerAdapter {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    async fn run_ssh_steps(&self, address: &str, username: &str, password: &str, steps: &[&str]) -> Result<ProvisionOutcome, AdapterError> {
        let config = Arc::new(client::Config::default());
        let connect = tokio::time::timeout(SSH_CONNECT_TIMEOUT, client::connect(config, (address, SSH_PORT), TrustingHandler)).await;
        let mut session: Handle<TrustingHandler> = match connect {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return Err(AdapterError(format!("ssh connect to {address} failed: {e}"))),
            Err(_) => return Err(AdapterError(format!("ssh connect to {address} timed out"))),
        };

        let authenticated = session
            .authenticate_password(username, password)
            .await
            .map_err(|e| AdapterError(format!("ssh authentication to {address} failed: {e}")))?;
        if !authenticated {
            return Err(AdapterError(format!("ssh authentication to {address} rejected for user {username}")));
        }

        for step in steps {
            debug!(address, step, "running ssh provisioning step");
            match self.run_step(&mut session, address, step).await? {
                Some(0) => {}
                Some(code) => {
                    warn!(address, step, exit_code = code, "provisioning step failed");
                    return Ok(ProvisionOutcome::Failure);
                }
                None => {
                    warn!(address, step, "provisioning step exited without a status");
                    return Ok(ProvisionOutcome::Failure);
                }
            }
        }
        Ok(ProvisionOutcome::Ok)
    }

    async fn run_step(&self, session: &mut Handle<TrustingHandler>, address: &str, step: &str) -> Result<Option<u32>, AdapterError> {
        let mut channel = session.channel_open_session().await.map_err(|e| AdapterError(format!("ssh channel open on {address} failed: {e}")))?;
        channel.exec(true, step.to_string()).await.map_err(|e| AdapterError(format!("ssh exec on {address} failed: {e}")))?;

        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            if let ChannelMsg::ExitStatus { exit_status: status } = msg {
                exit_status = Some(status);
            }
        }
        Ok(exit_status)
    }
}

impl Default for RemoteWorkerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerAdapter for RemoteWorkerAdapter {
    async fn deploy(&self, address: &str, config: &str) -> Result<DeployOutcome, AdapterError> {
        let url = format!("http://{address}:8000/deploy");
        let body: Value = serde_json::from_str(config).unwrap_or_else(|_| Value::String(config.to_string()));
        let response = self
            .client
            .post(&url)
            .json(&body)
            .timeout(DEPLOY_TIMEOUT)
            .send()
            .await
            .map_err(|e| AdapterError(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(DeployOutcome::Failure);
        }
        match response.json::<StatusResponse>().await {
            Ok(parsed) if parsed.status == "ready" => Ok(DeployOutcome::Ready),
            Ok(_) => Ok(DeployOutcome::Failure),
            Err(_) => Ok(DeployOutcome::Failure),
        }
    }

    async fn stop(&self, address: &str) -> Result<StopOutcome, AdapterError> {
        let url = format!("http://{address}:8000/shutdown");
        let response = self.client.post(&url).timeout(STOP_TIMEOUT).send().await.map_err(|e| AdapterError(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(StopOutcome::Failure);
        }
        match response.json::<StatusResponse>().await {
            Ok(parsed) if parsed.status == "stopped" => Ok(StopOutcome::Stopped),
            Ok(_) => Ok(StopOutcome::Failure),
            Err(_) => Ok(StopOutcome::Failure),
        }
    }

    async fn status(&self, address: &str) -> Result<WrapperStatus, AdapterError> {
        let url = format!("http://{address}:8000/get_status");
        let response = self.client.get(&url).timeout(STATUS_TIMEOUT).send().await.map_err(|e| AdapterError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AdapterError(format!("get_status on {address} returned {}", response.status())));
        }
        let parsed: MessageResponse = response.json().await.map_err(|e| AdapterError(e.to_string()))?;
        parsed.message.parse().map_err(AdapterError)
    }

    async fn install(&self, address: &str, username: &str, password: &str) -> Result<ProvisionOutcome, AdapterError> {
        self.run_ssh_steps(address, username, password, INSTALL_STEPS).await
    }

    async fn restart(&self, address: &str, username: &str, password: &str) -> Result<ProvisionOutcome, AdapterError> {
        self.run_ssh_steps(address, username, password, RESTART_STEPS).await
    }
}
