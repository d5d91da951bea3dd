//! Status enumerations for wrappers, requests, and measurements.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Lifecycle status of a remote wrapper host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapperStatus {
    NotInstalled,
    Installing,
    Idle,
    Deploying,
    Ready,
    Prompting,
    Stopping,
    NotReady,
    Restarting,
    Failure,
    Unresponsive,
}

impl WrapperStatus {
    /// States H must never overwrite with a polled value (§4.3).
    pub fn is_pollable(&self) -> bool {
        let pollable = !matches!(
            self,
            Self::Prompting | Self::Stopping | Self::Restarting | Self::Deploying | Self::Installing | Self::Unresponsive
        );
        debug!(status = ?self, pollable, "WrapperStatus::is_pollable");
        pollable
    }

    /// Eligible as a dispatch candidate per §4.5's exclusion list.
    pub fn is_dispatch_candidate(&self) -> bool {
        matches!(self, Self::Idle | Self::Ready)
    }
}

impl std::fmt::Display for WrapperStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotInstalled => "not_installed",
            Self::Installing => "installing",
            Self::Idle => "idle",
            Self::Deploying => "deploying",
            Self::Ready => "ready",
            Self::Prompting => "prompting",
            Self::Stopping => "stopping",
            Self::NotReady => "not_ready",
            Self::Restarting => "restarting",
            Self::Failure => "failure",
            Self::Unresponsive => "unresponsive",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for WrapperStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_installed" => Ok(Self::NotInstalled),
            "installing" => Ok(Self::Installing),
            "idle" => Ok(Self::Idle),
            "deploying" => Ok(Self::Deploying),
            "ready" => Ok(Self::Ready),
            "prompting" => Ok(Self::Prompting),
            "stopping" => Ok(Self::Stopping),
            "not_ready" => Ok(Self::NotReady),
            "restarting" => Ok(Self::Restarting),
            "failure" => Ok(Self::Failure),
            "unresponsive" => Ok(Self::Unresponsive),
            other => Err(format!("unknown wrapper status: {other}")),
        }
    }
}

/// Lifecycle status of a single request (configuration slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Queued,
    Deployed,
    Prompting,
    Completed,
    Failure,
}

impl RequestStatus {
    /// §3 invariant: address is non-null iff status is one of these.
    pub fn requires_address(&self) -> bool {
        matches!(self, Self::Deployed | Self::Prompting | Self::Completed)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Deployed => "deployed",
            Self::Prompting => "prompting",
            Self::Completed => "completed",
            Self::Failure => "failure",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "deployed" => Ok(Self::Deployed),
            "prompting" => Ok(Self::Prompting),
            "completed" => Ok(Self::Completed),
            "failure" => Ok(Self::Failure),
            other => Err(format!("unknown request status: {other}")),
        }
    }
}

/// Lifecycle status of a client-visible measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementStatus {
    DeploymentsPending,
    Prompting,
    Finished,
    Failed,
}

impl std::fmt::Display for MeasurementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::DeploymentsPending => "deployments_pending",
            Self::Prompting => "prompting",
            Self::Finished => "finished",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MeasurementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deployments_pending" => Ok(Self::DeploymentsPending),
            "prompting" => Ok(Self::Prompting),
            "finished" => Ok(Self::Finished),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown measurement status: {other}")),
        }
    }
}
