//! Hangar API models

use serde::{Deserialize, Serialize};

pub mod credential;
pub mod deployment;
pub mod event;
pub mod socket;

pub use credential::{CredentialView, MASKED_SECRET};
pub use deployment::{
    Deployment, DeploymentLog, DeploymentStatus, DeploymentStep, DeploymentTarget,
    NetworkIdentifiers, Provider, StepName, StepStatus,
};
pub use event::{Event, EventType, Topic};
pub use socket::{SocketClientMessage, SocketServerMessage};

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Empty acknowledgement body, serialized as `{}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledged {}
