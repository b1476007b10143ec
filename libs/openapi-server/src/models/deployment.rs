//! Deployment models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cloud provider a deployment targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "aws")]
    Aws,
    #[serde(rename = "gcp")]
    Gcp,
    #[serde(rename = "azure")]
    Azure,
    #[serde(rename = "digitalocean")]
    DigitalOcean,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Aws,
        Provider::Gcp,
        Provider::Azure,
        Provider::DigitalOcean,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Gcp => "gcp",
            Provider::Azure => "azure",
            Provider::DigitalOcean => "digitalocean",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown provider: {}", s))
    }
}

/// Coarse deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Provisioning,
    Configuring,
    Starting,
    Running,
    Failed,
    /// Reserved for stop/resume support
    Stopped,
    Terminated,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Provisioning => "provisioning",
            DeploymentStatus::Configuring => "configuring",
            DeploymentStatus::Starting => "starting",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Stopped => "stopped",
            DeploymentStatus::Terminated => "terminated",
        }
    }

    /// No automated transition leaves this status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Running | DeploymentStatus::Failed | DeploymentStatus::Terminated
        )
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepName {
    Validate,
    Provision,
    Configure,
    Start,
}

impl StepName {
    /// Canonical pipeline order
    pub const ALL: [StepName; 4] = [
        StepName::Validate,
        StepName::Provision,
        StepName::Configure,
        StepName::Start,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Validate => "Validate",
            StepName::Provision => "Provision",
            StepName::Configure => "Configure",
            StepName::Start => "Start",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            StepName::Validate => 0,
            StepName::Provision => 1,
            StepName::Configure => 2,
            StepName::Start => 3,
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// One stage of the deployment pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStep {
    pub name: StepName,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl DeploymentStep {
    pub fn pending(name: StepName) -> Self {
        Self {
            name,
            status: StepStatus::Pending,
            message: None,
            timestamp: None,
        }
    }
}

/// What to deploy and where
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentTarget {
    pub provider: Provider,
    pub region: String,
    pub instance_type: String,

    /// Opaque game server configuration
    #[serde(default = "empty_object")]
    pub server_config: serde_json::Value,

    /// Credential name to provision with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Addresses assigned once the instance is provisioned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIdentifiers {
    pub instance_id: String,
    pub public_ip: String,
    pub private_ip: String,
}

/// Timestamped deployment log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentLog {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Deployment aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,

    /// Incremented on every committed mutation
    pub revision: u64,

    pub status: DeploymentStatus,
    pub target: DeploymentTarget,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkIdentifiers>,

    pub steps: Vec<DeploymentStep>,
    pub logs: Vec<DeploymentLog>,
    pub start_time: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Deployment {
    /// Fresh deployment with every step pending
    pub fn new(id: String, target: DeploymentTarget, now: DateTime<Utc>) -> Self {
        Self {
            id,
            revision: 0,
            status: DeploymentStatus::Pending,
            target,
            network: None,
            steps: StepName::ALL.into_iter().map(DeploymentStep::pending).collect(),
            logs: Vec::new(),
            start_time: now,
            end_time: None,
            error: None,
        }
    }

    /// Index of the step currently in progress
    pub fn active_step(&self) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| s.status == StepStatus::InProgress)
    }

    /// Step that failed, if any
    pub fn failed_step(&self) -> Option<&DeploymentStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }
}
