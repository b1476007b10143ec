//! Simulated cloud provider

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::deploy::provider::ProvisioningBackend;
use crate::models::deployment::{Deployment, NetworkIdentifiers, StepName};

/// Simulated step latency and failure injection
#[derive(Debug, Clone)]
pub struct SimulatedSettings {
    pub validate_latency: Duration,
    pub provision_latency: Duration,
    pub configure_latency: Duration,
    pub start_latency: Duration,

    /// Step that reports failure
    pub fail_at: Option<StepName>,

    /// Error returned by the failing step
    pub failure_message: String,
}

impl Default for SimulatedSettings {
    fn default() -> Self {
        Self {
            validate_latency: Duration::from_secs(2),
            provision_latency: Duration::from_secs(5),
            configure_latency: Duration::from_secs(3),
            start_latency: Duration::from_secs(2),
            fail_at: None,
            failure_message: "simulated provider failure".to_string(),
        }
    }
}

impl SimulatedSettings {
    /// No latency at all
    pub fn instant() -> Self {
        Self {
            validate_latency: Duration::ZERO,
            provision_latency: Duration::ZERO,
            configure_latency: Duration::ZERO,
            start_latency: Duration::ZERO,
            ..Default::default()
        }
    }

    fn latency(&self, step: StepName) -> Duration {
        match step {
            StepName::Validate => self.validate_latency,
            StepName::Provision => self.provision_latency,
            StepName::Configure => self.configure_latency,
            StepName::Start => self.start_latency,
        }
    }
}

/// Backend that sleeps instead of calling a cloud API
pub struct SimulatedBackend {
    settings: SimulatedSettings,
}

impl SimulatedBackend {
    pub fn new(settings: SimulatedSettings) -> Self {
        Self { settings }
    }

    async fn run_step(&self, step: StepName, deployment: &Deployment) -> anyhow::Result<()> {
        debug!("Simulating {} for deployment {}", step, deployment.id);
        tokio::time::sleep(self.settings.latency(step)).await;
        if self.settings.fail_at == Some(step) {
            anyhow::bail!("{}", self.settings.failure_message);
        }
        Ok(())
    }
}

#[async_trait]
impl ProvisioningBackend for SimulatedBackend {
    async fn validate(&self, deployment: &Deployment) -> anyhow::Result<()> {
        self.run_step(StepName::Validate, deployment).await
    }

    async fn provision(&self, deployment: &Deployment) -> anyhow::Result<NetworkIdentifiers> {
        self.run_step(StepName::Provision, deployment).await?;
        Ok(simulated_network())
    }

    async fn configure(&self, deployment: &Deployment) -> anyhow::Result<()> {
        self.run_step(StepName::Configure, deployment).await
    }

    async fn start(&self, deployment: &Deployment) -> anyhow::Result<()> {
        self.run_step(StepName::Start, deployment).await
    }
}

fn simulated_network() -> NetworkIdentifiers {
    let id = uuid::Uuid::new_v4();
    let bytes = id.as_bytes();
    NetworkIdentifiers {
        instance_id: format!("i-{}", &id.simple().to_string()[..17]),
        public_ip: format!(
            "{}.{}.{}.{}",
            3 + bytes[0] % 50,
            bytes[1],
            bytes[2],
            1 + bytes[3] % 254
        ),
        private_ip: format!("10.0.{}.{}", bytes[4], 1 + bytes[5] % 254),
    }
}
