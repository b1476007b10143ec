//! Provisioning backends

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::deploy::simulated::{SimulatedBackend, SimulatedSettings};
use crate::models::deployment::{Deployment, NetworkIdentifiers, Provider};

/// Cloud provider API driven by the pipeline.
///
/// Every call may be slow and may fail; failures are opaque to the pipeline.
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// Check the descriptor against provider-side constraints
    async fn validate(&self, deployment: &Deployment) -> anyhow::Result<()>;

    /// Create the instance
    async fn provision(&self, deployment: &Deployment) -> anyhow::Result<NetworkIdentifiers>;

    /// Push the game server configuration to the instance
    async fn configure(&self, deployment: &Deployment) -> anyhow::Result<()>;

    /// Start the game server
    async fn start(&self, deployment: &Deployment) -> anyhow::Result<()>;
}

/// Backend per provider
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    backends: HashMap<Provider, Arc<dyn ProvisioningBackend>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated backend for every provider
    pub fn simulated(settings: SimulatedSettings) -> Self {
        let backend: Arc<dyn ProvisioningBackend> = Arc::new(SimulatedBackend::new(settings));
        let mut registry = Self::new();
        for provider in Provider::ALL {
            registry.register(provider, backend.clone());
        }
        registry
    }

    pub fn register(&mut self, provider: Provider, backend: Arc<dyn ProvisioningBackend>) {
        self.backends.insert(provider, backend);
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProvisioningBackend>> {
        self.backends.get(&provider).cloned()
    }

    pub fn supports(&self, provider: Provider) -> bool {
        self.backends.contains_key(&provider)
    }
}
