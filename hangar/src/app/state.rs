//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::deploy::{Orchestrator, ProviderRegistry};
use crate::events::EventBus;
use crate::store::{CredentialStore, DeploymentRepository, InMemoryDeploymentStore};

/// Main application state
pub struct AppState {
    /// Topic-based event fan-out
    pub bus: Arc<EventBus>,

    /// Deployment records
    pub store: Arc<dyn DeploymentRepository>,

    /// Provider credentials
    pub credentials: Arc<CredentialStore>,

    /// Pipeline driver
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Initialize application state with the simulated provider
    pub fn init(options: &AppOptions) -> Self {
        Self::with_providers(
            options,
            ProviderRegistry::simulated(options.simulation.clone()),
        )
    }

    pub fn with_providers(options: &AppOptions, providers: ProviderRegistry) -> Self {
        info!("Initializing application state...");

        let bus = Arc::new(EventBus::new(options.event_bus_capacity));
        let store: Arc<dyn DeploymentRepository> = Arc::new(InMemoryDeploymentStore::new());
        let credentials = Arc::new(CredentialStore::new());
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            bus.clone(),
            credentials.clone(),
            providers,
            options.pipeline.clone(),
        ));

        Self {
            bus,
            store,
            credentials,
            orchestrator,
        }
    }

    /// Shutdown application state
    pub async fn shutdown(&self) {
        info!("Shutting down application state...");
        self.orchestrator.shutdown().await;
    }
}
