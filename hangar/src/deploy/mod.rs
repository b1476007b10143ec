//! Deployment module

pub mod fsm;
pub mod orchestrator;
pub mod provider;
pub mod simulated;

pub use orchestrator::{Orchestrator, PipelineSettings};
pub use provider::{ProviderRegistry, ProvisioningBackend};
pub use simulated::{SimulatedBackend, SimulatedSettings};
