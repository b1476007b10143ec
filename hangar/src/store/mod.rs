//! Deployment record store

use async_trait::async_trait;

use crate::errors::HangarError;
use crate::models::deployment::Deployment;

pub mod credentials;
pub mod memory;

pub use credentials::CredentialStore;
pub use memory::InMemoryDeploymentStore;

/// Read-modify-write applied to a single record.
///
/// Returning an error discards every change the closure made.
pub type DeploymentMutation = Box<dyn FnOnce(&mut Deployment) -> Result<(), HangarError> + Send>;

/// Authoritative storage for deployment records
#[async_trait]
pub trait DeploymentRepository: Send + Sync {
    /// Persist a new deployment under its preallocated id
    async fn create(&self, deployment: Deployment) -> Result<Deployment, HangarError>;

    /// Fetch one deployment
    async fn get(&self, id: &str) -> Result<Deployment, HangarError>;

    /// Every deployment, oldest first
    async fn list(&self) -> Result<Vec<Deployment>, HangarError>;

    /// Atomically apply `mutation`; updates to the same id never interleave.
    ///
    /// On success the revision is bumped and the committed record returned.
    async fn update(
        &self,
        id: &str,
        mutation: DeploymentMutation,
    ) -> Result<Deployment, HangarError>;
}
