//! Authoritative deployment sources

use async_trait::async_trait;
use openapi_client::models::DeploymentAction;

use crate::deploy::Orchestrator;
use crate::errors::HangarError;
use crate::http::client::HttpClient;
use crate::models::deployment::{Deployment, DeploymentTarget};

/// Where a synchronized client reads from and sends mutations to
#[async_trait]
pub trait DeploymentSource: Send + Sync {
    async fn list(&self) -> Result<Vec<Deployment>, HangarError>;

    async fn get(&self, id: &str) -> Result<Deployment, HangarError>;

    async fn create(&self, target: DeploymentTarget) -> Result<Deployment, HangarError>;

    async fn cancel(&self, id: &str) -> Result<(), HangarError>;

    async fn terminate(&self, id: &str) -> Result<(), HangarError>;
}

/// In-process orchestrator
#[async_trait]
impl DeploymentSource for Orchestrator {
    async fn list(&self) -> Result<Vec<Deployment>, HangarError> {
        Orchestrator::list(self).await
    }

    async fn get(&self, id: &str) -> Result<Deployment, HangarError> {
        Orchestrator::get(self, id).await
    }

    async fn create(&self, target: DeploymentTarget) -> Result<Deployment, HangarError> {
        Orchestrator::create(self, target).await
    }

    async fn cancel(&self, id: &str) -> Result<(), HangarError> {
        Orchestrator::cancel(self, id).await.map(|_| ())
    }

    async fn terminate(&self, id: &str) -> Result<(), HangarError> {
        Orchestrator::terminate(self, id).await.map(|_| ())
    }
}

/// Remote server over its HTTP API
#[async_trait]
impl DeploymentSource for HttpClient {
    async fn list(&self) -> Result<Vec<Deployment>, HangarError> {
        self.list_deployments().await
    }

    async fn get(&self, id: &str) -> Result<Deployment, HangarError> {
        self.get_deployment(id).await
    }

    async fn create(&self, target: DeploymentTarget) -> Result<Deployment, HangarError> {
        self.create_deployment(&target).await
    }

    async fn cancel(&self, id: &str) -> Result<(), HangarError> {
        self.deployment_action(id, DeploymentAction::Cancel).await
    }

    async fn terminate(&self, id: &str) -> Result<(), HangarError> {
        self.deployment_action(id, DeploymentAction::Terminate).await
    }
}
