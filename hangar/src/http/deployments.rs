//! Deployment API client

use openapi_client::models::{CreateDeploymentRequest, DeploymentAction, DeploymentActionRequest};
use openapi_server::models::{Acknowledged, Deployment};

use crate::errors::HangarError;
use crate::http::client::HttpClient;

impl HttpClient {
    pub async fn list_deployments(&self) -> Result<Vec<Deployment>, HangarError> {
        self.get("/deployments").await
    }

    pub async fn get_deployment(&self, id: &str) -> Result<Deployment, HangarError> {
        self.get(&format!("/deployments/{}", id)).await
    }

    pub async fn create_deployment(
        &self,
        request: &CreateDeploymentRequest,
    ) -> Result<Deployment, HangarError> {
        self.post("/deployments", request).await
    }

    /// Cancel or terminate a deployment
    pub async fn deployment_action(
        &self,
        id: &str,
        action: DeploymentAction,
    ) -> Result<(), HangarError> {
        let _: Acknowledged = self
            .post(&format!("/deployments/{}", id), &DeploymentActionRequest { action })
            .await?;
        Ok(())
    }
}
