//! Credential API client

use openapi_client::models::UpsertCredentialRequest;
use openapi_server::models::{Acknowledged, CredentialView};

use crate::errors::HangarError;
use crate::http::client::HttpClient;

impl HttpClient {
    pub async fn list_credentials(&self) -> Result<Vec<CredentialView>, HangarError> {
        self.get("/credentials").await
    }

    pub async fn get_credential(&self, name: &str) -> Result<CredentialView, HangarError> {
        self.get(&format!("/credentials/{}", name)).await
    }

    pub async fn upsert_credential(
        &self,
        request: &UpsertCredentialRequest,
    ) -> Result<CredentialView, HangarError> {
        self.post("/credentials", request).await
    }

    pub async fn delete_credential(&self, name: &str) -> Result<(), HangarError> {
        let _: Acknowledged = self.delete(&format!("/credentials/{}", name)).await?;
        Ok(())
    }
}
