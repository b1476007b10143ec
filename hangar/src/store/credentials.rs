//! Credential store

use chrono::Utc;
use openapi_client::models::UpsertCredentialRequest;
use openapi_server::models::{CredentialView, Provider};
use secrecy::SecretString;
use tokio::sync::RwLock;
use tracing::info;

use crate::errors::HangarError;
use crate::models::credential::{credential_field_errors, Credential};
use crate::utils::generate_uuid;

/// In-memory credentials, unique by name, oldest first
#[derive(Default)]
pub struct CredentialStore {
    credentials: RwLock<Vec<Credential>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the credential with the request's name
    pub async fn upsert(&self, request: UpsertCredentialRequest) -> Result<CredentialView, HangarError> {
        let errors = credential_field_errors(&request);
        if !errors.is_empty() {
            return Err(HangarError::ValidationError(errors));
        }

        let now = Utc::now();
        let name = request.name.trim().to_string();
        let secrets = request
            .secrets
            .into_iter()
            .map(|(field, value)| (field, SecretString::from(value)))
            .collect();

        let mut credentials = self.credentials.write().await;
        if let Some(existing) = credentials.iter_mut().find(|c| c.name == name) {
            existing.provider = request.provider;
            existing.secrets = secrets;
            existing.updated_at = now;
            info!("Updated credential {}", name);
            return Ok(existing.view());
        }

        let credential = Credential {
            id: generate_uuid(),
            name,
            provider: request.provider,
            secrets,
            created_at: now,
            updated_at: now,
        };
        let view = credential.view();
        info!("Stored credential {} ({})", credential.name, credential.provider);
        credentials.push(credential);
        Ok(view)
    }

    pub async fn list(&self) -> Vec<CredentialView> {
        self.credentials.read().await.iter().map(Credential::view).collect()
    }

    pub async fn get(&self, name: &str) -> Result<CredentialView, HangarError> {
        self.credentials
            .read()
            .await
            .iter()
            .find(|c| c.name == name)
            .map(Credential::view)
            .ok_or_else(|| HangarError::NotFound(format!("Credential {}", name)))
    }

    pub async fn delete(&self, name: &str) -> Result<(), HangarError> {
        let mut credentials = self.credentials.write().await;
        let before = credentials.len();
        credentials.retain(|c| c.name != name);
        if credentials.len() == before {
            return Err(HangarError::NotFound(format!("Credential {}", name)));
        }
        info!("Deleted credential {}", name);
        Ok(())
    }

    /// Provider a stored credential belongs to
    pub async fn provider_of(&self, name: &str) -> Option<Provider> {
        self.credentials
            .read()
            .await
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.provider)
    }
}
