//! Cloud provider credentials

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use openapi_client::models::{FieldError, UpsertCredentialRequest};
use openapi_server::models::{CredentialView, Provider, MASKED_SECRET};
use secrecy::SecretString;

/// A stored credential; secret values never leave the process unmasked
#[derive(Debug)]
pub struct Credential {
    pub id: String,
    pub name: String,
    pub provider: Provider,
    pub secrets: BTreeMap<String, SecretString>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Outbound view with every secret replaced by the placeholder
    pub fn view(&self) -> CredentialView {
        CredentialView {
            id: self.id.clone(),
            name: self.name.clone(),
            provider: self.provider,
            secrets: self
                .secrets
                .keys()
                .map(|k| (k.clone(), MASKED_SECRET.to_string()))
                .collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Secret fields each provider requires
pub fn required_secret_fields(provider: Provider) -> &'static [&'static str] {
    match provider {
        Provider::Aws => &["access_key_id", "secret_access_key"],
        Provider::Gcp => &["service_account_key"],
        Provider::Azure => &["client_id", "client_secret", "tenant_id"],
        Provider::DigitalOcean => &["api_token"],
    }
}

/// Field-level problems with an upsert request
pub fn credential_field_errors(request: &UpsertCredentialRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if request.name.trim().is_empty() {
        errors.push(FieldError::new("name", "Credential name is required"));
    }

    for field in required_secret_fields(request.provider) {
        match request.secrets.get(*field) {
            Some(value) if !value.trim().is_empty() => {}
            _ => errors.push(FieldError::new(
                format!("secrets.{}", field),
                format!("{} is required for {}", field, request.provider),
            )),
        }
    }

    errors
}
