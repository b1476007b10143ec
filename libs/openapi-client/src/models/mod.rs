//! API request models

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use openapi_server::models::Provider;

/// Deployment creation request body
pub use openapi_server::models::DeploymentTarget as CreateDeploymentRequest;

/// Action on an existing deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentAction {
    Cancel,
    Terminate,
}

/// `POST /deployments/{id}` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentActionRequest {
    pub action: DeploymentAction,
}

/// `POST /credentials` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertCredentialRequest {
    pub name: String,
    pub provider: Provider,
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
}

/// Field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
    pub details: Option<serde_json::Value>,
}
