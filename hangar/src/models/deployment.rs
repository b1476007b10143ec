//! Deployment models

use openapi_client::models::FieldError;

pub use openapi_server::models::{
    Deployment, DeploymentLog, DeploymentStatus, DeploymentStep, DeploymentTarget,
    NetworkIdentifiers, Provider, StepName, StepStatus,
};

use crate::errors::HangarError;

const MAX_REGION_LEN: usize = 32;
const MAX_NAME_LEN: usize = 64;

/// Request-level checks on a deployment descriptor
pub trait DeploymentTargetExt {
    /// Collect every field-level problem
    fn field_errors(&self) -> Vec<FieldError>;

    /// Reject the descriptor if any field is invalid
    fn validate(&self) -> Result<(), HangarError> {
        let errors = self.field_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(HangarError::ValidationError(errors))
        }
    }
}

impl DeploymentTargetExt for DeploymentTarget {
    fn field_errors(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        let region = self.region.trim();
        if region.is_empty() {
            errors.push(FieldError::new("region", "Region is required"));
        } else if region.len() > MAX_REGION_LEN || !is_valid_region(self.provider, region) {
            errors.push(FieldError::new(
                "region",
                format!("Invalid region for {}: {}", self.provider, region),
            ));
        }

        let instance_type = self.instance_type.trim();
        if instance_type.is_empty() {
            errors.push(FieldError::new("instance_type", "Instance type is required"));
        } else if instance_type.chars().any(char::is_whitespace) {
            errors.push(FieldError::new(
                "instance_type",
                "Instance type must not contain whitespace",
            ));
        }

        if !self.server_config.is_object() {
            errors.push(FieldError::new(
                "server_config",
                "Server configuration must be a JSON object",
            ));
        }

        if let Some(name) = &self.name {
            if name.trim().is_empty() || name.len() > MAX_NAME_LEN {
                errors.push(FieldError::new(
                    "name",
                    format!("Name must be 1 to {} characters", MAX_NAME_LEN),
                ));
            }
        }

        if let Some(credential) = &self.credential {
            if credential.trim().is_empty() {
                errors.push(FieldError::new("credential", "Credential name is empty"));
            }
        }

        errors
    }
}

fn is_valid_region(provider: Provider, region: &str) -> bool {
    match provider {
        // us-east-1, ap-southeast-2, us-gov-west-1
        Provider::Aws => {
            let parts: Vec<&str> = region.split('-').collect();
            parts.len() >= 3
                && parts[0].len() == 2
                && parts[..parts.len() - 1]
                    .iter()
                    .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase()))
                && parts[parts.len() - 1]
                    .chars()
                    .all(|c| c.is_ascii_digit())
                && !parts[parts.len() - 1].is_empty()
        }
        // us-central1, eastus, nyc3
        Provider::Gcp | Provider::Azure | Provider::DigitalOcean => {
            !region.starts_with('-')
                && !region.ends_with('-')
                && region
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        }
    }
}
