//! In-memory deployment store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::errors::HangarError;
use crate::models::deployment::Deployment;
use crate::store::{DeploymentMutation, DeploymentRepository};

#[derive(Default)]
struct Records {
    by_id: HashMap<String, Arc<Mutex<Deployment>>>,
    order: Vec<String>,
}

/// Process-memory store; each record sits behind its own lock
#[derive(Default)]
pub struct InMemoryDeploymentStore {
    records: RwLock<Records>,
}

impl InMemoryDeploymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, id: &str) -> Result<Arc<Mutex<Deployment>>, HangarError> {
        self.records
            .read()
            .await
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| HangarError::NotFound(format!("Deployment {}", id)))
    }

    /// Number of stored deployments
    pub async fn len(&self) -> usize {
        self.records.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl DeploymentRepository for InMemoryDeploymentStore {
    async fn create(&self, deployment: Deployment) -> Result<Deployment, HangarError> {
        let mut records = self.records.write().await;
        if records.by_id.contains_key(&deployment.id) {
            return Err(HangarError::StorageError(format!(
                "Deployment {} already exists",
                deployment.id
            )));
        }
        records.order.push(deployment.id.clone());
        records.by_id.insert(
            deployment.id.clone(),
            Arc::new(Mutex::new(deployment.clone())),
        );

        debug!("Stored deployment {}", deployment.id);
        Ok(deployment)
    }

    async fn get(&self, id: &str) -> Result<Deployment, HangarError> {
        let record = self.record(id).await?;
        let deployment = record.lock().await.clone();
        Ok(deployment)
    }

    async fn list(&self) -> Result<Vec<Deployment>, HangarError> {
        let records: Vec<Arc<Mutex<Deployment>>> = {
            let records = self.records.read().await;
            records
                .order
                .iter()
                .filter_map(|id| records.by_id.get(id).cloned())
                .collect()
        };

        let mut deployments = Vec::with_capacity(records.len());
        for record in records {
            deployments.push(record.lock().await.clone());
        }
        Ok(deployments)
    }

    async fn update(
        &self,
        id: &str,
        mutation: DeploymentMutation,
    ) -> Result<Deployment, HangarError> {
        let record = self.record(id).await?;
        let mut current = record.lock().await;

        let mut draft = current.clone();
        mutation(&mut draft)?;
        draft.revision = current.revision + 1;
        *current = draft.clone();

        Ok(draft)
    }
}
