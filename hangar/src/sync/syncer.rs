//! Deployment synchronization

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::deployment::DeploymentCache;
use crate::errors::HangarError;
use crate::events::{Event, Topic};
use crate::models::deployment::{Deployment, DeploymentTarget};
use crate::sync::source::DeploymentSource;

/// How the cache is currently kept fresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Events arrive over a push connection
    Push,
    /// Periodic full re-fetch
    Poll,
}

/// Result of a mutation plus the outcome of the refresh that followed it
#[derive(Debug)]
pub struct Mutation<T> {
    pub value: T,

    /// Set when the mutation succeeded but the cache could not be refreshed
    pub refresh_error: Option<HangarError>,
}

/// Client-side view of the deployments on a source
pub struct DeploymentSync {
    source: Arc<dyn DeploymentSource>,
    cache: DeploymentCache,
    mode: watch::Sender<SyncMode>,
    tracked: watch::Sender<BTreeSet<String>>,
    changes: watch::Sender<u64>,
}

impl DeploymentSync {
    pub fn new(source: Arc<dyn DeploymentSource>) -> Self {
        Self {
            source,
            cache: DeploymentCache::new(),
            mode: watch::Sender::new(SyncMode::Poll),
            tracked: watch::Sender::new(BTreeSet::new()),
            changes: watch::Sender::new(0),
        }
    }

    pub fn cache(&self) -> &DeploymentCache {
        &self.cache
    }

    // ================================== MODE ==================================== //

    pub fn mode(&self) -> SyncMode {
        *self.mode.borrow()
    }

    pub fn subscribe_mode(&self) -> watch::Receiver<SyncMode> {
        self.mode.subscribe()
    }

    pub fn set_mode(&self, mode: SyncMode) {
        let changed = self.mode.send_if_modified(|current| {
            if *current == mode {
                return false;
            }
            *current = mode;
            true
        });
        if changed {
            info!("Sync mode is now {:?}", mode);
        }
    }

    /// Ticks every time the cache changes
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify(&self, changed: bool) -> bool {
        if changed {
            self.changes.send_modify(|version| *version += 1);
        }
        changed
    }

    // ================================ TRACKING ================================== //

    /// Follow a single deployment's topic while pushed
    pub fn track(&self, id: impl Into<String>) {
        let id = id.into();
        self.tracked.send_if_modified(|tracked| tracked.insert(id));
    }

    pub fn untrack(&self, id: &str) {
        self.tracked.send_if_modified(|tracked| tracked.remove(id));
    }

    pub fn subscribe_tracked(&self) -> watch::Receiver<BTreeSet<String>> {
        self.tracked.subscribe()
    }

    /// Topics a push connection should be joined to
    pub fn topics(&self) -> Vec<Topic> {
        std::iter::once(Topic::Global)
            .chain(self.tracked.borrow().iter().map(Topic::deployment))
            .collect()
    }

    // ================================== READS =================================== //

    /// Cached deployments, in server order
    pub fn deployments(&self) -> Vec<Deployment> {
        self.cache.list()
    }

    pub fn deployment(&self, id: &str) -> Option<Deployment> {
        self.cache.get(id)
    }

    /// Re-fetch every deployment; returns how many cache entries changed
    pub async fn refresh_all(&self) -> Result<usize, HangarError> {
        let deployments = self.source.list().await?;
        let changed = self.cache.store_listing(deployments);
        self.notify(changed > 0);
        debug!("Refreshed deployments, {} changed", changed);
        Ok(changed)
    }

    /// Re-fetch one deployment
    pub async fn refresh(&self, id: &str) -> Result<Deployment, HangarError> {
        let deployment = self.source.get(id).await?;
        let changed = self.cache.store_fetched(deployment.clone());
        self.notify(changed);
        Ok(self.cache.get(id).unwrap_or(deployment))
    }

    /// Apply a pushed event; returns whether the cache changed
    pub fn apply_event(&self, event: &Event) -> bool {
        match serde_json::from_value::<Deployment>(event.payload.clone()) {
            Ok(deployment) => {
                debug!(
                    "{:?} on {} for {} (revision {})",
                    event.event_type, event.topic, deployment.id, deployment.revision
                );
                self.notify(self.cache.upsert(deployment))
            }
            Err(e) => {
                warn!("Ignoring {:?} event on {}: {}", event.event_type, event.topic, e);
                false
            }
        }
    }

    // ================================ MUTATIONS ================================= //

    pub async fn create(
        &self,
        target: DeploymentTarget,
    ) -> Result<Mutation<Deployment>, HangarError> {
        let deployment = self.source.create(target).await?;
        self.notify(self.cache.upsert(deployment.clone()));

        let refresh_error = self.refresh_all().await.err();
        Ok(self.mutation(deployment, refresh_error))
    }

    pub async fn cancel(&self, id: &str) -> Result<Mutation<()>, HangarError> {
        self.source.cancel(id).await?;
        let refresh_error = self.refresh(id).await.err();
        Ok(self.mutation((), refresh_error))
    }

    pub async fn terminate(&self, id: &str) -> Result<Mutation<()>, HangarError> {
        self.source.terminate(id).await?;
        let refresh_error = self.refresh(id).await.err();
        Ok(self.mutation((), refresh_error))
    }

    fn mutation<T>(&self, value: T, refresh_error: Option<HangarError>) -> Mutation<T> {
        if let Some(e) = &refresh_error {
            warn!("Refresh after mutation failed: {}", e);
        }
        Mutation {
            value,
            refresh_error,
        }
    }
}
