//! Deployment cache
//!
//! Local copy of the deployments a client has fetched or been pushed. Entries
//! only move forward: a snapshot with a revision at or below the cached one is
//! ignored, so a slow fetch can never overwrite a newer pushed update.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::models::deployment::Deployment;

/// Resource query a cache entry answers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    AllDeployments,
    Deployment(String),
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::AllDeployments => f.write_str("deployments:all"),
            ResourceKey::Deployment(id) => write!(f, "deployment:{}", id),
        }
    }
}

#[derive(Default)]
struct Entries {
    deployments: HashMap<String, Deployment>,
    order: Vec<String>,
    refreshed_at: HashMap<ResourceKey, DateTime<Utc>>,
}

impl Entries {
    fn upsert(&mut self, deployment: Deployment) -> bool {
        match self.deployments.get(&deployment.id) {
            Some(cached) if cached.revision >= deployment.revision => false,
            Some(_) => {
                self.deployments.insert(deployment.id.clone(), deployment);
                true
            }
            None => {
                self.order.push(deployment.id.clone());
                self.deployments.insert(deployment.id.clone(), deployment);
                true
            }
        }
    }
}

/// In-memory deployment cache
#[derive(Default)]
pub struct DeploymentCache {
    entries: RwLock<Entries>,
}

impl DeploymentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a deployment from cache
    pub fn get(&self, id: &str) -> Option<Deployment> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.deployments.get(id).cloned()
    }

    /// Every cached deployment, in server order
    pub fn list(&self) -> Vec<Deployment> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .order
            .iter()
            .filter_map(|id| entries.deployments.get(id).cloned())
            .collect()
    }

    /// Store a snapshot unless the cache already holds a newer one.
    ///
    /// Returns whether the entry changed.
    pub fn upsert(&self, deployment: Deployment) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.upsert(deployment)
    }

    /// Record a fetched single deployment
    pub fn store_fetched(&self, deployment: Deployment) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .refreshed_at
            .insert(ResourceKey::Deployment(deployment.id.clone()), Utc::now());
        entries.upsert(deployment)
    }

    /// Merge a full listing; returns how many entries changed
    pub fn store_listing(&self, deployments: Vec<Deployment>) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        let listed: Vec<String> = deployments.iter().map(|d| d.id.clone()).collect();
        let changed = deployments
            .into_iter()
            .map(|d| entries.upsert(d))
            .filter(|changed| *changed)
            .count();

        // Server order first, then anything pushed after the listing was taken
        let mut order = listed.clone();
        order.extend(entries.order.iter().filter(|id| !listed.contains(id)).cloned());
        entries.order = order;

        let now = Utc::now();
        entries.refreshed_at.insert(ResourceKey::AllDeployments, now);
        for id in listed {
            entries.refreshed_at.insert(ResourceKey::Deployment(id), now);
        }
        changed
    }

    /// When the query was last answered by a fetch
    pub fn refreshed_at(&self, key: &ResourceKey) -> Option<DateTime<Utc>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.refreshed_at.get(key).copied()
    }

    /// Whether the cache can answer the query
    pub fn contains(&self, key: &ResourceKey) -> bool {
        match key {
            ResourceKey::AllDeployments => self.refreshed_at(key).is_some(),
            ResourceKey::Deployment(id) => self.get(id).is_some(),
        }
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.deployments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
