//! Deployment orchestrator
//!
//! Creates deployment records, drives each one through the pipeline on its own
//! task and publishes every committed transition. All writes to a deployment go
//! through its run gate, so pipeline progress and user actions never
//! interleave and events leave in commit order.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::deploy::fsm::{DeploymentFsm, PipelineEvent};
use crate::deploy::provider::{ProviderRegistry, ProvisioningBackend};
use crate::errors::HangarError;
use crate::events::{EventBus, EventType, Topic};
use crate::models::deployment::{
    Deployment, DeploymentStatus, DeploymentTarget, DeploymentTargetExt, NetworkIdentifiers,
    StepName,
};
use crate::store::{CredentialStore, DeploymentRepository};
use crate::utils::generate_uuid;

/// Pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Deadline for a single provider call
    pub step_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(120),
        }
    }
}

/// Per-deployment run state
struct Run {
    cancel: CancellationToken,
    gate: Mutex<()>,
    task: StdMutex<Option<JoinHandle<()>>>,
}

impl Run {
    fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            gate: Mutex::new(()),
            task: StdMutex::new(None),
        }
    }

    fn set_task(&self, handle: JoinHandle<()>) {
        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    fn take_task(&self) -> Option<JoinHandle<()>> {
        self.task.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// Handles shared by the orchestrator and every pipeline task
#[derive(Clone)]
struct Pipeline {
    store: Arc<dyn DeploymentRepository>,
    bus: Arc<EventBus>,
    providers: ProviderRegistry,
    settings: PipelineSettings,
}

/// Deployment orchestrator
pub struct Orchestrator {
    pipeline: Pipeline,
    credentials: Arc<CredentialStore>,
    runs: RwLock<HashMap<String, Arc<Run>>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn DeploymentRepository>,
        bus: Arc<EventBus>,
        credentials: Arc<CredentialStore>,
        providers: ProviderRegistry,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            pipeline: Pipeline {
                store,
                bus,
                providers,
                settings,
            },
            credentials,
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Validate the descriptor, store the deployment and start its pipeline.
    ///
    /// Returns the snapshot with the first step already in progress. The run
    /// gate is held from before the record is visible until `Begin` commits.
    pub async fn create(&self, target: DeploymentTarget) -> Result<Deployment, HangarError> {
        target.validate()?;
        self.check_references(&target).await?;

        let deployment = Deployment::new(generate_uuid(), target, Utc::now());
        let id = deployment.id.clone();

        let run = Arc::new(Run::new());
        let gate = run.gate.lock().await;
        self.runs.write().await.insert(id.clone(), run.clone());

        if let Err(e) = self.pipeline.store.create(deployment).await {
            self.runs.write().await.remove(&id);
            return Err(e);
        }

        let begin = Box::new(|d: &mut Deployment| d.process(PipelineEvent::Begin, Utc::now()));
        let snapshot = self.pipeline.store.update(&id, begin).await?;
        self.pipeline.announce(&snapshot, None);
        drop(gate);

        info!(
            "Created deployment {} ({} {} {})",
            id, snapshot.target.provider, snapshot.target.region, snapshot.target.instance_type
        );

        let handle = tokio::spawn(self.pipeline.clone().run(id, run.clone()));
        run.set_task(handle);

        Ok(snapshot)
    }

    pub async fn get(&self, id: &str) -> Result<Deployment, HangarError> {
        self.pipeline.store.get(id).await
    }

    pub async fn list(&self) -> Result<Vec<Deployment>, HangarError> {
        self.pipeline.store.list().await
    }

    /// Cancel a deployment that has not reached a terminal status
    pub async fn cancel(&self, id: &str) -> Result<Deployment, HangarError> {
        let run = self.run_for(id).await?;
        let deployment = self
            .pipeline
            .transition(&run, id, PipelineEvent::Cancel)
            .await?;
        run.cancel.cancel();
        info!("Deployment {} cancelled by user", id);
        Ok(deployment)
    }

    /// Terminate a running deployment
    pub async fn terminate(&self, id: &str) -> Result<Deployment, HangarError> {
        let run = self.run_for(id).await?;
        let deployment = self
            .pipeline
            .transition(&run, id, PipelineEvent::Terminate)
            .await?;
        info!("Deployment {} terminated", id);
        Ok(deployment)
    }

    /// Wait for a deployment's pipeline task to finish
    pub async fn wait(&self, id: &str) {
        let run = self.runs.read().await.get(id).cloned();
        if let Some(handle) = run.and_then(|r| r.take_task()) {
            if let Err(e) = handle.await {
                warn!("Pipeline task for {} ended abnormally: {}", id, e);
            }
        }
    }

    /// Abort every in-flight pipeline; records keep their last committed state
    pub async fn shutdown(&self) {
        let runs: Vec<(String, Arc<Run>)> = self
            .runs
            .read()
            .await
            .iter()
            .map(|(id, run)| (id.clone(), run.clone()))
            .collect();

        for (id, run) in runs {
            if let Some(handle) = run.take_task() {
                if !handle.is_finished() {
                    debug!("Aborting pipeline for {}", id);
                    handle.abort();
                }
            }
        }
        info!("Orchestrator stopped");
    }

    async fn check_references(&self, target: &DeploymentTarget) -> Result<(), HangarError> {
        if !self.pipeline.providers.supports(target.provider) {
            return Err(HangarError::invalid_field(
                "provider",
                format!("No provisioning backend for {}", target.provider),
            ));
        }

        if let Some(name) = &target.credential {
            match self.credentials.provider_of(name).await {
                None => {
                    return Err(HangarError::invalid_field(
                        "credential",
                        format!("Unknown credential: {}", name),
                    ))
                }
                Some(provider) if provider != target.provider => {
                    return Err(HangarError::invalid_field(
                        "credential",
                        format!(
                            "Credential {} is for {}, not {}",
                            name, provider, target.provider
                        ),
                    ))
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    async fn run_for(&self, id: &str) -> Result<Arc<Run>, HangarError> {
        if let Some(run) = self.runs.read().await.get(id) {
            return Ok(run.clone());
        }

        // Records loaded from an earlier process have no run yet
        self.pipeline.store.get(id).await?;
        let mut runs = self.runs.write().await;
        Ok(runs
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Run::new()))
            .clone())
    }
}

impl Pipeline {
    /// Commit one event under the run gate and publish the result
    async fn transition(
        &self,
        run: &Run,
        id: &str,
        event: PipelineEvent,
    ) -> Result<Deployment, HangarError> {
        let _gate = run.gate.lock().await;

        let previous = self.store.get(id).await?.status;
        let committed = self
            .store
            .update(id, Box::new(move |d: &mut Deployment| d.process(event, Utc::now())))
            .await?;

        self.announce(&committed, Some(previous));
        Ok(committed)
    }

    /// Publish a committed snapshot; `previous` is `None` for a new deployment
    fn announce(&self, deployment: &Deployment, previous: Option<DeploymentStatus>) {
        let payload = match serde_json::to_value(deployment) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize deployment {}: {}", deployment.id, e);
                return;
            }
        };

        let (own, global) = match previous {
            None => (EventType::DeploymentCreated, Some(EventType::DeploymentCreated)),
            Some(status) if status != deployment.status => (
                EventType::DeploymentUpdated,
                Some(EventType::DeploymentStatusChanged),
            ),
            Some(_) => (EventType::DeploymentUpdated, None),
        };

        self.bus
            .publish(Topic::deployment(&deployment.id), own, payload.clone());
        if let Some(event_type) = global {
            self.bus.publish(Topic::Global, event_type, payload);
        }
    }

    async fn run(self, id: String, run: Arc<Run>) {
        debug!("Pipeline started for {}", id);

        for step in StepName::ALL {
            let snapshot = match self.store.get(&id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    error!("Pipeline for {} lost its record: {}", id, e);
                    return;
                }
            };
            if snapshot.status.is_terminal() {
                debug!("Pipeline for {} stopping, deployment is {}", id, snapshot.status);
                return;
            }

            let event = tokio::select! {
                _ = run.cancel.cancelled() => {
                    debug!("Pipeline for {} cancelled during {}", id, step);
                    return;
                }
                event = self.execute_step(step, &snapshot) => event,
            };

            // A cancel may have committed while the provider call was resolving
            if run.cancel.is_cancelled() {
                debug!("Pipeline for {} cancelled before completing {}", id, step);
                return;
            }

            let failed = matches!(event, PipelineEvent::StepFailed { .. });
            match self.transition(&run, &id, event).await {
                Ok(deployment) if failed => {
                    warn!(
                        "Deployment {} failed at {}: {}",
                        id,
                        step,
                        deployment.error.as_deref().unwrap_or("unknown error")
                    );
                    return;
                }
                Ok(deployment) => {
                    info!("Deployment {} completed {} ({})", id, step, deployment.status);
                }
                Err(HangarError::InvalidTransition(reason)) => {
                    debug!("Pipeline for {} superseded: {}", id, reason);
                    return;
                }
                Err(e) => {
                    error!("Failed to record {} for {}: {}", step, id, e);
                    let fallback = PipelineEvent::StepFailed {
                        step,
                        message: e.to_string(),
                    };
                    if let Err(e) = self.transition(&run, &id, fallback).await {
                        error!("Failed to record failure for {}: {}", id, e);
                    }
                    return;
                }
            }
        }

        info!("Pipeline finished for {}", id);
    }

    /// Call the provider for one step and turn the outcome into a pipeline event
    async fn execute_step(&self, step: StepName, deployment: &Deployment) -> PipelineEvent {
        let Some(backend) = self.providers.get(deployment.target.provider) else {
            return PipelineEvent::StepFailed {
                step,
                message: format!("No provisioning backend for {}", deployment.target.provider),
            };
        };

        let call =
            AssertUnwindSafe(call_backend(backend.as_ref(), step, deployment)).catch_unwind();
        match tokio::time::timeout(self.settings.step_timeout, call).await {
            Ok(Ok(Ok(network))) => PipelineEvent::StepCompleted { step, network },
            Ok(Ok(Err(e))) => PipelineEvent::StepFailed {
                step,
                message: e.to_string(),
            },
            Ok(Err(_)) => {
                error!("Provider panicked during {} for {}", step, deployment.id);
                PipelineEvent::StepFailed {
                    step,
                    message: format!("internal error during {}", step),
                }
            }
            Err(_) => PipelineEvent::StepFailed {
                step,
                message: format!(
                    "{} timed out after {}s",
                    step,
                    self.settings.step_timeout.as_secs()
                ),
            },
        }
    }
}

async fn call_backend(
    backend: &dyn ProvisioningBackend,
    step: StepName,
    deployment: &Deployment,
) -> anyhow::Result<Option<NetworkIdentifiers>> {
    match step {
        StepName::Validate => backend.validate(deployment).await.map(|_| None),
        StepName::Provision => backend.provision(deployment).await.map(Some),
        StepName::Configure => backend.configure(deployment).await.map(|_| None),
        StepName::Start => backend.start(deployment).await.map(|_| None),
    }
}
