//! Finite state machine for the deployment pipeline

use chrono::{DateTime, Utc};

use crate::errors::HangarError;
use crate::models::deployment::{
    Deployment, DeploymentLog, DeploymentStatus, NetworkIdentifiers, StepName, StepStatus,
};

/// Reason recorded when a user cancels a deployment
pub const CANCELLED_BY_USER: &str = "cancelled by user";

/// Pipeline event
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Activate the first step
    Begin,

    /// The active step finished; Provision carries the assigned addresses
    StepCompleted {
        step: StepName,
        network: Option<NetworkIdentifiers>,
    },

    /// The active step failed
    StepFailed { step: StepName, message: String },

    /// User cancelled the run
    Cancel,

    /// User terminated a running deployment
    Terminate,
}

impl PipelineEvent {
    fn describe(&self) -> String {
        match self {
            PipelineEvent::Begin => "begin".to_string(),
            PipelineEvent::StepCompleted { step, .. } => format!("complete {}", step),
            PipelineEvent::StepFailed { step, .. } => format!("fail {}", step),
            PipelineEvent::Cancel => "cancel".to_string(),
            PipelineEvent::Terminate => "terminate".to_string(),
        }
    }
}

/// Coarse status while `step` is the active step
pub fn status_for_step(step: StepName) -> DeploymentStatus {
    match step {
        StepName::Validate => DeploymentStatus::Pending,
        StepName::Provision => DeploymentStatus::Provisioning,
        StepName::Configure => DeploymentStatus::Configuring,
        StepName::Start => DeploymentStatus::Starting,
    }
}

/// Zero or one step in progress, sitting right after the completed prefix
pub fn steps_consistent(deployment: &Deployment) -> bool {
    let in_progress = deployment
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::InProgress)
        .count();
    if in_progress > 1 {
        return false;
    }
    match deployment.active_step() {
        Some(index) => deployment.steps[..index]
            .iter()
            .all(|s| s.status == StepStatus::Completed),
        None => true,
    }
}

/// State transitions over a deployment record
pub trait DeploymentFsm {
    /// Apply `event`, or leave the record untouched and report why it does not apply
    fn process(&mut self, event: PipelineEvent, now: DateTime<Utc>) -> Result<(), HangarError>;

    /// Append a timestamped log line
    fn log(&mut self, now: DateTime<Utc>, message: impl Into<String>);
}

impl DeploymentFsm for Deployment {
    fn process(&mut self, event: PipelineEvent, now: DateTime<Utc>) -> Result<(), HangarError> {
        let invalid = |d: &Deployment, event: &PipelineEvent| {
            HangarError::InvalidTransition(format!(
                "cannot {} deployment {} while {}",
                event.describe(),
                d.id,
                d.status
            ))
        };

        match (self.status, &event) {
            // From Pending with nothing started
            (DeploymentStatus::Pending, PipelineEvent::Begin) => {
                if self.steps.iter().any(|s| s.status != StepStatus::Pending) {
                    return Err(invalid(self, &event));
                }
                self.activate(StepName::Validate, now);
                let message = format!(
                    "Validating deployment configuration for {} {}",
                    self.target.provider, self.target.region
                );
                self.log(now, message);
            }

            // Active step finished
            (status, PipelineEvent::StepCompleted { step, network })
                if !status.is_terminal() && self.active_step() == Some(step.index()) =>
            {
                let step = *step;
                if step == StepName::Provision {
                    let Some(network) = network.clone() else {
                        return Err(HangarError::ProviderError(
                            "provisioning returned no network identifiers".to_string(),
                        ));
                    };
                    self.log(
                        now,
                        format!(
                            "Instance {} provisioned (public {}, private {})",
                            network.instance_id, network.public_ip, network.private_ip
                        ),
                    );
                    self.network = Some(network);
                }

                let current = &mut self.steps[step.index()];
                current.status = StepStatus::Completed;
                current.timestamp = Some(now);
                self.log(now, format!("{} completed", step));

                match StepName::ALL.get(step.index() + 1).copied() {
                    Some(next) => {
                        self.activate(next, now);
                        self.status = status_for_step(next);
                        self.log(now, format!("{} started", next));
                    }
                    None => {
                        self.status = DeploymentStatus::Running;
                        self.end_time = Some(now);
                        let address = self
                            .network
                            .as_ref()
                            .map(|n| n.public_ip.clone())
                            .unwrap_or_default();
                        self.log(now, format!("Deployment is running at {}", address));
                    }
                }
            }

            // Active step failed
            (status, PipelineEvent::StepFailed { step, message })
                if !status.is_terminal() && self.active_step() == Some(step.index()) =>
            {
                let current = &mut self.steps[step.index()];
                current.status = StepStatus::Failed;
                current.message = Some(message.clone());
                current.timestamp = Some(now);

                self.status = DeploymentStatus::Failed;
                self.error = Some(message.clone());
                self.end_time = Some(now);
                self.log(now, format!("{} failed: {}", step, message));
            }

            // Cancel anything still in flight; later steps stay pending
            (status, PipelineEvent::Cancel) if !status.is_terminal() => {
                if let Some(index) = self.active_step() {
                    let current = &mut self.steps[index];
                    current.status = StepStatus::Failed;
                    current.message = Some(CANCELLED_BY_USER.to_string());
                    current.timestamp = Some(now);
                }

                self.status = DeploymentStatus::Failed;
                self.error = Some(CANCELLED_BY_USER.to_string());
                self.end_time = Some(now);
                self.log(now, "Deployment cancelled by user");
            }

            // From Running
            (DeploymentStatus::Running, PipelineEvent::Terminate) => {
                self.status = DeploymentStatus::Terminated;
                self.end_time = Some(now);
                self.log(now, "Deployment terminated");
            }

            // Invalid transitions
            _ => return Err(invalid(self, &event)),
        }

        Ok(())
    }

    fn log(&mut self, now: DateTime<Utc>, message: impl Into<String>) {
        self.logs.push(DeploymentLog {
            timestamp: now,
            message: message.into(),
        });
    }
}

trait StepActivation {
    fn activate(&mut self, step: StepName, now: DateTime<Utc>);
}

impl StepActivation for Deployment {
    fn activate(&mut self, step: StepName, now: DateTime<Utc>) {
        let current = &mut self.steps[step.index()];
        current.status = StepStatus::InProgress;
        current.timestamp = Some(now);
    }
}
