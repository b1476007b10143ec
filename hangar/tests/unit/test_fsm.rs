//! FSM unit tests

use chrono::Utc;
use hangar::deploy::fsm::{steps_consistent, DeploymentFsm, PipelineEvent, CANCELLED_BY_USER};
use hangar::errors::HangarError;
use hangar::models::deployment::{
    Deployment, DeploymentStatus, DeploymentTarget, NetworkIdentifiers, Provider, StepName,
    StepStatus,
};

fn create_test_deployment() -> Deployment {
    let target = DeploymentTarget {
        provider: Provider::DigitalOcean,
        region: "nyc3".to_string(),
        instance_type: "s-2vcpu-4gb".to_string(),
        server_config: serde_json::json!({ "game": "valheim", "slots": 10 }),
        credential: None,
        name: Some("friday-night".to_string()),
    };
    Deployment::new("dep-1".to_string(), target, Utc::now())
}

fn complete(step: StepName) -> PipelineEvent {
    PipelineEvent::StepCompleted {
        step,
        network: (step == StepName::Provision).then(|| NetworkIdentifiers {
            instance_id: "droplet-42".to_string(),
            public_ip: "159.89.1.2".to_string(),
            private_ip: "10.0.0.7".to_string(),
        }),
    }
}

fn fail(step: StepName) -> PipelineEvent {
    PipelineEvent::StepFailed {
        step,
        message: format!("{} exploded", step),
    }
}

/// Every event the pipeline or a user can produce
fn all_events() -> Vec<PipelineEvent> {
    let mut events = vec![
        PipelineEvent::Begin,
        PipelineEvent::Cancel,
        PipelineEvent::Terminate,
    ];
    for step in StepName::ALL {
        events.push(complete(step));
        events.push(fail(step));
    }
    events
}

#[test]
fn test_fsm_full_pipeline() {
    let mut d = create_test_deployment();
    let now = Utc::now();

    d.process(PipelineEvent::Begin, now).unwrap();
    for step in StepName::ALL {
        assert_eq!(d.active_step(), Some(step.index()));
        d.process(complete(step), now).unwrap();
    }

    assert_eq!(d.status, DeploymentStatus::Running);
    assert!(d.steps.iter().all(|s| s.status == StepStatus::Completed));
    assert_eq!(d.network.as_ref().unwrap().instance_id, "droplet-42");
    assert!(d.end_time.is_some());
    assert!(d.error.is_none());

    d.process(PipelineEvent::Terminate, now).unwrap();
    assert_eq!(d.status, DeploymentStatus::Terminated);
}

#[test]
fn test_fsm_cancel_keeps_later_steps_pending() {
    let mut d = create_test_deployment();
    let now = Utc::now();

    d.process(PipelineEvent::Begin, now).unwrap();
    d.process(complete(StepName::Validate), now).unwrap();
    d.process(complete(StepName::Provision), now).unwrap();
    d.process(PipelineEvent::Cancel, now).unwrap();

    assert_eq!(d.status, DeploymentStatus::Failed);
    assert_eq!(d.error.as_deref(), Some(CANCELLED_BY_USER));
    assert_eq!(d.steps[2].status, StepStatus::Failed);
    assert_eq!(d.steps[2].message.as_deref(), Some(CANCELLED_BY_USER));
    assert_eq!(d.steps[3].status, StepStatus::Pending);
    assert_eq!(d.failed_step().unwrap().name, StepName::Configure);
}

#[test]
fn test_fsm_out_of_order_step_rejected() {
    let mut d = create_test_deployment();
    let now = Utc::now();
    d.process(PipelineEvent::Begin, now).unwrap();

    let before = d.clone();
    let result = d.process(complete(StepName::Configure), now);
    assert!(matches!(result, Err(HangarError::InvalidTransition(_))));
    assert_eq!(d, before);
}

#[test]
fn test_fsm_provision_requires_network() {
    let mut d = create_test_deployment();
    let now = Utc::now();
    d.process(PipelineEvent::Begin, now).unwrap();
    d.process(complete(StepName::Validate), now).unwrap();

    let before = d.clone();
    let result = d.process(
        PipelineEvent::StepCompleted {
            step: StepName::Provision,
            network: None,
        },
        now,
    );
    assert!(result.is_err());
    assert_eq!(d, before);
}

#[test]
fn test_fsm_invariants_hold_for_every_event_sequence() {
    let events = all_events();
    let now = Utc::now();

    // Breadth-first over every sequence up to four events long
    let mut frontier = vec![create_test_deployment()];
    for _ in 0..4 {
        let mut next = Vec::new();
        for deployment in &frontier {
            for event in &events {
                let mut candidate = deployment.clone();
                match candidate.process(event.clone(), now) {
                    Ok(()) => {
                        assert!(steps_consistent(&candidate), "{:?}", candidate.steps);
                        assert!(candidate.logs.len() > deployment.logs.len());
                        if candidate.status == DeploymentStatus::Failed {
                            assert!(candidate.error.is_some());
                            assert!(candidate.end_time.is_some());
                        }
                        next.push(candidate);
                    }
                    Err(_) => assert_eq!(&candidate, deployment),
                }
            }
        }
        frontier = next;
    }
}

#[test]
fn test_fsm_final_states_reject_everything() {
    let now = Utc::now();

    let mut failed = create_test_deployment();
    failed.process(PipelineEvent::Begin, now).unwrap();
    failed.process(fail(StepName::Validate), now).unwrap();

    let mut terminated = create_test_deployment();
    terminated.process(PipelineEvent::Begin, now).unwrap();
    for step in StepName::ALL {
        terminated.process(complete(step), now).unwrap();
    }
    terminated.process(PipelineEvent::Terminate, now).unwrap();

    for record in [failed, terminated] {
        for event in all_events() {
            let mut candidate = record.clone();
            assert!(candidate.process(event, now).is_err());
            assert_eq!(candidate, record);
        }
    }
}
