//! Cache unit tests

use chrono::Utc;
use hangar::cache::{DeploymentCache, ResourceKey};
use hangar::models::deployment::{Deployment, DeploymentStatus, DeploymentTarget, Provider};

fn create_test_deployment(id: &str, revision: u64, status: DeploymentStatus) -> Deployment {
    let target = DeploymentTarget {
        provider: Provider::Azure,
        region: "westeurope".to_string(),
        instance_type: "Standard_B2s".to_string(),
        server_config: serde_json::json!({}),
        credential: None,
        name: None,
    };
    let mut deployment = Deployment::new(id.to_string(), target, Utc::now());
    deployment.revision = revision;
    deployment.status = status;
    deployment
}

#[test]
fn test_deployment_cache_upsert_and_get() {
    let cache = DeploymentCache::new();
    assert!(cache.is_empty());

    assert!(cache.upsert(create_test_deployment("d1", 1, DeploymentStatus::Pending)));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("d1").unwrap().status, DeploymentStatus::Pending);
    assert!(cache.get("d2").is_none());
}

#[test]
fn test_deployment_cache_only_moves_forward() {
    let cache = DeploymentCache::new();
    cache.upsert(create_test_deployment("d1", 3, DeploymentStatus::Configuring));

    // Same or older revision is ignored
    assert!(!cache.upsert(create_test_deployment("d1", 3, DeploymentStatus::Failed)));
    assert!(!cache.store_fetched(create_test_deployment("d1", 2, DeploymentStatus::Provisioning)));
    assert_eq!(cache.get("d1").unwrap().status, DeploymentStatus::Configuring);

    assert!(cache.upsert(create_test_deployment("d1", 4, DeploymentStatus::Starting)));
    assert_eq!(cache.get("d1").unwrap().revision, 4);
}

#[test]
fn test_deployment_cache_listing_order() {
    let cache = DeploymentCache::new();

    // Pushed before the listing arrives
    cache.upsert(create_test_deployment("pushed", 1, DeploymentStatus::Pending));

    let changed = cache.store_listing(vec![
        create_test_deployment("a", 1, DeploymentStatus::Running),
        create_test_deployment("b", 1, DeploymentStatus::Failed),
    ]);
    assert_eq!(changed, 2);

    let ids: Vec<String> = cache.list().into_iter().map(|d| d.id).collect();
    assert_eq!(ids, vec!["a", "b", "pushed"]);

    // Nothing new in a repeated listing
    let changed = cache.store_listing(vec![
        create_test_deployment("a", 1, DeploymentStatus::Running),
        create_test_deployment("b", 1, DeploymentStatus::Failed),
    ]);
    assert_eq!(changed, 0);
}

#[test]
fn test_deployment_cache_resource_keys() {
    let cache = DeploymentCache::new();
    assert!(!cache.contains(&ResourceKey::AllDeployments));

    cache.store_fetched(create_test_deployment("d1", 1, DeploymentStatus::Pending));
    assert!(cache.contains(&ResourceKey::Deployment("d1".to_string())));
    assert!(cache.refreshed_at(&ResourceKey::Deployment("d1".to_string())).is_some());
    assert!(cache.refreshed_at(&ResourceKey::AllDeployments).is_none());

    cache.store_listing(Vec::new());
    assert!(cache.contains(&ResourceKey::AllDeployments));

    assert_eq!(ResourceKey::AllDeployments.to_string(), "deployments:all");
    assert_eq!(
        ResourceKey::Deployment("d1".to_string()).to_string(),
        "deployment:d1"
    );
}
