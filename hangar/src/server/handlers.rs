//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use openapi_client::models::{
    CreateDeploymentRequest, DeploymentAction, DeploymentActionRequest, UpsertCredentialRequest,
};
use openapi_server::models::{Acknowledged, HealthResponse, VersionResponse};
use tracing::debug;

use crate::errors::HangarError;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Malformed bodies are reported like any other validation failure
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, HangarError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| HangarError::invalid_field("body", rejection.body_text()))
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "hangar".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

// ================================ DEPLOYMENTS =================================== //

pub async fn list_deployments(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, HangarError> {
    Ok(Json(state.orchestrator.list().await?))
}

pub async fn create_deployment(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<CreateDeploymentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, HangarError> {
    let request = body(payload)?;
    let deployment = state.orchestrator.create(request).await?;
    Ok((StatusCode::CREATED, Json(deployment)))
}

pub async fn get_deployment(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HangarError> {
    Ok(Json(state.orchestrator.get(&id).await?))
}

pub async fn deployment_action(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    payload: Result<Json<DeploymentActionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, HangarError> {
    let request = body(payload)?;
    debug!("Action {:?} requested for deployment {}", request.action, id);

    match request.action {
        DeploymentAction::Cancel => state.orchestrator.cancel(&id).await?,
        DeploymentAction::Terminate => state.orchestrator.terminate(&id).await?,
    };
    Ok(Json(Acknowledged::default()))
}

// ================================ CREDENTIALS =================================== //

pub async fn list_credentials(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.credentials.list().await)
}

pub async fn upsert_credential(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<UpsertCredentialRequest>, JsonRejection>,
) -> Result<impl IntoResponse, HangarError> {
    let request = body(payload)?;
    Ok(Json(state.credentials.upsert(request).await?))
}

pub async fn get_credential(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, HangarError> {
    Ok(Json(state.credentials.get(&name).await?))
}

pub async fn delete_credential(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, HangarError> {
    state.credentials.delete(&name).await?;
    Ok(Json(Acknowledged::default()))
}
