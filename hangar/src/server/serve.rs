//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::HangarError;
use crate::server::handlers::{
    create_deployment, delete_credential, deployment_action, get_credential, get_deployment,
    health_handler, list_credentials, list_deployments, upsert_credential, version_handler,
};
use crate::server::socket::socket_handler;
use crate::server::state::ServerState;

/// Build the application router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Deployments
        .route("/deployments", get(list_deployments).post(create_deployment))
        .route("/deployments/{id}", get(get_deployment).post(deployment_action))
        // Credentials
        .route("/credentials", get(list_credentials).post(upsert_credential))
        .route(
            "/credentials/{name}",
            get(get_credential).delete(delete_credential),
        )
        // Push channel
        .route("/ws", get(socket_handler))
        // State and middleware
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), HangarError>>, HangarError> {
    let sockets = state.shutdown.clone();
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| HangarError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal.await;
                sockets.cancel();
            })
            .await
            .map_err(|e| HangarError::ServerError(e.to_string()))
    });

    Ok(handle)
}
