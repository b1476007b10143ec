//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::HangarError;
use crate::http::client::HttpClient;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::sync::{DeploymentSync, SocketTransport};
use crate::workers::sync;

/// Run the Hangar server
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), HangarError> {
    info!("Initializing Hangar...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    let app_state = Arc::new(AppState::init(&options));
    shutdown_manager.with_app_state(app_state.clone())?;

    if let Err(e) = init_server(
        &options,
        app_state,
        &mut shutdown_manager,
        shutdown_tx.subscribe(),
    )
    .await
    {
        error!("Failed to start Hangar: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

/// Follow the deployments of a remote server and log every change
pub async fn watch(
    base_url: &str,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), HangarError> {
    info!("Watching deployments on {}", base_url);

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    let client = Arc::new(HttpClient::new(base_url)?);
    let transport = SocketTransport::from_base_url(base_url)?;
    let deployment_sync = Arc::new(DeploymentSync::new(client));

    init_sync_worker(
        options.sync_worker.clone(),
        deployment_sync.clone(),
        transport,
        &mut shutdown_manager,
        shutdown_tx.subscribe(),
    )?;

    let reporter_handle = tokio::spawn(report_changes(deployment_sync, shutdown_tx.subscribe()));
    shutdown_manager.with_reporter_handle(reporter_handle)?;

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), HangarError> {
    info!("Initializing HTTP server...");

    let server_state = ServerState::new(
        app_state.orchestrator.clone(),
        app_state.credentials.clone(),
        app_state.bus.clone(),
    );

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_server_handle(server_handle)?;
    Ok(())
}

fn init_sync_worker(
    options: sync::Options,
    deployment_sync: Arc<DeploymentSync>,
    transport: SocketTransport,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), HangarError> {
    info!("Initializing sync worker...");

    let sync_handle = tokio::spawn(async move {
        sync::run(
            &options,
            deployment_sync.as_ref(),
            &transport,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_sync_worker_handle(sync_handle)
}

async fn report_changes(
    deployment_sync: Arc<DeploymentSync>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut changes = deployment_sync.subscribe_changes();
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => return,
            Ok(()) = changes.changed() => {
                changes.borrow_and_update();
                for deployment in deployment_sync.deployments() {
                    let step = deployment
                        .active_step()
                        .map(|index| deployment.steps[index].name.as_str())
                        .unwrap_or("-");
                    info!(
                        "{} {:<12} step={} revision={}{}",
                        deployment.id,
                        deployment.status.as_str(),
                        step,
                        deployment.revision,
                        deployment
                            .error
                            .as_deref()
                            .map(|e| format!(" error={}", e))
                            .unwrap_or_default()
                    );
                }
            }
        }
    }
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    server_handle: Option<JoinHandle<Result<(), HangarError>>>,
    sync_worker_handle: Option<JoinHandle<()>>,
    reporter_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            server_handle: None,
            sync_worker_handle: None,
            reporter_handle: None,
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), HangarError> {
        if self.app_state.is_some() {
            return Err(HangarError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), HangarError>>,
    ) -> Result<(), HangarError> {
        if self.server_handle.is_some() {
            return Err(HangarError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    pub fn with_sync_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), HangarError> {
        if self.sync_worker_handle.is_some() {
            return Err(HangarError::ShutdownError("sync_worker_handle already set".to_string()));
        }
        self.sync_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_reporter_handle(&mut self, handle: JoinHandle<()>) -> Result<(), HangarError> {
        if self.reporter_handle.is_some() {
            return Err(HangarError::ShutdownError("reporter_handle already set".to_string()));
        }
        self.reporter_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), HangarError> {
        let _ = self.shutdown_tx.send(());

        let max_delay = self.lifecycle_options.max_shutdown_delay;
        match tokio::time::timeout(max_delay, self.shutdown_impl()).await {
            Ok(result) => result,
            Err(_) => {
                error!("Shutdown timed out after {:?}", max_delay);
                Err(HangarError::ShutdownError(format!(
                    "timed out after {:?}",
                    max_delay
                )))
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), HangarError> {
        info!("Shutting down Hangar...");

        // 1. Sync worker
        if let Some(handle) = self.sync_worker_handle.take() {
            handle.await.map_err(|e| HangarError::ShutdownError(e.to_string()))?;
        }

        // 2. Change reporter
        if let Some(handle) = self.reporter_handle.take() {
            handle.await.map_err(|e| HangarError::ShutdownError(e.to_string()))?;
        }

        // 3. HTTP server
        if let Some(handle) = self.server_handle.take() {
            handle.await.map_err(|e| HangarError::ShutdownError(e.to_string()))??;
        }

        // 4. Pipelines
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown().await;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
