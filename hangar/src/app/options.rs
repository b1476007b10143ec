//! Application configuration options

use std::time::Duration;

use crate::deploy::{PipelineSettings, SimulatedSettings};
use crate::storage::settings::Settings;
use crate::workers::sync;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// Events queued per bus subscriber
    pub event_bus_capacity: usize,

    /// Pipeline deadlines
    pub pipeline: PipelineSettings,

    /// Simulated provider behaviour
    pub simulation: SimulatedSettings,

    /// Sync worker options, used by `--watch`
    pub sync_worker: sync::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            server: ServerOptions::default(),
            event_bus_capacity: 256,
            pipeline: PipelineSettings::default(),
            simulation: SimulatedSettings::default(),
            sync_worker: sync::Options::default(),
        }
    }
}

impl AppOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            event_bus_capacity: settings.event_bus.subscriber_buffer,
            pipeline: settings.pipeline.to_pipeline_settings(),
            simulation: settings.simulation.to_simulated_settings(),
            sync_worker: settings.sync.to_worker_options(),
            ..Default::default()
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
