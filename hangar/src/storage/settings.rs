//! Settings file management

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::deploy::{PipelineSettings, SimulatedSettings};
use crate::logs::LogLevel;
use crate::models::deployment::StepName;
use crate::workers::sync;

/// Hangar settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub json_logs: bool,

    /// Also write daily log files under the storage layout
    #[serde(default)]
    pub log_to_file: bool,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Event bus configuration
    #[serde(default)]
    pub event_bus: EventBusSettings,

    /// Pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineFileSettings,

    /// Simulated provider behaviour
    #[serde(default)]
    pub simulation: SimulationSettings,

    /// Sync client configuration
    #[serde(default)]
    pub sync: SyncSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            log_to_file: false,
            server: ServerSettings::default(),
            event_bus: EventBusSettings::default(),
            pipeline: PipelineFileSettings::default(),
            simulation: SimulationSettings::default(),
            sync: SyncSettings::default(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Event bus settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusSettings {
    /// Events queued per subscriber before new ones are dropped
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

fn default_subscriber_buffer() -> usize {
    256
}

impl Default for EventBusSettings {
    fn default() -> Self {
        Self {
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

/// Pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineFileSettings {
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,
}

fn default_step_timeout() -> u64 {
    120
}

impl Default for PipelineFileSettings {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_step_timeout(),
        }
    }
}

impl PipelineFileSettings {
    pub fn to_pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            step_timeout: Duration::from_secs(self.step_timeout_secs),
        }
    }
}

/// Simulated provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    #[serde(default = "default_validate_ms")]
    pub validate_ms: u64,

    #[serde(default = "default_provision_ms")]
    pub provision_ms: u64,

    #[serde(default = "default_configure_ms")]
    pub configure_ms: u64,

    #[serde(default = "default_start_ms")]
    pub start_ms: u64,

    /// Step that always fails
    #[serde(default)]
    pub fail_at: Option<StepName>,

    #[serde(default)]
    pub failure_message: Option<String>,
}

fn default_validate_ms() -> u64 {
    2_000
}

fn default_provision_ms() -> u64 {
    5_000
}

fn default_configure_ms() -> u64 {
    3_000
}

fn default_start_ms() -> u64 {
    2_000
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            validate_ms: default_validate_ms(),
            provision_ms: default_provision_ms(),
            configure_ms: default_configure_ms(),
            start_ms: default_start_ms(),
            fail_at: None,
            failure_message: None,
        }
    }
}

impl SimulationSettings {
    pub fn to_simulated_settings(&self) -> SimulatedSettings {
        let defaults = SimulatedSettings::default();
        SimulatedSettings {
            validate_latency: Duration::from_millis(self.validate_ms),
            provision_latency: Duration::from_millis(self.provision_ms),
            configure_latency: Duration::from_millis(self.configure_ms),
            start_latency: Duration::from_millis(self.start_ms),
            fail_at: self.fail_at,
            failure_message: self
                .failure_message
                .clone()
                .unwrap_or(defaults.failure_message),
        }
    }
}

/// Sync client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "default_push_retry_interval")]
    pub push_retry_interval_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_push_retry_interval() -> u64 {
    120
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_heartbeat_interval() -> u64 {
    30
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            reconnect_delay_secs: default_reconnect_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            push_retry_interval_secs: default_push_retry_interval(),
            connect_timeout_secs: default_connect_timeout(),
            heartbeat_interval_secs: default_heartbeat_interval(),
        }
    }
}

impl SyncSettings {
    pub fn to_worker_options(&self) -> sync::Options {
        sync::Options {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
            max_reconnect_attempts: self.max_reconnect_attempts,
            push_retry_interval: Duration::from_secs(self.push_retry_interval_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
        }
    }
}
