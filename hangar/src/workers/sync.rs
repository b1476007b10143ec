//! Sync worker
//!
//! Keeps a [`DeploymentSync`] fresh. While a push connection is up the cache
//! follows pushed events and nothing is polled; when it drops the worker falls
//! back to polling and keeps retrying push in the background. Connection
//! attempts and acknowledgements have a deadline and an open connection is
//! pinged, so a stalled endpoint never holds the worker away from polling.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::errors::HangarError;
use crate::events::Topic;
use crate::sync::{DeploymentSync, PushConnection, PushTransport, SyncMode};

/// Sync worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Full re-fetch interval while in poll mode
    pub poll_interval: Duration,

    /// Delay between push connection attempts
    pub reconnect_delay: Duration,

    /// Connection attempts per push round
    pub max_reconnect_attempts: u32,

    /// Time spent polling before the next push round
    pub push_retry_interval: Duration,

    /// Deadline for a connection attempt and for each acknowledgement
    pub connect_timeout: Duration,

    /// Ping interval on an open push connection
    pub heartbeat_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 5,
            push_retry_interval: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl Options {
    /// Poll rounds between two push rounds, at least one
    fn polls_per_push_retry(&self) -> u32 {
        if self.poll_interval.is_zero() {
            return 1;
        }
        let polls = self.push_retry_interval.as_secs_f64() / self.poll_interval.as_secs_f64();
        (polls.ceil() as u32).max(1)
    }
}

enum PushOutcome {
    Disconnected,
    Shutdown,
}

/// Run the sync worker
pub async fn run<S, F>(
    options: &Options,
    sync: &DeploymentSync,
    transport: &dyn PushTransport,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Sync worker starting...");

    // Fill the cache before the first connection round
    tokio::select! {
        _ = &mut shutdown_signal => {
            info!("Sync worker shutting down...");
            return;
        }
        _ = poll_once(sync) => {}
    }

    loop {
        let connection = tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Sync worker shutting down...");
                return;
            }
            connection = connect(options, transport, &sleep_fn) => connection,
        };

        match connection {
            Some(connection) => {
                match follow(options, sync, connection, &mut shutdown_signal).await {
                    PushOutcome::Shutdown => {
                        info!("Sync worker shutting down...");
                        return;
                    }
                    PushOutcome::Disconnected => {
                        warn!("Push connection lost, falling back to polling");
                        sync.set_mode(SyncMode::Poll);
                        poll_once(sync).await;
                    }
                }

                tokio::select! {
                    _ = &mut shutdown_signal => {
                        info!("Sync worker shutting down...");
                        return;
                    }
                    _ = sleep_fn(options.reconnect_delay) => {}
                }
            }
            None => {
                warn!(
                    "Push unavailable after {} attempts, polling every {:?}",
                    options.max_reconnect_attempts, options.poll_interval
                );
                sync.set_mode(SyncMode::Poll);

                for _ in 0..options.polls_per_push_retry() {
                    poll_once(sync).await;
                    tokio::select! {
                        _ = &mut shutdown_signal => {
                            info!("Sync worker shutting down...");
                            return;
                        }
                        _ = sleep_fn(options.poll_interval) => {}
                    }
                }
            }
        }
    }
}

/// One round of bounded connection attempts with a fixed delay between them
async fn connect<S, F>(
    options: &Options,
    transport: &dyn PushTransport,
    sleep_fn: &S,
) -> Option<Box<dyn PushConnection>>
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    let attempts = options.max_reconnect_attempts.max(1);
    for attempt in 1..=attempts {
        match within(options.connect_timeout, transport.connect()).await {
            Ok(connection) => return Some(connection),
            Err(e) => warn!("Push connection attempt {}/{} failed: {}", attempt, attempts, e),
        }
        if attempt < attempts {
            sleep_fn(options.reconnect_delay).await;
        }
    }
    None
}

/// Consume pushed events until the connection drops or shutdown is signalled
async fn follow(
    options: &Options,
    sync: &DeploymentSync,
    mut connection: Box<dyn PushConnection>,
    shutdown_signal: &mut Pin<Box<dyn Future<Output = ()> + Send>>,
) -> PushOutcome {
    let mut tracked_rx = sync.subscribe_tracked();
    let mut joined = tracked_rx.borrow_and_update().clone();

    for topic in sync.topics() {
        if let Err(e) = within(options.connect_timeout, connection.join(topic.clone())).await {
            warn!("Failed to join {}: {}", topic, e);
            return PushOutcome::Disconnected;
        }
    }
    sync.set_mode(SyncMode::Push);

    // Events published before the joins above are never replayed
    if let Err(e) = sync.refresh_all().await {
        error!("Refresh after connecting failed: {}", e);
    }

    let period = options.heartbeat_interval.max(Duration::from_millis(1));
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut *shutdown_signal => return PushOutcome::Shutdown,
            _ = heartbeat.tick() => {
                if let Err(e) = within(options.connect_timeout, connection.ping()).await {
                    warn!("Push connection unresponsive: {}", e);
                    return PushOutcome::Disconnected;
                }
            }
            event = connection.next_event() => match event {
                Some(event) => {
                    sync.apply_event(&event);
                }
                None => return PushOutcome::Disconnected,
            },
            Ok(()) = tracked_rx.changed() => {
                let tracked = tracked_rx.borrow_and_update().clone();
                for id in tracked.difference(&joined) {
                    debug!("Joining deployment {}", id);
                    let join = connection.join(Topic::deployment(id));
                    if within(options.connect_timeout, join).await.is_err() {
                        return PushOutcome::Disconnected;
                    }
                    if let Err(e) = sync.refresh(id).await {
                        warn!("Failed to refresh tracked deployment {}: {}", id, e);
                    }
                }
                for id in joined.difference(&tracked) {
                    debug!("Leaving deployment {}", id);
                    let leave = connection.leave(Topic::deployment(id));
                    if within(options.connect_timeout, leave).await.is_err() {
                        return PushOutcome::Disconnected;
                    }
                }
                joined = tracked;
            }
        }
    }
}

/// Run `call`, failing it once `deadline` passes
async fn within<T>(
    deadline: Duration,
    call: impl Future<Output = Result<T, HangarError>>,
) -> Result<T, HangarError> {
    tokio::time::timeout(deadline, call)
        .await
        .map_err(|_| HangarError::SocketError(format!("no response within {:?}", deadline)))?
}

async fn poll_once(sync: &DeploymentSync) {
    debug!("Polling for deployment updates...");
    if let Err(e) = sync.refresh_all().await {
        error!("Poll failed: {}", e);
    }
}
