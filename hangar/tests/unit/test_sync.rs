//! Sync worker tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hangar::app::options::AppOptions;
use hangar::app::state::AppState;
use hangar::deploy::{Orchestrator, SimulatedSettings};
use hangar::errors::HangarError;
use hangar::events::{Event, Topic};
use hangar::http::client::HttpClient;
use hangar::models::deployment::{Deployment, DeploymentStatus, DeploymentTarget, Provider};
use hangar::server::serve::router;
use hangar::server::state::ServerState;
use hangar::sync::{
    BusTransport, DeploymentSource, DeploymentSync, PushConnection, PushTransport,
    SocketTransport, SyncMode,
};
use hangar::workers::sync;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

fn create_test_state(simulation: SimulatedSettings) -> AppState {
    let options = AppOptions {
        simulation,
        ..Default::default()
    };
    AppState::init(&options)
}

fn target() -> DeploymentTarget {
    DeploymentTarget {
        provider: Provider::Aws,
        region: "ap-southeast-2".to_string(),
        instance_type: "m5.xlarge".to_string(),
        server_config: serde_json::json!({ "game": "rust", "seed": 1337 }),
        credential: None,
        name: None,
    }
}

fn worker_options() -> sync::Options {
    sync::Options {
        poll_interval: Duration::from_secs(10),
        reconnect_delay: Duration::from_secs(1),
        max_reconnect_attempts: 2,
        push_retry_interval: Duration::from_secs(60),
        connect_timeout: Duration::from_secs(5),
        heartbeat_interval: Duration::from_secs(30),
    }
}

/// Orchestrator source that counts full listings
struct CountingSource {
    inner: Arc<Orchestrator>,
    lists: AtomicUsize,
}

impl CountingSource {
    fn new(inner: Arc<Orchestrator>) -> Self {
        Self {
            inner,
            lists: AtomicUsize::new(0),
        }
    }

    fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeploymentSource for CountingSource {
    async fn list(&self) -> Result<Vec<Deployment>, HangarError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list().await
    }

    async fn get(&self, id: &str) -> Result<Deployment, HangarError> {
        self.inner.get(id).await
    }

    async fn create(&self, target: DeploymentTarget) -> Result<Deployment, HangarError> {
        self.inner.create(target).await
    }

    async fn cancel(&self, id: &str) -> Result<(), HangarError> {
        self.inner.cancel(id).await.map(|_| ())
    }

    async fn terminate(&self, id: &str) -> Result<(), HangarError> {
        self.inner.terminate(id).await.map(|_| ())
    }
}

/// Bus transport that can refuse connections, drop the live one or stop
/// answering pings
struct FlakyTransport {
    inner: BusTransport,
    up: AtomicBool,
    silent: Arc<AtomicBool>,
    attempts: AtomicUsize,
    live: Mutex<Option<CancellationToken>>,
}

impl FlakyTransport {
    fn new(state: &AppState, up: bool) -> Self {
        Self {
            inner: BusTransport::new(state.bus.clone()),
            up: AtomicBool::new(up),
            silent: Arc::new(AtomicBool::new(false)),
            attempts: AtomicUsize::new(0),
            live: Mutex::new(None),
        }
    }

    fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::SeqCst);
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn drop_connection(&self) {
        if let Some(token) = self.live.lock().unwrap().take() {
            token.cancel();
        }
    }
}

struct DroppablePush {
    inner: Box<dyn PushConnection>,
    dropped: CancellationToken,
    silent: Arc<AtomicBool>,
}

#[async_trait]
impl PushTransport for FlakyTransport {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, HangarError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.up.load(Ordering::SeqCst) {
            return Err(HangarError::SocketError("connection refused".to_string()));
        }

        let dropped = CancellationToken::new();
        *self.live.lock().unwrap() = Some(dropped.clone());
        Ok(Box::new(DroppablePush {
            inner: self.inner.connect().await?,
            dropped,
            silent: self.silent.clone(),
        }))
    }
}

#[async_trait]
impl PushConnection for DroppablePush {
    async fn join(&mut self, topic: Topic) -> Result<(), HangarError> {
        self.inner.join(topic).await
    }

    async fn leave(&mut self, topic: Topic) -> Result<(), HangarError> {
        self.inner.leave(topic).await
    }

    async fn next_event(&mut self) -> Option<Event> {
        tokio::select! {
            _ = self.dropped.cancelled() => None,
            event = self.inner.next_event() => event,
        }
    }

    async fn ping(&mut self) -> Result<(), HangarError> {
        if self.silent.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.ping().await
    }
}

/// Transport whose connection attempts never resolve
#[derive(Default)]
struct HangingTransport {
    attempts: AtomicUsize,
}

#[async_trait]
impl PushTransport for HangingTransport {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, HangarError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

fn spawn_worker(
    options: sync::Options,
    deployment_sync: Arc<DeploymentSync>,
    transport: Arc<dyn PushTransport>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        sync::run(
            &options,
            deployment_sync.as_ref(),
            transport.as_ref(),
            tokio::time::sleep,
            Box::pin(async move { shutdown.cancelled().await }),
        )
        .await;
    })
}

async fn wait_for_mode(deployment_sync: &DeploymentSync, mode: SyncMode) {
    deployment_sync
        .subscribe_mode()
        .wait_for(|current| *current == mode)
        .await
        .unwrap();
}

/// Block until the cache satisfies `condition`
async fn wait_until(deployment_sync: &DeploymentSync, condition: impl Fn(&DeploymentSync) -> bool) {
    let mut changes = deployment_sync.subscribe_changes();
    tokio::time::timeout(Duration::from_secs(600), async {
        while !condition(deployment_sync) {
            changes.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
}

fn status_of(deployment_sync: &DeploymentSync, id: &str) -> Option<DeploymentStatus> {
    deployment_sync.deployment(id).map(|d| d.status)
}

#[tokio::test(start_paused = true)]
async fn test_push_keeps_cache_fresh_without_polling() {
    let state = create_test_state(SimulatedSettings::default());
    let source = Arc::new(CountingSource::new(state.orchestrator.clone()));
    let deployment_sync = Arc::new(DeploymentSync::new(source.clone()));
    let transport = Arc::new(FlakyTransport::new(&state, true));
    let shutdown = CancellationToken::new();
    let worker = spawn_worker(
        worker_options(),
        deployment_sync.clone(),
        transport.clone(),
        shutdown.clone(),
    );

    wait_for_mode(&deployment_sync, SyncMode::Push).await;
    let created = state.orchestrator.create(target()).await.unwrap();
    wait_until(&deployment_sync, |s| {
        status_of(s, &created.id) == Some(DeploymentStatus::Running)
    })
    .await;

    // The startup poll and the listing taken right after connecting
    assert_eq!(source.lists(), 2);
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(source.lists(), 2);
    assert_eq!(deployment_sync.mode(), SyncMode::Push);

    // Mutations refresh the affected record straight away
    deployment_sync.track(created.id.clone());
    let mutation = deployment_sync.terminate(&created.id).await.unwrap();
    assert!(mutation.refresh_error.is_none());
    assert_eq!(
        status_of(&deployment_sync, &created.id),
        Some(DeploymentStatus::Terminated)
    );

    shutdown.cancel();
    worker.await.unwrap();
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_polling_when_push_is_unavailable() {
    let state = create_test_state(SimulatedSettings::default());
    let deployment_sync = Arc::new(DeploymentSync::new(state.orchestrator.clone()));
    let transport = Arc::new(FlakyTransport::new(&state, false));
    let shutdown = CancellationToken::new();
    let worker = spawn_worker(
        worker_options(),
        deployment_sync.clone(),
        transport.clone(),
        shutdown.clone(),
    );

    // Startup poll, two failed attempts at 0s and 1s, then a poll at 1s
    let created = state.orchestrator.create(target()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.attempts(), 2);
    assert_eq!(deployment_sync.mode(), SyncMode::Poll);
    assert!(deployment_sync.deployment(&created.id).is_some());

    // The pipeline finishes at 12s and the poll at 21s picks it up
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(
        status_of(&deployment_sync, &created.id),
        Some(DeploymentStatus::Running)
    );

    // Push is retried once the polling round is over
    transport.set_up(true);
    wait_for_mode(&deployment_sync, SyncMode::Push).await;
    assert_eq!(transport.attempts(), 3);

    shutdown.cancel();
    worker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_lost_push_falls_back_and_recovers() {
    let state = create_test_state(SimulatedSettings::default());
    let deployment_sync = Arc::new(DeploymentSync::new(state.orchestrator.clone()));
    let transport = Arc::new(FlakyTransport::new(&state, true));
    let shutdown = CancellationToken::new();
    let worker = spawn_worker(
        worker_options(),
        deployment_sync.clone(),
        transport.clone(),
        shutdown.clone(),
    );
    wait_for_mode(&deployment_sync, SyncMode::Push).await;

    transport.set_up(false);
    transport.drop_connection();
    wait_for_mode(&deployment_sync, SyncMode::Poll).await;

    // Created while nothing is pushed
    let created = state.orchestrator.create(target()).await.unwrap();

    transport.set_up(true);
    wait_for_mode(&deployment_sync, SyncMode::Push).await;
    wait_until(&deployment_sync, |s| s.deployment(&created.id).is_some()).await;
    wait_until(&deployment_sync, |s| {
        status_of(s, &created.id) == Some(DeploymentStatus::Running)
    })
    .await;

    shutdown.cancel();
    worker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_polling_continues_while_connect_hangs() {
    let state = create_test_state(SimulatedSettings::default());
    let source = Arc::new(CountingSource::new(state.orchestrator.clone()));
    let deployment_sync = Arc::new(DeploymentSync::new(source.clone()));
    let transport = Arc::new(HangingTransport::default());
    let created = state.orchestrator.create(target()).await.unwrap();
    let shutdown = CancellationToken::new();
    let worker = spawn_worker(
        worker_options(),
        deployment_sync.clone(),
        transport.clone(),
        shutdown.clone(),
    );

    // Startup poll at 0s, attempts time out at 5s and 11s, then a poll at 11s
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(deployment_sync.deployment(&created.id).is_some());
    assert_eq!(source.lists(), 1);

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(source.lists(), 2);
    assert_eq!(deployment_sync.mode(), SyncMode::Poll);

    // Polls at 21s, 31s and 41s
    tokio::time::sleep(Duration::from_secs(33)).await;
    assert_eq!(source.lists(), 5);
    assert_eq!(
        status_of(&deployment_sync, &created.id),
        Some(DeploymentStatus::Running)
    );

    shutdown.cancel();
    worker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_silent_push_connection_falls_back() {
    let state = create_test_state(SimulatedSettings::default());
    let deployment_sync = Arc::new(DeploymentSync::new(state.orchestrator.clone()));
    let transport = Arc::new(FlakyTransport::new(&state, true));
    let shutdown = CancellationToken::new();
    let worker = spawn_worker(
        worker_options(),
        deployment_sync.clone(),
        transport.clone(),
        shutdown.clone(),
    );
    wait_for_mode(&deployment_sync, SyncMode::Push).await;

    // The next ping goes unanswered and times out
    let started = tokio::time::Instant::now();
    transport.set_up(false);
    transport.set_silent(true);
    wait_for_mode(&deployment_sync, SyncMode::Poll).await;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(30), "{:?}", elapsed);
    assert!(elapsed <= Duration::from_secs(36), "{:?}", elapsed);

    let created = state.orchestrator.create(target()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert!(deployment_sync.deployment(&created.id).is_some());

    transport.set_silent(false);
    transport.set_up(true);
    wait_for_mode(&deployment_sync, SyncMode::Push).await;

    shutdown.cancel();
    worker.await.unwrap();
}

#[tokio::test]
async fn test_stalled_socket_handshake_still_polls() {
    let state = create_test_state(SimulatedSettings::instant());
    let source = Arc::new(CountingSource::new(state.orchestrator.clone()));
    let deployment_sync = Arc::new(DeploymentSync::new(source.clone()));
    let created = state.orchestrator.create(target()).await.unwrap();

    // Accepts connections and never answers the upgrade
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let options = sync::Options {
        poll_interval: Duration::from_millis(50),
        reconnect_delay: Duration::from_millis(10),
        max_reconnect_attempts: 2,
        push_retry_interval: Duration::from_millis(200),
        connect_timeout: Duration::from_millis(100),
        heartbeat_interval: Duration::from_secs(1),
    };
    let transport = Arc::new(SocketTransport::from_base_url(&base_url).unwrap());
    let shutdown = CancellationToken::new();
    let worker = spawn_worker(options, deployment_sync.clone(), transport, shutdown.clone());

    tokio::time::timeout(Duration::from_secs(3), async {
        while source.lists() < 4 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(deployment_sync.mode(), SyncMode::Poll);
    assert!(deployment_sync.deployment(&created.id).is_some());

    shutdown.cancel();
    worker.await.unwrap();
}

#[tokio::test]
async fn test_sync_against_remote_server() {
    let state = create_test_state(SimulatedSettings::instant());
    let server_state = ServerState::new(
        state.orchestrator.clone(),
        state.credentials.clone(),
        state.bus.clone(),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, router(Arc::new(server_state)))
            .await
            .unwrap();
    });

    let client = Arc::new(HttpClient::new(&base_url).unwrap());
    let deployment_sync = Arc::new(DeploymentSync::new(client));
    let transport = Arc::new(SocketTransport::from_base_url(&base_url).unwrap());
    let shutdown = CancellationToken::new();
    let worker = spawn_worker(
        worker_options(),
        deployment_sync.clone(),
        transport,
        shutdown.clone(),
    );
    wait_for_mode(&deployment_sync, SyncMode::Push).await;

    let mutation = deployment_sync.create(target()).await.unwrap();
    assert!(mutation.refresh_error.is_none());
    let id = mutation.value.id;

    wait_until(&deployment_sync, |s| {
        status_of(s, &id) == Some(DeploymentStatus::Running)
    })
    .await;

    // Rejected mutations surface the server's error
    assert!(matches!(
        deployment_sync.cancel(&id).await,
        Err(HangarError::InvalidTransition(_))
    ));
    assert_eq!(deployment_sync.deployments().len(), 1);

    shutdown.cancel();
    worker.await.unwrap();
}
