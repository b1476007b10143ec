//! Server state

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::deploy::Orchestrator;
use crate::events::EventBus;
use crate::store::CredentialStore;

/// Server state shared across handlers
pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
    pub credentials: Arc<CredentialStore>,
    pub bus: Arc<EventBus>,

    /// Cancelled when the server shuts down; closes open sockets
    pub shutdown: CancellationToken,
}

impl ServerState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        credentials: Arc<CredentialStore>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            orchestrator,
            credentials,
            bus,
            shutdown: CancellationToken::new(),
        }
    }
}
