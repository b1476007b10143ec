//! Client synchronization
//!
//! Keeps a local deployment cache in step with a server, through pushed
//! events while a push connection is up and through polling otherwise.

pub mod source;
pub mod syncer;
pub mod transport;

pub use source::DeploymentSource;
pub use syncer::{DeploymentSync, Mutation, SyncMode};
pub use transport::{BusTransport, PushConnection, PushTransport, SocketTransport};
