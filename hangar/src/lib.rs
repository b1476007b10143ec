//! Hangar Library
//!
//! Deployment orchestration for game servers: a provisioning pipeline per
//! deployment, topic-based event fan-out of every transition, and a client
//! sync layer that follows pushed events with a polling fallback.

pub mod app;
pub mod cache;
pub mod deploy;
pub mod errors;
pub mod events;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod store;
pub mod sync;
pub mod utils;
pub mod workers;
