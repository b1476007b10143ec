//! HTTP and WebSocket server

pub mod handlers;
pub mod serve;
pub mod socket;
pub mod state;
