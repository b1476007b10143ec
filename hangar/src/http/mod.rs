//! Hangar API client

pub mod client;
pub mod credentials;
pub mod deployments;
