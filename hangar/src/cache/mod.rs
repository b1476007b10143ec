//! Client-side caches

pub mod deployment;

pub use deployment::{DeploymentCache, ResourceKey};
