//! Domain models

pub mod credential;
pub mod deployment;
