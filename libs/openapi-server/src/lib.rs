//! Models served by the Hangar API

pub mod models;
