//! Request models sent to the Hangar API

pub mod models;
