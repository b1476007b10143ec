//! Background workers

pub mod sync;
