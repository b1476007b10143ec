//! Event bus

pub mod bus;

pub use bus::{BusConnection, EventBus, SubscriberId, SubscriptionHandle};
pub use openapi_server::models::{Event, EventType, Topic};
