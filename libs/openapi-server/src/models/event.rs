//! Event bus models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Event bus room
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Topic {
    /// Every deployment
    Global,
    /// A single deployment
    Deployment(String),
}

impl Topic {
    pub fn deployment(id: impl Into<String>) -> Self {
        Topic::Deployment(id.into())
    }

    /// Deployment id scoped by this topic
    pub fn deployment_id(&self) -> Option<&str> {
        match self {
            Topic::Global => None,
            Topic::Deployment(id) => Some(id),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Global => f.write_str("global"),
            Topic::Deployment(id) => write!(f, "deployment:{}", id),
        }
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "global" {
            return Ok(Topic::Global);
        }
        match s.split_once(':') {
            Some(("deployment", id)) if !id.is_empty() => Ok(Topic::Deployment(id.to_string())),
            _ => Err(format!("Invalid topic: {}", s)),
        }
    }
}

impl TryFrom<String> for Topic {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.to_string()
    }
}

/// Kind of event published on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DeploymentCreated,
    DeploymentUpdated,
    DeploymentStatusChanged,
}

/// Event bus message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub topic: Topic,
    pub event_type: EventType,
    pub payload: serde_json::Value,
}
