//! Data models for storage.

use cafelink_core::TriState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A configuration entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configuration key.
    pub key: String,
    /// Configuration value (JSON).
    pub value: serde_json::Value,
    /// Last write.
    pub updated_at: DateTime<Utc>,
}

/// Why the relay is starting with a given store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// First run against an empty store.
    Install,
    /// Any later run, including version upgrades.
    Update,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::Install => "install",
            LifecycleEvent::Update => "update",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "install" => Some(LifecycleEvent::Install),
            "update" => Some(LifecycleEvent::Update),
            _ => None,
        }
    }
}

/// One recorded status write.
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub id: i64,
    pub status: TriState,
    /// Who asked for the change ("install", "relay", "cli", ...).
    pub source: String,
    pub changed_at: DateTime<Utc>,
}
