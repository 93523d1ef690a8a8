//! Persisted enable flag.

use std::path::PathBuf;

use cafelink_core::TriState;
use chrono::Utc;
use directories::ProjectDirs;
use serde_json::json;
use tracing::info;

use crate::error::{Result, StorageError};
use crate::models::{LifecycleEvent, StatusChange};
use crate::pool::ConnectionPool;
use crate::repository::{ConfigRepo, HistoryRepo};

/// Config key holding the enable flag.
pub const ENABLED_KEY: &str = "enabled";

/// Config key written once on install.
pub const INSTALLED_AT_KEY: &str = "installed_at";

/// Single-record store of the coarse enable flag.
///
/// Only `Disabled` and `Enabled` are ever persisted. `Running` describes
/// in-flight work and is stored as `Enabled`.
#[derive(Clone)]
pub struct StatusStore {
    pool: ConnectionPool,
}

impl StatusStore {
    /// Opens the store in the default app data directory.
    pub fn new() -> Result<Self> {
        Self::with_path(Self::default_db_path()?)
    }

    /// Opens the store at a specific path.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening database at: {:?}", path);
        let pool = ConnectionPool::new(&path)?;

        Ok(Self { pool })
    }

    /// Creates an in-memory store (for testing and one-shot runs).
    pub fn in_memory() -> Result<Self> {
        let pool = ConnectionPool::in_memory()?;
        Ok(Self { pool })
    }

    /// Get the default database path.
    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "cafelink", "cafelink").ok_or_else(|| {
            StorageError::Config("Could not determine app data directory".into())
        })?;

        Ok(proj_dirs.data_dir().join("cafelink.db"))
    }

    /// Returns the persisted flag, `Disabled` when none was ever written.
    pub fn get_status(&self) -> Result<TriState> {
        let conn = self.pool.get()?;
        match ConfigRepo::get(&conn, ENABLED_KEY)? {
            Some(config) => {
                let raw: u8 = serde_json::from_value(config.value)?;
                Ok(TriState::try_from(raw)?)
            }
            None => Ok(TriState::Disabled),
        }
    }

    /// Persists `status` and records who changed it. Returns what was stored.
    pub fn set_status(&self, status: TriState, source: &str) -> Result<TriState> {
        let stored = coarse(status);
        let conn = self.pool.get()?;
        let tx = conn.unchecked_transaction()?;
        ConfigRepo::set(&tx, ENABLED_KEY, &json!(u8::from(stored)))?;
        HistoryRepo::insert(&tx, stored, source)?;
        tx.commit()?;

        info!(status = %stored, source, "status persisted");
        Ok(stored)
    }

    /// `Install` for a store that has never been bootstrapped, else `Update`.
    pub fn lifecycle_event(&self) -> Result<LifecycleEvent> {
        let conn = self.pool.get()?;
        if ConfigRepo::contains(&conn, INSTALLED_AT_KEY)? {
            Ok(LifecycleEvent::Update)
        } else {
            Ok(LifecycleEvent::Install)
        }
    }

    /// Applies install/update semantics and returns the effective status.
    ///
    /// `Install` always writes `Disabled`. `Update` keeps an existing value
    /// and writes `Disabled` only when none exists.
    pub fn bootstrap(&self, event: LifecycleEvent) -> Result<TriState> {
        info!("Bootstrapping status store on {}", event.as_str());

        let existing = {
            let conn = self.pool.get()?;
            if !ConfigRepo::contains(&conn, INSTALLED_AT_KEY)? {
                ConfigRepo::set(&conn, INSTALLED_AT_KEY, &json!(Utc::now().to_rfc3339()))?;
            }
            ConfigRepo::contains(&conn, ENABLED_KEY)?
        };

        match event {
            LifecycleEvent::Install => self.set_status(TriState::Disabled, event.as_str()),
            LifecycleEvent::Update if existing => self.get_status(),
            LifecycleEvent::Update => self.set_status(TriState::Disabled, event.as_str()),
        }
    }

    /// Most recent status writes, newest first.
    pub fn history(&self, limit: i64) -> Result<Vec<StatusChange>> {
        let conn = self.pool.get()?;
        HistoryRepo::recent(&conn, limit)
    }
}

fn coarse(status: TriState) -> TriState {
    if status.is_enabled() {
        TriState::Enabled
    } else {
        TriState::Disabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_store_reads_disabled() {
        let store = StatusStore::in_memory().unwrap();
        assert_eq!(store.get_status().unwrap(), TriState::Disabled);
        assert_eq!(store.lifecycle_event().unwrap(), LifecycleEvent::Install);
    }

    #[test]
    fn set_status_round_trips() {
        let store = StatusStore::in_memory().unwrap();
        store.set_status(TriState::Enabled, "cli").unwrap();
        assert_eq!(store.get_status().unwrap(), TriState::Enabled);

        store.set_status(TriState::Disabled, "cli").unwrap();
        assert_eq!(store.get_status().unwrap(), TriState::Disabled);
    }

    #[test]
    fn running_is_stored_as_enabled() {
        let store = StatusStore::in_memory().unwrap();
        let stored = store.set_status(TriState::Running, "relay").unwrap();
        assert_eq!(stored, TriState::Enabled);
        assert_eq!(store.get_status().unwrap(), TriState::Enabled);
    }

    #[test]
    fn install_writes_disabled() {
        let store = StatusStore::in_memory().unwrap();
        store.set_status(TriState::Enabled, "cli").unwrap();

        let status = store.bootstrap(LifecycleEvent::Install).unwrap();
        assert_eq!(status, TriState::Disabled);
        assert_eq!(store.get_status().unwrap(), TriState::Disabled);
        assert_eq!(store.lifecycle_event().unwrap(), LifecycleEvent::Update);
    }

    #[test]
    fn update_preserves_existing_value() {
        let store = StatusStore::in_memory().unwrap();
        store.bootstrap(LifecycleEvent::Install).unwrap();
        store.set_status(TriState::Enabled, "cli").unwrap();

        let status = store.bootstrap(LifecycleEvent::Update).unwrap();
        assert_eq!(status, TriState::Enabled);
    }

    #[test]
    fn update_without_value_writes_disabled() {
        let store = StatusStore::in_memory().unwrap();
        let status = store.bootstrap(LifecycleEvent::Update).unwrap();
        assert_eq!(status, TriState::Disabled);

        let history = store.history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].source, "update");
    }

    #[test]
    fn corrupt_value_is_an_error() {
        let store = StatusStore::in_memory().unwrap();
        {
            let conn = store.pool.get().unwrap();
            ConfigRepo::set(&conn, ENABLED_KEY, &json!(7)).unwrap();
        }
        assert!(matches!(
            store.get_status(),
            Err(StorageError::Status(_))
        ));
    }

    #[test]
    fn status_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cafelink.db");

        {
            let store = StatusStore::with_path(&path).unwrap();
            assert_eq!(store.bootstrap(LifecycleEvent::Install).unwrap(), TriState::Disabled);
            store.set_status(TriState::Enabled, "cli").unwrap();
        }

        let store = StatusStore::with_path(&path).unwrap();
        let event = store.lifecycle_event().unwrap();
        assert_eq!(event, LifecycleEvent::Update);
        assert_eq!(store.bootstrap(event).unwrap(), TriState::Enabled);
    }

    #[test]
    fn history_records_sources() {
        let store = StatusStore::in_memory().unwrap();
        store.bootstrap(LifecycleEvent::Install).unwrap();
        store.set_status(TriState::Enabled, "relay").unwrap();

        let sources: Vec<_> = store
            .history(10)
            .unwrap()
            .into_iter()
            .map(|c| c.source)
            .collect();
        assert_eq!(sources, vec!["relay", "install"]);
    }
}
