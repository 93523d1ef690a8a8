//! Cafelink Storage - SQLite persistence layer.
//!
//! Holds the single persisted record the system needs, the coarse enable
//! flag, plus a log of who changed it and when.
//!
//! # Example
//!
//! ```no_run
//! use cafelink_core::TriState;
//! use cafelink_storage::StatusStore;
//!
//! let store = StatusStore::in_memory().unwrap();
//! let event = store.lifecycle_event().unwrap();
//! let status = store.bootstrap(event).unwrap();
//! assert_eq!(status, TriState::Disabled);
//!
//! store.set_status(TriState::Enabled, "cli").unwrap();
//! ```

pub mod error;
pub mod models;
mod pool;
pub mod repository;
mod schema;
mod store;

pub use error::{Result, StorageError};
pub use models::{Config, LifecycleEvent, StatusChange};
pub use pool::ConnectionPool;
pub use store::{StatusStore, ENABLED_KEY, INSTALLED_AT_KEY};
