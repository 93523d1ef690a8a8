//! Application state for the relay server.

use std::sync::Arc;

use crate::service::RelayService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RelayService>,
}

impl AppState {
    pub fn new(service: Arc<RelayService>) -> Self {
        Self { service }
    }
}
