//! Relay message handling shared by the HTTP server and in-process agents.

use std::sync::Arc;

use async_trait::async_trait;
use cafelink_core::{IconSet, Relay, RelayError, RelayRequest, RelayResponse, StatusSource, TriState};
use cafelink_storage::{StatusChange, StatusStore, StorageError};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::fetcher::PageFetcher;

/// Status updates buffered per subscriber before it starts lagging.
const BROADCAST_CAPACITY: usize = 16;

/// Source recorded for status writes arriving through the relay.
const RELAY_SOURCE: &str = "relay";

/// The privileged side of the system.
///
/// Fetches pages for agents, owns the persisted status, tracks the icon
/// state, and broadcasts status changes to every subscribed agent.
pub struct RelayService {
    store: StatusStore,
    fetcher: Arc<dyn PageFetcher>,
    icon: watch::Sender<TriState>,
    updates: broadcast::Sender<TriState>,
}

impl RelayService {
    /// Creates a service showing the currently persisted status.
    pub fn new(store: StatusStore, fetcher: Arc<dyn PageFetcher>) -> Result<Self, StorageError> {
        let status = store.get_status()?;
        Ok(Self::with_icon(store, fetcher, status))
    }

    /// Runs install/update bootstrap on `store` first.
    pub fn bootstrap(
        store: StatusStore,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Result<Self, StorageError> {
        let event = store.lifecycle_event()?;
        let status = store.bootstrap(event)?;
        info!(status = %status, "relay bootstrapped on {}", event.as_str());
        Ok(Self::with_icon(store, fetcher, status))
    }

    fn with_icon(store: StatusStore, fetcher: Arc<dyn PageFetcher>, status: TriState) -> Self {
        let (icon, _) = watch::channel(status);
        let (updates, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            store,
            fetcher,
            icon,
            updates,
        }
    }

    /// Receives every persisted status change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TriState> {
        self.updates.subscribe()
    }

    /// Follows the icon state.
    pub fn watch_icon(&self) -> watch::Receiver<TriState> {
        self.icon.subscribe()
    }

    /// Icon images for the current icon state.
    pub fn icon(&self) -> IconSet {
        IconSet::for_status(*self.icon.borrow())
    }

    /// The persisted status.
    pub fn status(&self) -> Result<TriState, StorageError> {
        self.store.get_status()
    }

    /// Most recent status writes, newest first.
    pub fn history(&self, limit: i64) -> Result<Vec<StatusChange>, StorageError> {
        self.store.history(limit)
    }

    /// Handles one relay message.
    ///
    /// Fetch failures become error replies. Only storage failures are errors.
    pub async fn handle(&self, request: RelayRequest) -> Result<RelayResponse, StorageError> {
        match request {
            RelayRequest::FetchUrl { url } => match self.fetcher.fetch(&url).await {
                Ok(body) => Ok(RelayResponse::data(body)),
                Err(e) => {
                    warn!(url = %url, "fetch failed: {}", e);
                    Ok(RelayResponse::error(e.to_string()))
                }
            },
            RelayRequest::UpdateStatus { enabled } => {
                let stored = self.store.set_status(enabled, RELAY_SOURCE)?;
                self.icon.send_replace(stored);
                let delivered = self.updates.send(stored).unwrap_or(0);
                info!(status = %stored, delivered, "status broadcast");
                Ok(RelayResponse::success())
            }
            RelayRequest::UpdateIconStatus { status } => {
                debug!(status = %status, "icon status");
                self.icon.send_replace(status);
                Ok(RelayResponse::success())
            }
        }
    }
}

#[async_trait]
impl Relay for RelayService {
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse, RelayError> {
        self.handle(request)
            .await
            .map_err(|e| RelayError::Remote(e.to_string()))
    }
}

#[async_trait]
impl StatusSource for RelayService {
    async fn load_status(&self) -> TriState {
        match self.status() {
            Ok(status) => status,
            Err(e) => {
                warn!("cannot read persisted status: {}", e);
                TriState::Disabled
            }
        }
    }
}
