//! Relay message contract and clients.
//!
//! The in-page agent cannot make cross-origin requests itself, so every fetch
//! goes through a privileged relay. The same messages carry status updates
//! and icon updates.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::controller::StatusSource;
use crate::error::RelayError;
use crate::status::{IconSink, TriState};

/// Relay message endpoint path.
pub const MESSAGE_PATH: &str = "/api/message";

/// Relay status endpoint path.
pub const STATUS_PATH: &str = "/api/status";

/// Default timeout for HTTP relay calls.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A message sent to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum RelayRequest {
    /// Fetch a URL and return its body as text.
    FetchUrl { url: String },

    /// Persist a new status and broadcast it to every agent.
    UpdateStatus { enabled: TriState },

    /// Update the visual indicator only.
    UpdateIconStatus { status: TriState },
}

impl RelayRequest {
    /// Returns the action name as sent on the wire.
    pub fn action(&self) -> &'static str {
        match self {
            Self::FetchUrl { .. } => "fetchUrl",
            Self::UpdateStatus { .. } => "updateStatus",
            Self::UpdateIconStatus { .. } => "updateIconStatus",
        }
    }
}

/// A relay reply. Exactly one field is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl RelayResponse {
    /// A fetch result.
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
            ..Self::default()
        }
    }

    /// A failure.
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// An acknowledgement.
    pub fn success() -> Self {
        Self {
            success: Some(true),
            ..Self::default()
        }
    }

    /// Extracts the fetched text, turning error replies into errors.
    pub fn into_data(self) -> Result<String, RelayError> {
        if let Some(error) = self.error {
            return Err(RelayError::Remote(error));
        }
        self.data.ok_or(RelayError::EmptyResponse)
    }
}

/// The privileged relay.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Sends one message and awaits the reply.
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse, RelayError>;
}

/// Fetches `url` through `relay` and returns the body text.
pub async fn fetch_text(relay: &dyn Relay, url: &str) -> Result<String, RelayError> {
    let response = relay
        .send(RelayRequest::FetchUrl {
            url: url.to_string(),
        })
        .await?;
    response.into_data()
}

/// Persisted status as reported by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub enabled: TriState,
}

/// Relay client speaking JSON over HTTP to a relay server.
#[derive(Debug, Clone)]
pub struct HttpRelayClient {
    client: reqwest::Client,
    base_url: String,
    endpoint: String,
}

impl HttpRelayClient {
    /// Creates a client for a relay at `base_url` (e.g. `http://127.0.0.1:48766`).
    pub fn new(base_url: &str) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url, MESSAGE_PATH),
            base_url,
        })
    }

    /// Returns the full message endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Reads the persisted status from the relay.
    pub async fn status(&self) -> Result<TriState, RelayError> {
        let url = format!("{}{}", self.base_url, STATUS_PATH);
        let reply: StatusReply = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(reply.enabled)
    }
}

#[async_trait]
impl Relay for HttpRelayClient {
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse, RelayError> {
        debug!(action = request.action(), "sending relay message");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| RelayError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl StatusSource for HttpRelayClient {
    async fn load_status(&self) -> TriState {
        match self.status().await {
            Ok(status) => status,
            Err(e) => {
                warn!("cannot read status from relay: {}", e);
                TriState::Disabled
            }
        }
    }
}

/// Icon sink that forwards updates to the relay without waiting.
///
/// Updates are delivered one at a time, in the order they were shown, by a
/// task started on the first update.
pub struct RelayIconSink {
    relay: Arc<dyn Relay>,
    queue: Mutex<Option<mpsc::UnboundedSender<TriState>>>,
}

impl RelayIconSink {
    pub fn new(relay: Arc<dyn Relay>) -> Self {
        Self {
            relay,
            queue: Mutex::new(None),
        }
    }

    fn spawn_delivery(&self) -> Option<mpsc::UnboundedSender<TriState>> {
        // Outside a runtime there is nobody to deliver to.
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let relay = Arc::clone(&self.relay);
        handle.spawn(async move {
            while let Some(status) = rx.recv().await {
                if let Err(e) = relay.send(RelayRequest::UpdateIconStatus { status }).await {
                    debug!("icon update dropped: {}", e);
                }
            }
        });
        Some(tx)
    }
}

impl IconSink for RelayIconSink {
    fn show(&self, status: TriState) {
        let mut queue = self.queue.lock();
        if let Some(tx) = queue.as_ref() {
            if tx.send(status).is_ok() {
                return;
            }
        }

        *queue = self.spawn_delivery();
        if let Some(tx) = queue.as_ref() {
            let _ = tx.send(status);
        }
    }
}
