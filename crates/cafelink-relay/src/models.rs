//! Request and response bodies beyond the relay message contract.

use cafelink_storage::StatusChange;
use serde::{Deserialize, Serialize};

/// Default number of history entries returned.
pub const DEFAULT_HISTORY_LIMIT: i64 = 20;

/// Query parameters for the history endpoint.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

impl HistoryQuery {
    /// The requested limit clamped to `1..=500`.
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 500)
    }
}

/// Recent status writes, newest first.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub changes: Vec<StatusChange>,
}
