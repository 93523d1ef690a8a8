//! API route handlers.

use axum::extract::{Query, State};
use axum::Json;
use cafelink_core::{IconSet, RelayRequest, RelayResponse, StatusReply};
use tracing::{debug, warn};

use crate::error::{ApiError, Result};
use crate::models::{HistoryQuery, HistoryResponse};
use crate::state::AppState;

/// POST /api/message - Dispatch one relay message.
///
/// The body is decoded here rather than by the extractor so unknown actions
/// are logged and rejected with 400.
pub async fn post_message(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<RelayResponse>> {
    let request: RelayRequest = serde_json::from_value(body).map_err(|e| {
        warn!("rejected relay message: {}", e);
        ApiError::BadRequest(e.to_string())
    })?;

    debug!(action = request.action(), "relay message");
    let reply = state.service.handle(request).await?;
    Ok(Json(reply))
}

/// GET /api/status - The persisted status.
pub async fn get_status(State(state): State<AppState>) -> Result<Json<StatusReply>> {
    let enabled = state.service.status()?;
    Ok(Json(StatusReply { enabled }))
}

/// GET /api/icon - Icon images for the current icon state.
pub async fn get_icon(State(state): State<AppState>) -> Json<IconSet> {
    Json(state.service.icon())
}

/// GET /api/history - Recent status writes.
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>> {
    let changes = state.service.history(query.limit())?;
    Ok(Json(HistoryResponse { changes }))
}
