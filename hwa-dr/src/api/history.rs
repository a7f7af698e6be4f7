//! Per-part audit trail

use axum::{
    extract::{Path, State},
    Json,
};
use hwa_common::AssemblyEvent;

use super::ApiError;
use crate::AppState;

/// GET /api/history/:part
///
/// Events touching the part in arrival order. An unknown part has an empty
/// history.
pub async fn get_history(
    State(state): State<AppState>,
    Path(part): Path<String>,
) -> Result<Json<Vec<AssemblyEvent>>, ApiError> {
    Ok(Json(state.ledger.history(&part).await?))
}
