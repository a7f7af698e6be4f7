//! Antenna port resolution

use axum::{
    extract::{Path, State},
    Json,
};
use hwa_common::ledger::AntennaPorts;
use hwa_common::Error;

use super::ApiError;
use crate::AppState;

/// GET /api/ports/:antenna
///
/// Both polarizations are always present; a walk that stops short reports
/// where and why instead of failing the request.
pub async fn get_ports(
    State(state): State<AppState>,
    Path(antenna): Path<String>,
) -> Result<Json<AntennaPorts>, ApiError> {
    if antenna.trim().is_empty() {
        return Err(Error::InvalidInput("Empty antenna identifier".to_string()).into());
    }
    Ok(Json(state.ledger.resolve_ports(&antenna).await?))
}
