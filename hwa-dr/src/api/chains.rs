//! Chain report and connected-edge snapshot

use axum::{extract::State, http::header, response::IntoResponse, Json};
use hwa_common::ledger::render_report;
use hwa_common::ResolvedEdge;

use super::ApiError;
use crate::AppState;

/// GET /api/chains
///
/// Plain-text report, one chain per line (`ANT001P1 -> LNA001P1 -> ...`).
pub async fn get_chains(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let chains = state.ledger.all_chains().await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        render_report(&chains),
    ))
}

/// GET /api/edges
///
/// Every currently connected edge with the event that made it so.
pub async fn get_edges(State(state): State<AppState>) -> Result<Json<Vec<ResolvedEdge>>, ApiError> {
    Ok(Json(state.ledger.connected_edges().await?))
}
