//! Graph audit

use axum::{extract::State, Json};
use hwa_common::ledger::Violation;
use serde::Serialize;

use super::ApiError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AuditResponse {
    pub count: usize,
    pub violations: Vec<Violation>,
}

/// GET /api/audit
pub async fn get_audit(State(state): State<AppState>) -> Result<Json<AuditResponse>, ApiError> {
    let violations = state.ledger.audit().await?;
    Ok(Json(AuditResponse {
        count: violations.len(),
        violations,
    }))
}
