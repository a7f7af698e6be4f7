//! hwa-dr library - read-only review of the assembly ledger
//!
//! Serves the chain report, port resolution, part history and the graph
//! audit over HTTP. Never appends to the event ledger.

use axum::Router;
use hwa_common::ledger::{AssemblyLedger, PartTypeSequence};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Ledger over a read-only connection pool
    pub ledger: AssemblyLedger,
}

impl AppState {
    pub fn new(db: SqlitePool, part_types: PartTypeSequence, ports_per_board: u32) -> Self {
        Self {
            ledger: AssemblyLedger::new(db, part_types, ports_per_board),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    let api = Router::new()
        .route("/api/chains", get(api::get_chains))
        .route("/api/edges", get(api::get_edges))
        .route("/api/ports/:antenna", get(api::get_ports))
        .route("/api/history/:part", get(api::get_history))
        .route("/api/audit", get(api::get_audit));

    Router::new()
        .merge(api)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
