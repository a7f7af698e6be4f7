//! Integration tests for hwa-dr API endpoints
//!
//! Each test writes a small ledger through a read-write pool, then serves it
//! through the read-only connection the binary uses.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use chrono::{TimeZone, Utc};
use hwa_common::db::{init_database, BoardConfig};
use hwa_common::ledger::{AssemblyLedger, PartTypeSequence};
use hwa_common::{ConnectionRequest, Polarization};
use serde_json::Value;
use sqlx::SqlitePool;
use tempfile::TempDir;
use hwa_dr::{build_router, AppState};
use tower::util::ServiceExt; // for `oneshot` method

fn part_types() -> PartTypeSequence {
    PartTypeSequence::new(["Antenna", "Amplifier", "Backplane", "Digitizer"]).unwrap()
}

fn link(src: &str, src_type: &str, dst: &str, dst_type: &str, minute: u32) -> ConnectionRequest {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap();
    ConnectionRequest {
        source_id: src.to_string(),
        source_type: src_type.to_string(),
        source_polarization: Polarization::P1,
        event_time: at,
        target_id: dst.to_string(),
        target_type: dst_type.to_string(),
        target_polarization: Polarization::P1,
        target_event_time: at,
    }
}

/// Test helper: ledger with ANT001 P1 assembled down to SNAP2C05
///
/// The writer pool is returned so it stays open alongside the read-only
/// connection, as the scanner does in production.
async fn setup_test_db() -> (TempDir, SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("hwa.db")).await.unwrap();
    let ledger = AssemblyLedger::new(pool.clone(), part_types(), 12);

    ledger.record(&link("ANT001", "Antenna", "LNA001", "Amplifier", 0)).await.unwrap();
    ledger.record(&link("LNA001", "Amplifier", "BRD001", "Backplane", 1)).await.unwrap();
    ledger.record(&link("BRD001", "Backplane", "SNAP2C05", "Digitizer", 2)).await.unwrap();
    ledger
        .boards()
        .upsert(&BoardConfig {
            chassis: 2,
            slot: 'C',
            ip_address: "10.0.2.3".to_string(),
            serial: "SNAP-0042".to_string(),
            engine_id: 7,
        })
        .await
        .unwrap();

    (dir, pool)
}

/// Test helper: router over a read-only connection to the test ledger
async fn setup_app(dir: &TempDir) -> axum::Router {
    let pool = hwa_dr::db::connect_readonly(&dir.path().join("hwa.db"))
        .await
        .expect("Should connect to test database");
    build_router(AppState::new(pool, part_types(), 12))
}

fn test_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn extract_body(body: Body) -> Vec<u8> {
    axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body")
        .to_vec()
}

async fn extract_json(body: Body) -> Value {
    serde_json::from_slice(&extract_body(body).await).expect("Should parse JSON")
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (dir, _writer) = setup_test_db().await;
    let app = setup_app(&dir).await;

    let response = app.oneshot(test_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "hwa-dr");
    assert!(body["version"].is_string());
}

// =============================================================================
// Ledger views
// =============================================================================

#[tokio::test]
async fn test_chains_is_plain_text_report() {
    let (dir, _writer) = setup_test_db().await;
    let app = setup_app(&dir).await;

    let response = app.oneshot(test_request("/api/chains")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = String::from_utf8(extract_body(response.into_body()).await).unwrap();
    assert_eq!(body, "ANT001P1 -> LNA001P1 -> BRD001P1 -> SNAP2C05P1\n");
}

#[tokio::test]
async fn test_edges_lists_connected_edges() {
    let (dir, _writer) = setup_test_db().await;
    let app = setup_app(&dir).await;

    let response = app.oneshot(test_request("/api/edges")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    let edges = body.as_array().unwrap();
    assert_eq!(edges.len(), 3);
    assert_eq!(edges[0]["event"]["part_id"], "ANT001");
    assert_eq!(edges[0]["event"]["status"], "connected");
}

#[tokio::test]
async fn test_ports_resolves_with_board_routing() {
    let (dir, _writer) = setup_test_db().await;
    let app = setup_app(&dir).await;

    let response = app.oneshot(test_request("/api/ports/ANT001")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    let p1 = &body["polarization_1"];
    assert_eq!(p1["outcome"], "resolved");
    assert_eq!(p1["hardware_address"]["chassis"], 2);
    assert_eq!(p1["hardware_address"]["slot"], "C");
    assert_eq!(p1["hardware_address"]["port"], 5);
    assert_eq!(p1["chain_path"], serde_json::json!(["ANT001", "LNA001", "BRD001", "SNAP2C05"]));
    assert_eq!(p1["board_routing"]["packet_index"], 89);

    assert_eq!(body["polarization_2"]["outcome"], "incomplete");
    assert_eq!(body["polarization_2"]["stop"]["reason"], "unassembled");
}

#[tokio::test]
async fn test_history_for_known_and_unknown_parts() {
    let (dir, _writer) = setup_test_db().await;
    let app = setup_app(&dir).await;

    let response = app.clone().oneshot(test_request("/api/history/LNA001")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let response = app.oneshot(test_request("/api/history/NOPE001")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_audit_reports_clean_graph() {
    let (dir, _writer) = setup_test_db().await;
    let app = setup_app(&dir).await;

    let response = app.oneshot(test_request("/api/audit")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["count"], 0);
    assert!(body["violations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (dir, _writer) = setup_test_db().await;
    let app = setup_app(&dir).await;

    let response = app.oneshot(test_request("/api/nothing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
