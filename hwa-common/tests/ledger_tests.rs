//! Integration tests for the assembly ledger against an on-disk database
//!
//! Covers the full write path (validation + append), port resolution with
//! board routing, the chain report and concurrent writers.

use chrono::{DateTime, TimeZone, Utc};
use hwa_common::db::{init_database, BoardConfig};
use hwa_common::ledger::{
    render_report, AssemblyLedger, ConnectionRequest, Endpoint, PartTypeSequence, PortWalk, WalkStop,
};
use hwa_common::{ConnectionStatus, Error, Polarization};
use std::collections::HashSet;
use tempfile::TempDir;

/// Test helper: ledger on a fresh database file
async fn setup_ledger(types: PartTypeSequence) -> (TempDir, AssemblyLedger) {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("hwa.db")).await.unwrap();
    (dir, AssemblyLedger::new(pool, types, 12))
}

fn short_sequence() -> PartTypeSequence {
    PartTypeSequence::new(["Antenna", "Amplifier", "Backplane", "Digitizer"]).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn connect(
    src: &str,
    src_type: &str,
    dst: &str,
    dst_type: &str,
    pol: Polarization,
    secs: i64,
) -> ConnectionRequest {
    ConnectionRequest {
        source_id: src.to_string(),
        source_type: src_type.to_string(),
        source_polarization: pol,
        event_time: at(secs),
        target_id: dst.to_string(),
        target_type: dst_type.to_string(),
        target_polarization: pol,
        target_event_time: at(secs),
    }
}

async fn assemble_ant001(ledger: &AssemblyLedger, pol: Polarization, snap: &str) {
    ledger
        .record(&connect("ANT001", "Antenna", "LNA001", "Amplifier", pol, 1))
        .await
        .unwrap();
    ledger
        .record(&connect("LNA001", "Amplifier", "BRD001", "Backplane", pol, 2))
        .await
        .unwrap();
    ledger
        .record(&connect("BRD001", "Backplane", snap, "Digitizer", pol, 3))
        .await
        .unwrap();
}

// =============================================================================
// End-to-end resolution
// =============================================================================

#[tokio::test]
async fn test_antenna_resolves_to_snap_port() {
    let (_dir, ledger) = setup_ledger(short_sequence()).await;
    assemble_ant001(&ledger, Polarization::P1, "SNAP2C05").await;

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

    let ports = ledger.resolve_ports("ANT001").await.unwrap();
    let p1 = ports.resolution(Polarization::P1).expect("P1 should resolve");

    assert_eq!(p1.hardware_address.chassis, 2);
    assert_eq!(p1.hardware_address.slot, 'C');
    assert_eq!(p1.hardware_address.port, 5);
    assert_eq!(p1.chain_path, vec!["ANT001", "LNA001", "BRD001", "SNAP2C05"]);

    let routing = p1.board_routing.as_ref().expect("board configured");
    assert_eq!(routing.ip_address, "10.0.2.3");
    assert_eq!(routing.packet_index, 7 * 12 + 5);

    // P2 was never scanned
    match ports.walk(Polarization::P2) {
        PortWalk::Incomplete(incomplete) => {
            assert_eq!(incomplete.chain_path, vec!["ANT001"]);
            assert!(matches!(incomplete.stop, WalkStop::Unassembled { .. }));
        }
        other => panic!("expected incomplete P2, got {:?}", other),
    }
}

#[tokio::test]
async fn test_polarizations_resolve_independently() {
    let (_dir, ledger) = setup_ledger(short_sequence()).await;
    assemble_ant001(&ledger, Polarization::P1, "SNAP1A00").await;
    assemble_ant001(&ledger, Polarization::P2, "SNAP1A01").await;

    let ports = ledger.resolve_ports("ANT001").await.unwrap();
    assert_eq!(ports.resolution(Polarization::P1).unwrap().hardware_address.port, 0);
    assert_eq!(ports.resolution(Polarization::P2).unwrap().hardware_address.port, 1);

    // No board config: still resolved, just without routing
    assert!(ports.resolution(Polarization::P1).unwrap().board_routing.is_none());
}

#[tokio::test]
async fn test_malformed_address_does_not_abort_other_polarization() {
    let (_dir, ledger) = setup_ledger(short_sequence()).await;
    assemble_ant001(&ledger, Polarization::P1, "SNAP9Z99").await;
    assemble_ant001(&ledger, Polarization::P2, "SNAP3B10").await;

    let ports = ledger.resolve_ports("ANT001").await.unwrap();

    match ports.walk(Polarization::P1) {
        PortWalk::Incomplete(incomplete) => {
            assert!(matches!(incomplete.stop, WalkStop::MalformedAddress { ref id, .. } if id == "SNAP9Z99"));
            assert_eq!(incomplete.chain_path.last().map(String::as_str), Some("SNAP9Z99"));
        }
        other => panic!("expected malformed P1, got {:?}", other),
    }
    assert_eq!(ports.resolution(Polarization::P2).unwrap().hardware_address.port, 10);
}

#[tokio::test]
async fn test_disconnected_link_reported_in_walk() {
    let (_dir, ledger) = setup_ledger(short_sequence()).await;
    assemble_ant001(&ledger, Polarization::P1, "SNAP2C05").await;
    ledger
        .disconnect(&connect("LNA001", "Amplifier", "BRD001", "Backplane", Polarization::P1, 4))
        .await
        .unwrap();

    let ports = ledger.resolve_ports("ANT001").await.unwrap();
    match ports.walk(Polarization::P1) {
        PortWalk::Incomplete(incomplete) => {
            assert_eq!(incomplete.chain_path, vec!["ANT001", "LNA001"]);
            match &incomplete.stop {
                WalkStop::Disconnected { at, peer } => {
                    assert_eq!(at.id, "LNA001");
                    assert_eq!(peer.id, "BRD001");
                }
                other => panic!("expected Disconnected, got {:?}", other),
            }
        }
        other => panic!("expected incomplete, got {:?}", other),
    }
}

// =============================================================================
// Write path rules
// =============================================================================

#[tokio::test]
async fn test_disconnect_reconnect_round_trip() {
    let (_dir, ledger) = setup_ledger(PartTypeSequence::default()).await;
    let a = Endpoint::new("ANT001", Polarization::P1);
    let b = Endpoint::new("LNA001", Polarization::P1);

    ledger
        .record(&connect("ANT001", "Antenna", "LNA001", "Amplifier", Polarization::P1, 1))
        .await
        .unwrap();
    ledger
        .disconnect(&connect("ANT001", "Antenna", "LNA001", "Amplifier", Polarization::P1, 2))
        .await
        .unwrap();
    ledger
        .record(&connect("ANT001", "Antenna", "LNA001", "Amplifier", Polarization::P1, 3))
        .await
        .unwrap();

    let edge = ledger.resolve_pair(&a, &b).await.unwrap().unwrap();
    assert_eq!(edge.status(), ConnectionStatus::Connected);
    assert_eq!(ledger.history("ANT001").await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_type_order_enforced() {
    let (_dir, ledger) = setup_ledger(PartTypeSequence::default()).await;

    let err = ledger
        .record(&connect("ANT001", "Antenna", "CBL001", "Cable", Polarization::P1, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IllegalTypeTransition { .. }));

    let err = ledger
        .record(&connect("SNAP1A00", "Digitizer", "BRD001", "Backplane", Polarization::P1, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IllegalDirection { .. }));

    assert!(ledger.log().is_empty().await.unwrap());
}

#[tokio::test]
async fn test_part_keeps_its_first_scanned_type() {
    let (_dir, ledger) = setup_ledger(PartTypeSequence::default()).await;
    ledger
        .record(&connect("ANT001", "Antenna", "LNA001", "Amplifier", Polarization::P1, 1))
        .await
        .unwrap();

    let err = ledger
        .record(&connect("LNA002", "Amplifier", "ANT001", "Cable", Polarization::P1, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PartTypeMismatch { ref part_id, .. } if part_id == "ANT001"));
    assert!(err.to_string().contains("Antenna"));

    assert_eq!(ledger.log().len().await.unwrap(), 1);
    assert!(ledger.audit().await.unwrap().is_empty());
    let chains = ledger.all_chains().await.unwrap();
    assert_eq!(render_report(&chains), "ANT001P1 -> LNA001P1\n");
}

#[tokio::test]
async fn test_fan_limits_hold_after_any_successful_writes() {
    let (_dir, ledger) = setup_ledger(PartTypeSequence::default()).await;

    let attempts = [
        ("ANT001", "Antenna", "LNA001", "Amplifier"),
        ("ANT001", "Antenna", "LNA002", "Amplifier"),
        ("ANT002", "Antenna", "LNA001", "Amplifier"),
        ("ANT002", "Antenna", "LNA002", "Amplifier"),
        ("LNA001", "Amplifier", "CBL001", "Cable"),
        ("LNA002", "Amplifier", "CBL001", "Cable"),
        ("LNA002", "Amplifier", "CBL002", "Cable"),
    ];
    for (i, (s, st, t, tt)) in attempts.iter().enumerate() {
        let _ = ledger
            .record(&connect(s, st, t, tt, Polarization::P1, i as i64))
            .await;
    }

    assert!(ledger.audit().await.unwrap().is_empty());

    let edges = ledger.connected_edges().await.unwrap();
    assert_eq!(edges.len(), 4);
    let sources: HashSet<_> = edges.iter().map(|e| e.source()).collect();
    let targets: HashSet<_> = edges.iter().map(|e| e.target()).collect();
    assert_eq!(sources.len(), edges.len());
    assert_eq!(targets.len(), edges.len());
}

#[tokio::test]
async fn test_concurrent_writers_cannot_both_claim_a_target() {
    let (_dir, ledger) = setup_ledger(PartTypeSequence::default()).await;
    let first = ledger.clone();
    let second = ledger.clone();

    let (a, b) = tokio::join!(
        async move {
            first
                .record(&connect("ANT001", "Antenna", "LNA001", "Amplifier", Polarization::P1, 1))
                .await
        },
        async move {
            second
                .record(&connect("ANT002", "Antenna", "LNA001", "Amplifier", Polarization::P1, 1))
                .await
        },
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1, "exactly one writer should win: {:?} / {:?}", a, b);
    assert!(ledger.audit().await.unwrap().is_empty());
    assert_eq!(ledger.log().len().await.unwrap(), 1);
}

// =============================================================================
// Chain report
// =============================================================================

#[tokio::test]
async fn test_all_chains_partition_connected_endpoints() {
    let (_dir, ledger) = setup_ledger(short_sequence()).await;
    assemble_ant001(&ledger, Polarization::P1, "SNAP2C05").await;
    ledger
        .record(&connect("ANT002", "Antenna", "LNA002", "Amplifier", Polarization::P2, 5))
        .await
        .unwrap();
    ledger
        .record(&connect("ANT003", "Antenna", "LNA003", "Amplifier", Polarization::P1, 6))
        .await
        .unwrap();
    ledger
        .disconnect(&connect("ANT003", "Antenna", "LNA003", "Amplifier", Polarization::P1, 7))
        .await
        .unwrap();

    let chains = ledger.all_chains().await.unwrap();
    assert_eq!(chains.len(), 2);

    let rendered: Vec<String> = chains.iter().map(|c| hwa_common::ledger::render_chain(c)).collect();
    assert_eq!(rendered[0], "ANT001P1 -> LNA001P1 -> BRD001P1 -> SNAP2C05P1");
    assert_eq!(rendered[1], "ANT002P2 -> LNA002P2");

    let mut members: Vec<Endpoint> = chains.into_iter().flatten().collect();
    let total = members.len();
    members.sort();
    members.dedup();
    assert_eq!(members.len(), total, "no endpoint in two chains");
    assert_eq!(total, 6);
}
