//! Connection rule engine
//!
//! Decides whether a proposed connection may be appended. Role and type
//! order rules are checked first (they need no storage), then the ledger is
//! consulted for recorded part types and fan-in/fan-out conflicts. The checks and the
//! append run inside one `BEGIN IMMEDIATE` transaction so two scanners
//! cannot both pass the fan-in check for the same target.

use sqlx::SqliteConnection;
use tracing::{debug, info};

use super::event_log::{self, EventLog};
use super::resolver::{self, EdgeStateResolver};
use super::types::{ConnectionRequest, ConnectionStatus, PartTypeSequence, ResolvedEdge};
use crate::{Error, Result};

/// Validates and records connection changes
#[derive(Debug, Clone)]
pub struct ConnectionValidator {
    types: PartTypeSequence,
    resolver: EdgeStateResolver,
}

impl ConnectionValidator {
    pub fn new(types: PartTypeSequence, log: EventLog) -> Self {
        Self {
            types,
            resolver: EdgeStateResolver::new(log),
        }
    }

    pub fn part_types(&self) -> &PartTypeSequence {
        &self.types
    }

    pub fn resolver(&self) -> &EdgeStateResolver {
        &self.resolver
    }

    /// Role and type-order rules for `request`
    ///
    /// Direction is checked before type order so that anything originating
    /// at the terminal type reports `IllegalDirection` rather than "no
    /// successor".
    pub fn check_types(&self, request: &ConnectionRequest) -> Result<()> {
        if self.types.is_sink_only(&request.source_type) {
            return Err(Error::IllegalDirection {
                part_id: request.source().to_string(),
                part_type: request.source_type.clone(),
                reason: format!(
                    "is a sink-only {} and cannot originate a connection",
                    self.types.last()
                ),
            });
        }

        if self.types.is_source_only(&request.target_type) {
            return Err(Error::IllegalDirection {
                part_id: request.target().to_string(),
                part_type: request.target_type.clone(),
                reason: format!(
                    "is a source-only {} and cannot receive a connection",
                    self.types.first()
                ),
            });
        }

        if !self.types.is_adjacent(&request.source_type, &request.target_type) {
            let expected = self
                .types
                .successor(&request.source_type)
                .unwrap_or("nothing (unknown source type)")
                .to_string();
            return Err(Error::IllegalTypeTransition {
                source_id: request.source().to_string(),
                source_type: request.source_type.clone(),
                target_id: request.target().to_string(),
                target_type: request.target_type.clone(),
                expected,
            });
        }

        Ok(())
    }

    /// Validate and append a `Connected` event; returns its sequence id
    pub async fn record(&self, request: &ConnectionRequest) -> Result<i64> {
        self.check_types(request)?;

        let mut txn = self.resolver.log().begin_immediate().await?;
        let result = self.record_in(txn.conn(), request).await;
        let sequence_id = txn.finish(result).await?;

        info!(
            sequence_id,
            source = %request.source(),
            target = %request.target(),
            "Recorded connection"
        );
        Ok(sequence_id)
    }

    /// Append a `Disconnected` event for a currently connected pair
    pub async fn disconnect(&self, request: &ConnectionRequest) -> Result<i64> {
        let mut txn = self.resolver.log().begin_immediate().await?;
        let result = self.disconnect_in(txn.conn(), request).await;
        let sequence_id = txn.finish(result).await?;

        info!(
            sequence_id,
            source = %request.source(),
            target = %request.target(),
            "Recorded disconnection"
        );
        Ok(sequence_id)
    }

    async fn record_in(&self, conn: &mut SqliteConnection, request: &ConnectionRequest) -> Result<i64> {
        let source = request.source();
        let target = request.target();

        check_recorded_type(conn, &request.source_id, &request.source_type).await?;
        check_recorded_type(conn, &request.target_id, &request.target_type).await?;

        let current = resolver::resolve_pair_on(conn, &source, &target).await?;
        check_not_stale(current.as_ref(), request)?;

        if let Some(existing) = resolver::resolve_outgoing_on(conn, &source).await? {
            if existing.target() != target {
                return Err(Error::DuplicateOutgoing {
                    source_id: source.to_string(),
                    existing_target: existing.target().to_string(),
                });
            }
        }

        if let Some(existing) = resolver::resolve_incoming_on(conn, &target).await? {
            if existing.source() != source {
                return Err(Error::DuplicateIncoming {
                    target_id: target.to_string(),
                    existing_source: existing.source().to_string(),
                });
            }
        }

        if current.as_ref().is_some_and(ResolvedEdge::is_connected) {
            debug!(source = %source, target = %target, "Pair already connected; appending confirmation");
        }

        event_log::append_on(conn, &request.to_event(ConnectionStatus::Connected)).await
    }

    async fn disconnect_in(&self, conn: &mut SqliteConnection, request: &ConnectionRequest) -> Result<i64> {
        let source = request.source();
        let target = request.target();

        check_recorded_type(conn, &request.source_id, &request.source_type).await?;
        check_recorded_type(conn, &request.target_id, &request.target_type).await?;

        let current = resolver::resolve_pair_on(conn, &source, &target).await?;
        match current.as_ref() {
            Some(edge) if edge.is_connected() => {}
            _ => {
                return Err(Error::NotConnected {
                    part_id: source.to_string(),
                    peer_id: target.to_string(),
                })
            }
        }
        check_not_stale(current.as_ref(), request)?;

        event_log::append_on(conn, &request.to_event(ConnectionStatus::Disconnected)).await
    }
}

/// A part keeps the type it was first scanned with
async fn check_recorded_type(conn: &mut SqliteConnection, part_id: &str, claimed_type: &str) -> Result<()> {
    let events = event_log::events_touching_on(conn, part_id).await?;
    match events.iter().find_map(|e| e.type_of(part_id)) {
        Some(recorded) if !recorded.trim().eq_ignore_ascii_case(claimed_type.trim()) => {
            Err(Error::PartTypeMismatch {
                part_id: part_id.to_string(),
                claimed_type: claimed_type.to_string(),
                recorded_type: recorded.to_string(),
            })
        }
        _ => Ok(()),
    }
}

/// A proposal older than the pair's resolved event could never take effect
fn check_not_stale(current: Option<&ResolvedEdge>, request: &ConnectionRequest) -> Result<()> {
    match current {
        Some(edge) if request.event_time < edge.event.event_time => Err(Error::StaleEvent {
            part_id: request.source().to_string(),
            peer_id: request.target().to_string(),
            event_time: request.event_time.to_rfc3339(),
            resolved_time: edge.event.event_time.to_rfc3339(),
        }),
        _ => Ok(()),
    }
}
