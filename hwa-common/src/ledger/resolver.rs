//! Latest-state-per-edge resolution
//!
//! The one place the "most recent event wins per unordered pair" rule lives.
//! The winner is the event with the greatest `(event_time, sequence_id)`
//! among all events whose endpoints canonicalize to the same [`EdgeKey`].
//! Every other component reads the graph through here.

use sqlx::SqliteConnection;
use std::collections::BTreeMap;
use tracing::warn;

use super::event_log::{self, EventLog};
use super::types::{AssemblyEvent, ConnectionStatus, EdgeKey, Endpoint, ResolvedEdge};
use crate::Result;

/// Collapse any set of events into one resolved edge per EdgeKey
///
/// Result is ordered by the winning event's sequence id.
pub fn resolve_edges<'a, I>(events: I) -> Vec<ResolvedEdge>
where
    I: IntoIterator<Item = &'a AssemblyEvent>,
{
    let mut latest: BTreeMap<EdgeKey, &AssemblyEvent> = BTreeMap::new();

    for event in events {
        let key = EdgeKey::for_event(event);
        match latest.get(&key) {
            Some(current) if current.recency() >= event.recency() => {}
            _ => {
                latest.insert(key, event);
            }
        }
    }

    let mut edges: Vec<ResolvedEdge> = latest
        .into_iter()
        .map(|(key, event)| ResolvedEdge {
            key,
            event: event.clone(),
        })
        .collect();
    edges.sort_by_key(|e| e.event.sequence_id);
    edges
}

/// Winning event for the pair `a`/`b` among `events`
pub fn resolve_pair_in(events: &[AssemblyEvent], a: &Endpoint, b: &Endpoint) -> Option<ResolvedEdge> {
    let key = EdgeKey::new(a.clone(), b.clone());
    let events = events.iter().filter(|e| EdgeKey::for_event(e) == key);
    resolve_edges(events).into_iter().next()
}

/// Source end of `edge`
///
/// A connected edge takes its direction from the winning event. A
/// disconnected one keeps the direction it was last connected in, since a
/// disconnect may be scanned from either end.
pub fn source_of(events: &[AssemblyEvent], edge: &ResolvedEdge) -> Endpoint {
    if edge.is_connected() {
        return edge.source();
    }
    events
        .iter()
        .filter(|e| e.status == ConnectionStatus::Connected && EdgeKey::for_event(e) == edge.key)
        .max_by_key(|e| e.recency())
        .map(AssemblyEvent::part)
        .unwrap_or_else(|| edge.source())
}

/// Resolved edges (any status) leaving `endpoint`
pub fn outgoing_in(events: &[AssemblyEvent], endpoint: &Endpoint) -> Vec<ResolvedEdge> {
    resolve_edges(events.iter().filter(|e| e.touches(&endpoint.id)))
        .into_iter()
        .filter(|edge| &source_of(events, edge) == endpoint)
        .collect()
}

/// Resolved edges (any status) arriving at `endpoint`
pub fn incoming_in(events: &[AssemblyEvent], endpoint: &Endpoint) -> Vec<ResolvedEdge> {
    resolve_edges(events.iter().filter(|e| e.touches(&endpoint.id)))
        .into_iter()
        .filter(|edge| edge.key.contains(endpoint) && &source_of(events, edge) != endpoint)
        .collect()
}

/// The connected edge among `edges`, if any
///
/// More than one means the ledger already violates the fan limits (history
/// written before writes were serialized); the most recent one is used and
/// the anomaly logged.
pub fn pick_connected(edges: Vec<ResolvedEdge>, endpoint: &Endpoint, role: &str) -> Option<ResolvedEdge> {
    let mut connected: Vec<ResolvedEdge> = edges.into_iter().filter(ResolvedEdge::is_connected).collect();

    if connected.len() > 1 {
        warn!(
            endpoint = %endpoint,
            role,
            count = connected.len(),
            "Multiple connected edges resolved for one endpoint; using most recent"
        );
    }

    connected.sort_by_key(|e| e.event.recency());
    connected.pop()
}

/// Read-side view of the ledger as current connection state
#[derive(Debug, Clone)]
pub struct EdgeStateResolver {
    log: EventLog,
}

impl EdgeStateResolver {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Authoritative event for the unordered pair, or `None` if never scanned
    pub async fn resolve_pair(&self, a: &Endpoint, b: &Endpoint) -> Result<Option<ResolvedEdge>> {
        let mut conn = self.log.pool().acquire().await?;
        resolve_pair_on(&mut conn, a, b).await
    }

    /// Every resolved edge (any status) leaving `endpoint`
    pub async fn outgoing_edges(&self, endpoint: &Endpoint) -> Result<Vec<ResolvedEdge>> {
        let events = self.log.events_touching(&endpoint.id).await?;
        Ok(outgoing_in(&events, endpoint))
    }

    /// Current connected edge leaving `endpoint`, if any
    pub async fn resolve_outgoing(&self, endpoint: &Endpoint) -> Result<Option<ResolvedEdge>> {
        let mut conn = self.log.pool().acquire().await?;
        resolve_outgoing_on(&mut conn, endpoint).await
    }

    /// Current connected edge arriving at `endpoint`, if any
    pub async fn resolve_incoming(&self, endpoint: &Endpoint) -> Result<Option<ResolvedEdge>> {
        let mut conn = self.log.pool().acquire().await?;
        resolve_incoming_on(&mut conn, endpoint).await
    }

    /// One resolved edge per pair ever scanned, in resolution order
    pub async fn resolved_edges(&self) -> Result<Vec<ResolvedEdge>> {
        let events = self.log.all_events().await?;
        Ok(resolve_edges(&events))
    }

    /// Resolved edges whose status is connected, in resolution order
    pub async fn connected_edges(&self) -> Result<Vec<ResolvedEdge>> {
        Ok(self
            .resolved_edges()
            .await?
            .into_iter()
            .filter(ResolvedEdge::is_connected)
            .collect())
    }
}

pub(crate) async fn resolve_pair_on(
    conn: &mut SqliteConnection,
    a: &Endpoint,
    b: &Endpoint,
) -> Result<Option<ResolvedEdge>> {
    let events = event_log::events_touching_on(conn, &a.id).await?;
    Ok(resolve_pair_in(&events, a, b))
}

pub(crate) async fn resolve_outgoing_on(
    conn: &mut SqliteConnection,
    endpoint: &Endpoint,
) -> Result<Option<ResolvedEdge>> {
    let events = event_log::events_touching_on(conn, &endpoint.id).await?;
    Ok(pick_connected(outgoing_in(&events, endpoint), endpoint, "outgoing"))
}

pub(crate) async fn resolve_incoming_on(
    conn: &mut SqliteConnection,
    endpoint: &Endpoint,
) -> Result<Option<ResolvedEdge>> {
    let events = event_log::events_touching_on(conn, &endpoint.id).await?;
    Ok(pick_connected(incoming_in(&events, endpoint), endpoint, "incoming"))
}
