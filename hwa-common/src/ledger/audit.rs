//! Graph invariant audit
//!
//! Re-checks the resolved graph against the connection rules. Writes made
//! through [`ConnectionValidator`](super::ConnectionValidator) keep these
//! holding; ledgers imported from older tools or written by racing scanners
//! may not.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use super::resolver::EdgeStateResolver;
use super::types::{Endpoint, PartTypeSequence, ResolvedEdge};
use crate::Result;

/// One broken invariant in the resolved graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// Endpoint has more than one connected outgoing edge
    FanOut { endpoint: Endpoint, targets: Vec<Endpoint> },
    /// Endpoint has more than one connected incoming edge
    FanIn { endpoint: Endpoint, sources: Vec<Endpoint> },
    /// Source-only type appears as a target
    SourceOnlyTarget { endpoint: Endpoint, part_type: String },
    /// Sink-only type appears as a source
    SinkOnlySource { endpoint: Endpoint, part_type: String },
    /// Connected endpoints whose types are not adjacent in order
    NonAdjacentTypes {
        source: Endpoint,
        source_type: String,
        target: Endpoint,
        target_type: String,
    },
    /// Part recorded under more than one type
    InconsistentPartType { part_id: String, types: Vec<String> },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::FanOut { endpoint, targets } => {
                write!(f, "fan-out: {} -> {}", endpoint, join(targets))
            }
            Violation::FanIn { endpoint, sources } => {
                write!(f, "fan-in: {} <- {}", endpoint, join(sources))
            }
            Violation::SourceOnlyTarget { endpoint, part_type } => {
                write!(f, "source-only {} {} is a connection target", part_type, endpoint)
            }
            Violation::SinkOnlySource { endpoint, part_type } => {
                write!(f, "sink-only {} {} is a connection source", part_type, endpoint)
            }
            Violation::NonAdjacentTypes {
                source,
                source_type,
                target,
                target_type,
            } => write!(
                f,
                "non-adjacent types: {} ({}) -> {} ({})",
                source, source_type, target, target_type
            ),
            Violation::InconsistentPartType { part_id, types } => {
                write!(f, "inconsistent type: {} recorded as {}", part_id, types.join(", "))
            }
        }
    }
}

fn join(endpoints: &[Endpoint]) -> String {
    endpoints
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Check `edges` against `types`
///
/// Part types are compared across every edge given, disconnected ones
/// included. Role, order and fan rules apply to connected edges only.
pub fn audit_edges(types: &PartTypeSequence, edges: &[ResolvedEdge]) -> Vec<Violation> {
    let mut violations = part_type_conflicts(edges);
    let mut targets_by_source: Vec<(Endpoint, Vec<Endpoint>)> = Vec::new();
    let mut sources_by_target: Vec<(Endpoint, Vec<Endpoint>)> = Vec::new();
    let mut out_index: HashMap<Endpoint, usize> = HashMap::new();
    let mut in_index: HashMap<Endpoint, usize> = HashMap::new();

    for edge in edges.iter().filter(|e| e.is_connected()) {
        let source = edge.source();
        let target = edge.target();
        let event = &edge.event;

        if types.is_sink_only(&event.part_type) {
            violations.push(Violation::SinkOnlySource {
                endpoint: source.clone(),
                part_type: event.part_type.clone(),
            });
        }
        if types.is_source_only(&event.peer_type) {
            violations.push(Violation::SourceOnlyTarget {
                endpoint: target.clone(),
                part_type: event.peer_type.clone(),
            });
        }
        if !types.is_adjacent(&event.part_type, &event.peer_type) {
            violations.push(Violation::NonAdjacentTypes {
                source: source.clone(),
                source_type: event.part_type.clone(),
                target: target.clone(),
                target_type: event.peer_type.clone(),
            });
        }

        let i = *out_index.entry(source.clone()).or_insert_with(|| {
            targets_by_source.push((source.clone(), Vec::new()));
            targets_by_source.len() - 1
        });
        targets_by_source[i].1.push(target.clone());

        let j = *in_index.entry(target.clone()).or_insert_with(|| {
            sources_by_target.push((target.clone(), Vec::new()));
            sources_by_target.len() - 1
        });
        sources_by_target[j].1.push(source);
    }

    for (endpoint, targets) in targets_by_source {
        if targets.len() > 1 {
            violations.push(Violation::FanOut { endpoint, targets });
        }
    }
    for (endpoint, sources) in sources_by_target {
        if sources.len() > 1 {
            violations.push(Violation::FanIn { endpoint, sources });
        }
    }

    violations
}

fn part_type_conflicts(edges: &[ResolvedEdge]) -> Vec<Violation> {
    let mut seen: Vec<(String, Vec<String>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for event in edges.iter().map(|e| &e.event) {
        for (part_id, part_type) in [
            (&event.part_id, &event.part_type),
            (&event.peer_id, &event.peer_type),
        ] {
            let i = *index.entry(part_id.clone()).or_insert_with(|| {
                seen.push((part_id.clone(), Vec::new()));
                seen.len() - 1
            });
            let known = &mut seen[i].1;
            if !known.iter().any(|t| t.eq_ignore_ascii_case(part_type)) {
                known.push(part_type.clone());
            }
        }
    }

    seen.into_iter()
        .filter(|(_, types)| types.len() > 1)
        .map(|(part_id, types)| Violation::InconsistentPartType { part_id, types })
        .collect()
}

/// Audit the whole ledger's current state
pub async fn audit(resolver: &EdgeStateResolver, types: &PartTypeSequence) -> Result<Vec<Violation>> {
    let edges = resolver.resolved_edges().await?;
    Ok(audit_edges(types, &edges))
}
