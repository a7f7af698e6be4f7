//! Chain building for reports
//!
//! Partitions the endpoints of all connected resolved edges into chains.
//! Roots are endpoints with no connected incoming edge; each root is walked
//! breadth-first along outgoing edges. Endpoints never reached from a root
//! (only possible inside a cycle) become single-element chains, so every
//! endpoint lands in exactly one chain.

use std::collections::{HashMap, HashSet, VecDeque};

use super::resolver::EdgeStateResolver;
use super::types::{Endpoint, ResolvedEdge};
use crate::Result;

/// Ordered endpoints from a source toward a terminus
pub type Chain = Vec<Endpoint>;

/// Build chains from resolved edges (non-connected edges are ignored)
///
/// Chains are ordered by when their root was first observed in `edges`;
/// `edges` is expected in resolution order.
pub fn build_chains(edges: &[ResolvedEdge]) -> Vec<Chain> {
    let mut observed: Vec<Endpoint> = Vec::new();
    let mut seen: HashSet<Endpoint> = HashSet::new();
    let mut outgoing: HashMap<Endpoint, Vec<Endpoint>> = HashMap::new();
    let mut has_incoming: HashSet<Endpoint> = HashSet::new();

    for edge in edges.iter().filter(|e| e.is_connected()) {
        let source = edge.source();
        let target = edge.target();

        for endpoint in [&source, &target] {
            if seen.insert(endpoint.clone()) {
                observed.push(endpoint.clone());
            }
        }

        has_incoming.insert(target.clone());
        outgoing.entry(source).or_default().push(target);
    }

    let mut visited: HashSet<Endpoint> = HashSet::new();
    let mut chains: Vec<Chain> = Vec::new();

    for root in observed.iter().filter(|e| !has_incoming.contains(*e)) {
        if visited.contains(root) {
            continue;
        }

        let mut chain = vec![root.clone()];
        visited.insert(root.clone());
        let mut queue = VecDeque::from([root.clone()]);

        while let Some(current) = queue.pop_front() {
            let Some(nexts) = outgoing.get(&current) else {
                continue;
            };
            for next in nexts {
                // Cycle guard
                if visited.insert(next.clone()) {
                    chain.push(next.clone());
                    queue.push_back(next.clone());
                }
            }
        }

        chains.push(chain);
    }

    for endpoint in observed {
        if visited.insert(endpoint.clone()) {
            chains.push(vec![endpoint]);
        }
    }

    chains
}

/// `ANT001P1 -> LNA001P1 -> ...`
pub fn render_chain(chain: &[Endpoint]) -> String {
    chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// One chain per line
pub fn render_report(chains: &[Chain]) -> String {
    let mut report = String::new();
    for chain in chains {
        report.push_str(&render_chain(chain));
        report.push('\n');
    }
    report
}

/// Builds the chain report from the current ledger state
#[derive(Debug, Clone)]
pub struct ChainBuilder {
    resolver: EdgeStateResolver,
}

impl ChainBuilder {
    pub fn new(resolver: EdgeStateResolver) -> Self {
        Self { resolver }
    }

    pub async fn all_chains(&self) -> Result<Vec<Chain>> {
        let edges = self.resolver.connected_edges().await?;
        Ok(build_chains(&edges))
    }
}
