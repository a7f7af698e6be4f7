//! Digitizer port resolution
//!
//! Walks connected edges forward from any endpoint until it reaches a
//! digitizer identifier (`SNAP` + chassis `1-4` + slot `A-K` + port `00-11`),
//! decodes the hardware address and attaches the board routing from the
//! board configuration table.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

use super::resolver::{pick_connected, EdgeStateResolver};
use super::types::{Endpoint, Polarization};
use crate::db::BoardConfigStore;
use crate::{Error, Result};

/// Prefix shared by every digitizer identifier
pub const DIGITIZER_PREFIX: &str = "SNAP";

/// Ports per digitizer board (`00`-`11`)
pub const DEFAULT_PORTS_PER_BOARD: u32 = 12;

/// True if `id` claims to be a digitizer identifier
///
/// Only the prefix is checked; [`HardwareAddress::parse`] decides whether
/// the rest is well formed.
pub fn is_digitizer_id(id: &str) -> bool {
    id.starts_with(DIGITIZER_PREFIX)
}

/// Chassis/slot/port triple decoded from a digitizer identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct HardwareAddress {
    pub chassis: u8,
    pub slot: char,
    pub port: u8,
}

impl HardwareAddress {
    pub fn parse(id: &str) -> Result<Self> {
        let malformed = |reason: &str| Error::MalformedAddress {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        let rest = id
            .strip_prefix(DIGITIZER_PREFIX)
            .ok_or_else(|| malformed("missing SNAP prefix"))?;
        let chars: Vec<char> = rest.chars().collect();
        if chars.len() != 4 {
            return Err(malformed("expected chassis digit, slot letter and two-digit port"));
        }

        let chassis = chars[0]
            .to_digit(10)
            .filter(|c| (1..=4).contains(c))
            .ok_or_else(|| malformed("chassis must be 1-4"))? as u8;

        let slot = chars[1];
        if !('A'..='K').contains(&slot) {
            return Err(malformed("slot must be A-K"));
        }

        let port = match (chars[2].to_digit(10), chars[3].to_digit(10)) {
            (Some(tens), Some(ones)) => tens * 10 + ones,
            _ => return Err(malformed("port must be two digits")),
        };
        if port > 11 {
            return Err(malformed("port must be 00-11"));
        }

        Ok(Self {
            chassis,
            slot,
            port: port as u8,
        })
    }
}

impl fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}{:02}", DIGITIZER_PREFIX, self.chassis, self.slot, self.port)
    }
}

/// Network routing for the board a chain terminates on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardRouting {
    pub ip_address: String,
    pub serial: String,
    pub engine_id: u32,
    /// `engine_id * ports_per_board + port`
    pub packet_index: u64,
}

/// Fully resolved signal path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortResolution {
    pub hardware_address: HardwareAddress,
    /// Base identifiers from the start part to the digitizer, inclusive
    pub chain_path: Vec<String>,
    /// `None` when no board is configured at the chassis/slot
    pub board_routing: Option<BoardRouting>,
}

/// Why a walk stopped short of a digitizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum WalkStop {
    /// No edge has ever left this endpoint
    Unassembled { at: Endpoint },
    /// Last edge leaving this endpoint was disconnected
    Disconnected { at: Endpoint, peer: Endpoint },
    /// Reached a SNAP identifier that does not decode
    MalformedAddress { id: String, detail: String },
    /// Walk came back to an endpoint already on the path
    Cycle { at: Endpoint },
    /// Gave up after [`SnapPortResolver::MAX_DEPTH`] hops
    DepthExceeded { depth: usize },
}

impl fmt::Display for WalkStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkStop::Unassembled { at } => write!(f, "unassembled after {}", at),
            WalkStop::Disconnected { at, peer } => write!(f, "{} disconnected from {}", at, peer),
            WalkStop::MalformedAddress { id, detail } => write!(f, "malformed address {}: {}", id, detail),
            WalkStop::Cycle { at } => write!(f, "cycle at {}", at),
            WalkStop::DepthExceeded { depth } => write!(f, "no digitizer within {} hops", depth),
        }
    }
}

/// Partial path of a walk that stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncompleteChain {
    pub chain_path: Vec<String>,
    pub stop: WalkStop,
}

/// Outcome of walking one polarization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PortWalk {
    Resolved(PortResolution),
    Incomplete(IncompleteChain),
}

impl PortWalk {
    pub fn resolution(&self) -> Option<&PortResolution> {
        match self {
            PortWalk::Resolved(r) => Some(r),
            PortWalk::Incomplete(_) => None,
        }
    }

    pub fn chain_path(&self) -> &[String] {
        match self {
            PortWalk::Resolved(r) => &r.chain_path,
            PortWalk::Incomplete(i) => &i.chain_path,
        }
    }
}

/// Both polarizations of one antenna, resolved independently
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AntennaPorts {
    pub antenna: String,
    pub polarization_1: PortWalk,
    pub polarization_2: PortWalk,
}

impl AntennaPorts {
    pub fn walk(&self, pol: Polarization) -> &PortWalk {
        match pol {
            Polarization::P1 => &self.polarization_1,
            Polarization::P2 => &self.polarization_2,
        }
    }

    pub fn resolution(&self, pol: Polarization) -> Option<&PortResolution> {
        self.walk(pol).resolution()
    }
}

/// Resolves parts to the digitizer port their signal lands on
#[derive(Debug, Clone)]
pub struct SnapPortResolver {
    resolver: EdgeStateResolver,
    boards: BoardConfigStore,
    ports_per_board: u32,
}

impl SnapPortResolver {
    /// Hop limit for a single walk
    pub const MAX_DEPTH: usize = 10;

    pub fn new(resolver: EdgeStateResolver, boards: BoardConfigStore, ports_per_board: u32) -> Self {
        Self {
            resolver,
            boards,
            ports_per_board,
        }
    }

    /// Resolve both polarizations of `antenna_base_id`
    ///
    /// A walk that stops (including on a malformed address) does not affect
    /// the other polarization; only storage failures abort.
    pub async fn resolve_ports(&self, antenna_base_id: &str) -> Result<AntennaPorts> {
        let antenna = antenna_base_id.trim();
        let polarization_1 = self.walk(&Endpoint::new(antenna, Polarization::P1)).await?;
        let polarization_2 = self.walk(&Endpoint::new(antenna, Polarization::P2)).await?;

        Ok(AntennaPorts {
            antenna: antenna.to_string(),
            polarization_1,
            polarization_2,
        })
    }

    /// Follow connected edges from `start` to a digitizer
    pub async fn walk(&self, start: &Endpoint) -> Result<PortWalk> {
        let mut path = vec![start.id.clone()];
        let mut visited: HashSet<Endpoint> = HashSet::from([start.clone()]);
        let mut current = start.clone();

        if is_digitizer_id(&start.id) {
            return self.terminate(&start.id, path).await;
        }

        for _ in 0..Self::MAX_DEPTH {
            let outgoing = self.resolver.outgoing_edges(&current).await?;
            let last_seen = outgoing.iter().max_by_key(|e| e.event.recency()).cloned();

            let Some(edge) = pick_connected(outgoing, &current, "outgoing") else {
                let stop = match last_seen {
                    Some(edge) => WalkStop::Disconnected {
                        at: current.clone(),
                        peer: edge.key.other(&current).clone(),
                    },
                    None => WalkStop::Unassembled { at: current.clone() },
                };
                debug!(start = %start, stop = %stop, "Port walk stopped");
                return Ok(PortWalk::Incomplete(IncompleteChain { chain_path: path, stop }));
            };

            let next = edge.target();
            if !visited.insert(next.clone()) {
                warn!(start = %start, at = %next, "Cycle in resolved graph");
                return Ok(PortWalk::Incomplete(IncompleteChain {
                    chain_path: path,
                    stop: WalkStop::Cycle { at: next },
                }));
            }

            path.push(next.id.clone());
            if is_digitizer_id(&next.id) {
                return self.terminate(&next.id, path).await;
            }
            current = next;
        }

        warn!(start = %start, "Port walk exceeded {} hops", Self::MAX_DEPTH);
        Ok(PortWalk::Incomplete(IncompleteChain {
            chain_path: path,
            stop: WalkStop::DepthExceeded {
                depth: Self::MAX_DEPTH,
            },
        }))
    }

    async fn terminate(&self, digitizer_id: &str, path: Vec<String>) -> Result<PortWalk> {
        let address = match HardwareAddress::parse(digitizer_id) {
            Ok(address) => address,
            Err(Error::MalformedAddress { id, reason }) => {
                warn!(id = %id, reason = %reason, "Chain ends at malformed digitizer identifier");
                return Ok(PortWalk::Incomplete(IncompleteChain {
                    chain_path: path,
                    stop: WalkStop::MalformedAddress { id, detail: reason },
                }));
            }
            Err(e) => return Err(e),
        };

        let board_routing = match self.boards.lookup(address.chassis, address.slot).await? {
            Some(board) => Some(BoardRouting {
                packet_index: u64::from(board.engine_id) * u64::from(self.ports_per_board)
                    + u64::from(address.port),
                ip_address: board.ip_address,
                serial: board.serial,
                engine_id: board.engine_id,
            }),
            None => {
                warn!(address = %address, "No board configured at chassis {} slot {}", address.chassis, address.slot);
                None
            }
        };

        Ok(PortWalk::Resolved(PortResolution {
            hardware_address: address,
            chain_path: path,
            board_routing,
        }))
    }
}
