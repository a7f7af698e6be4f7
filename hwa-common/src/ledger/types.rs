//! Ledger data model
//!
//! Events are immutable once appended. Everything else in this module is
//! derived from them on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Signal polarization carried by one endpoint of a dual-pol part
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Polarization {
    P1,
    P2,
}

impl Polarization {
    /// Both polarizations in resolution order
    pub const ALL: [Polarization; 2] = [Polarization::P1, Polarization::P2];

    pub fn as_str(&self) -> &'static str {
        match self {
            Polarization::P1 => "P1",
            Polarization::P2 => "P2",
        }
    }
}

impl fmt::Display for Polarization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Polarization {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "P1" => Ok(Polarization::P1),
            "P2" => Ok(Polarization::P2),
            other => Err(Error::InvalidInput(format!(
                "Unknown polarization '{}' (expected P1 or P2)",
                other
            ))),
        }
    }
}

/// One physical signal end: a part identifier plus the polarization it carries
///
/// Textual form is the base identifier followed by the 2-character suffix,
/// e.g. `ANT001P1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub pol: Polarization,
}

impl Endpoint {
    pub fn new(id: impl Into<String>, pol: Polarization) -> Self {
        Self { id: id.into(), pol }
    }

    /// Parse a suffixed identifier such as `LNA001P2`
    pub fn parse(full_id: &str) -> Result<Self> {
        let full_id = full_id.trim();
        if full_id.len() <= 2 || !full_id.is_char_boundary(full_id.len() - 2) {
            return Err(Error::InvalidInput(format!(
                "Identifier '{}' has no polarization suffix",
                full_id
            )));
        }
        let (base, suffix) = full_id.split_at(full_id.len() - 2);
        let pol = suffix.parse::<Polarization>()?;
        Ok(Self::new(base, pol))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.id, self.pol)
    }
}

/// Connection state recorded by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "connected" => Ok(ConnectionStatus::Connected),
            "disconnected" => Ok(ConnectionStatus::Disconnected),
            other => Err(Error::InvalidInput(format!("Unknown connection status '{}'", other))),
        }
    }
}

/// Immutable ledger record, one per scan action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyEvent {
    /// Monotonically increasing arrival number assigned by the store
    pub sequence_id: i64,
    pub part_id: String,
    pub part_type: String,
    pub polarization: Polarization,
    pub event_time: DateTime<Utc>,
    pub peer_id: String,
    pub peer_type: String,
    pub peer_polarization: Polarization,
    pub peer_event_time: DateTime<Utc>,
    pub status: ConnectionStatus,
}

impl AssemblyEvent {
    /// Endpoint recorded in the "self" role
    pub fn part(&self) -> Endpoint {
        Endpoint::new(self.part_id.clone(), self.polarization)
    }

    /// Endpoint recorded in the "peer" role
    pub fn peer(&self) -> Endpoint {
        Endpoint::new(self.peer_id.clone(), self.peer_polarization)
    }

    /// Sort key for "most recent wins": event time, then arrival order
    pub fn recency(&self) -> (DateTime<Utc>, i64) {
        (self.event_time, self.sequence_id)
    }

    /// True if either endpoint carries this base identifier
    pub fn touches(&self, part_id: &str) -> bool {
        self.part_id == part_id || self.peer_id == part_id
    }

    /// Part type this event records for `part_id`, if it names that part
    pub fn type_of(&self, part_id: &str) -> Option<&str> {
        if self.part_id == part_id {
            Some(self.part_type.as_str())
        } else if self.peer_id == part_id {
            Some(self.peer_type.as_str())
        } else {
            None
        }
    }
}

/// Event about to be appended (no sequence number yet)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    pub part_id: String,
    pub part_type: String,
    pub polarization: Polarization,
    pub event_time: DateTime<Utc>,
    pub peer_id: String,
    pub peer_type: String,
    pub peer_polarization: Polarization,
    pub peer_event_time: DateTime<Utc>,
    pub status: ConnectionStatus,
}

/// A technician's request to connect (or disconnect) source -> target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub source_id: String,
    pub source_type: String,
    pub source_polarization: Polarization,
    pub event_time: DateTime<Utc>,
    pub target_id: String,
    pub target_type: String,
    pub target_polarization: Polarization,
    pub target_event_time: DateTime<Utc>,
}

impl ConnectionRequest {
    pub fn source(&self) -> Endpoint {
        Endpoint::new(self.source_id.clone(), self.source_polarization)
    }

    pub fn target(&self) -> Endpoint {
        Endpoint::new(self.target_id.clone(), self.target_polarization)
    }

    /// Ledger record for this request; the source always takes the "self" role
    pub fn to_event(&self, status: ConnectionStatus) -> PendingEvent {
        PendingEvent {
            part_id: self.source_id.clone(),
            part_type: self.source_type.clone(),
            polarization: self.source_polarization,
            event_time: self.event_time,
            peer_id: self.target_id.clone(),
            peer_type: self.target_type.clone(),
            peer_polarization: self.target_polarization,
            peer_event_time: self.target_event_time,
            status,
        }
    }
}

/// Unordered pair of endpoints in canonical (low, high) order
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub low: Endpoint,
    pub high: Endpoint,
}

impl EdgeKey {
    pub fn new(a: Endpoint, b: Endpoint) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn for_event(event: &AssemblyEvent) -> Self {
        Self::new(event.part(), event.peer())
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        &self.low == endpoint || &self.high == endpoint
    }

    /// The end of this pair that is not `endpoint`
    pub fn other(&self, endpoint: &Endpoint) -> &Endpoint {
        if &self.low == endpoint {
            &self.high
        } else {
            &self.low
        }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.low, self.high)
    }
}

/// The single authoritative event for one EdgeKey
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEdge {
    pub key: EdgeKey,
    pub event: AssemblyEvent,
}

impl ResolvedEdge {
    pub fn from_event(event: AssemblyEvent) -> Self {
        Self {
            key: EdgeKey::for_event(&event),
            event,
        }
    }

    /// Endpoint recorded as "self" in the winning event
    pub fn source(&self) -> Endpoint {
        self.event.part()
    }

    /// Endpoint recorded as "peer" in the winning event
    pub fn target(&self) -> Endpoint {
        self.event.peer()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.event.status
    }

    pub fn is_connected(&self) -> bool {
        self.event.status == ConnectionStatus::Connected
    }
}

/// Ordered list of part type names defining legal connections
///
/// Only the immediate successor type may be connected to; the first type is
/// source-only and the last type is sink-only. Names match case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct PartTypeSequence {
    names: Vec<String>,
}

impl PartTypeSequence {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(|n| n.into().trim().to_string()).collect();

        if names.len() < 2 {
            return Err(Error::Config(format!(
                "Part type sequence needs at least two types, got {}",
                names.len()
            )));
        }
        if let Some(blank) = names.iter().position(|n| n.is_empty()) {
            return Err(Error::Config(format!(
                "Part type sequence has a blank name at position {}",
                blank
            )));
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].iter().any(|prev| prev.eq_ignore_ascii_case(name)) {
                return Err(Error::Config(format!(
                    "Part type '{}' appears more than once in sequence",
                    name
                )));
            }
        }

        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, part_type: &str) -> Option<usize> {
        self.names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(part_type.trim()))
    }

    pub fn contains(&self, part_type: &str) -> bool {
        self.position(part_type).is_some()
    }

    /// Configured type name following `part_type`, if any
    pub fn successor(&self, part_type: &str) -> Option<&str> {
        self.position(part_type)
            .and_then(|i| self.names.get(i + 1))
            .map(String::as_str)
    }

    /// True if `target_type` immediately follows `source_type`
    pub fn is_adjacent(&self, source_type: &str, target_type: &str) -> bool {
        match (self.position(source_type), self.position(target_type)) {
            (Some(s), Some(t)) => t == s + 1,
            _ => false,
        }
    }

    pub fn first(&self) -> &str {
        &self.names[0]
    }

    pub fn last(&self) -> &str {
        &self.names[self.names.len() - 1]
    }

    pub fn is_source_only(&self, part_type: &str) -> bool {
        self.position(part_type) == Some(0)
    }

    pub fn is_sink_only(&self, part_type: &str) -> bool {
        self.position(part_type) == Some(self.names.len() - 1)
    }
}

impl Default for PartTypeSequence {
    fn default() -> Self {
        Self {
            names: ["Antenna", "Amplifier", "Cable", "Backplane", "Digitizer"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl TryFrom<Vec<String>> for PartTypeSequence {
    type Error = Error;

    fn try_from(names: Vec<String>) -> Result<Self> {
        Self::new(names)
    }
}

impl From<PartTypeSequence> for Vec<String> {
    fn from(seq: PartTypeSequence) -> Self {
        seq.names
    }
}
