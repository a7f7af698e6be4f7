//! Common error types for the hardware assembly ledger

use thiserror::Error;

/// Common result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the ledger, the scanner CLI and the review service
///
/// Domain-rule variants always carry the identifiers involved so the caller
/// can tell the technician exactly which cable or port is in the way.
#[derive(Error, Debug)]
pub enum Error {
    /// Target type is not the configured successor of the source type
    #[error("Illegal type transition: {source_id} ({source_type}) cannot connect to {target_id} ({target_type}); expected {expected}")]
    IllegalTypeTransition {
        source_id: String,
        source_type: String,
        target_id: String,
        target_type: String,
        /// Successor type the sequence expects, or "nothing" for unknown types
        expected: String,
    },

    /// Connection runs against a source-only or sink-only part type
    #[error("Illegal direction: {part_id} ({part_type}) {reason}")]
    IllegalDirection {
        part_id: String,
        part_type: String,
        reason: String,
    },

    /// Source endpoint already has a connected outgoing edge to another part
    #[error("Duplicate outgoing: {source_id} is already connected to {existing_target}")]
    DuplicateOutgoing {
        source_id: String,
        existing_target: String,
    },

    /// Target endpoint already has a connected incoming edge from another part
    #[error("Duplicate incoming: {target_id} is already connected from {existing_source}")]
    DuplicateIncoming {
        target_id: String,
        existing_source: String,
    },

    /// Request names a part with a different type than the ledger holds for it
    #[error("Part type mismatch: {part_id} was scanned as {claimed_type} but is recorded as {recorded_type}")]
    PartTypeMismatch {
        part_id: String,
        claimed_type: String,
        recorded_type: String,
    },

    /// Disconnection requested for a pair that is not currently connected
    #[error("Not connected: {part_id} and {peer_id} have no current connection")]
    NotConnected { part_id: String, peer_id: String },

    /// Proposed event is older than the event currently resolving the pair
    #[error("Stale event: {part_id} <-> {peer_id} at {event_time} predates resolved event at {resolved_time}")]
    StaleEvent {
        part_id: String,
        peer_id: String,
        event_time: String,
        resolved_time: String,
    },

    /// Digitizer identifier does not decode to chassis/slot/port
    #[error("Malformed address: {id}: {reason}")]
    MalformedAddress { id: String, reason: String },

    /// Underlying event store failed (wraps sqlx::Error)
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Stored data could not be decoded
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for the domain-rule violations a technician can act on
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self,
            Error::IllegalTypeTransition { .. }
                | Error::IllegalDirection { .. }
                | Error::DuplicateOutgoing { .. }
                | Error::DuplicateIncoming { .. }
                | Error::PartTypeMismatch { .. }
                | Error::NotConnected { .. }
                | Error::StaleEvent { .. }
        )
    }
}
