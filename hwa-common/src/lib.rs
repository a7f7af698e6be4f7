//! # HWA Common Library
//!
//! Shared code for the hardware assembly tools:
//! - Append-only assembly event ledger on SQLite
//! - Latest-state-per-edge resolution
//! - Connection validation against the configured part type order
//! - Chain building and digitizer port resolution
//! - Configuration loading

pub mod config;
pub mod db;
pub mod error;
pub mod ledger;

pub use error::{Error, Result};
pub use ledger::{
    AssemblyEvent, ConnectionRequest, ConnectionStatus, Endpoint, PartTypeSequence, Polarization,
    ResolvedEdge,
};
