//! Assembly event ledger and chain resolution
//!
//! Write path: [`ConnectionValidator`] checks a proposal against the part
//! type order and the resolved graph, then appends to the [`EventLog`].
//! Read path: [`ChainBuilder`] and [`SnapPortResolver`] read current state
//! through [`EdgeStateResolver`]. [`AssemblyLedger`] bundles both paths for
//! the binaries.

pub mod audit;
pub mod chains;
pub mod event_log;
pub mod resolver;
pub mod snap;
pub mod types;
pub mod validator;

pub use audit::{audit_edges, Violation};
pub use chains::{build_chains, render_chain, render_report, Chain, ChainBuilder};
pub use event_log::{EventLog, LedgerTxn};
pub use resolver::{resolve_edges, EdgeStateResolver};
pub use snap::{
    is_digitizer_id, AntennaPorts, BoardRouting, HardwareAddress, IncompleteChain, PortResolution,
    PortWalk, SnapPortResolver, WalkStop,
};
pub use types::{
    AssemblyEvent, ConnectionRequest, ConnectionStatus, EdgeKey, Endpoint, PartTypeSequence,
    PendingEvent, Polarization, ResolvedEdge,
};
pub use validator::ConnectionValidator;

use sqlx::SqlitePool;

use crate::db::BoardConfigStore;
use crate::Result;

/// Every ledger operation over one database
#[derive(Debug, Clone)]
pub struct AssemblyLedger {
    validator: ConnectionValidator,
    chains: ChainBuilder,
    ports: SnapPortResolver,
    boards: BoardConfigStore,
}

impl AssemblyLedger {
    pub fn new(pool: SqlitePool, types: PartTypeSequence, ports_per_board: u32) -> Self {
        let log = EventLog::new(pool.clone());
        let resolver = EdgeStateResolver::new(log.clone());
        let boards = BoardConfigStore::new(pool);

        Self {
            validator: ConnectionValidator::new(types, log),
            chains: ChainBuilder::new(resolver.clone()),
            ports: SnapPortResolver::new(resolver, boards.clone(), ports_per_board),
            boards,
        }
    }

    pub fn resolver(&self) -> &EdgeStateResolver {
        self.validator.resolver()
    }

    pub fn log(&self) -> &EventLog {
        self.validator.resolver().log()
    }

    pub fn boards(&self) -> &BoardConfigStore {
        &self.boards
    }

    pub fn part_types(&self) -> &PartTypeSequence {
        self.validator.part_types()
    }

    /// Validate and record a connection
    pub async fn record(&self, request: &ConnectionRequest) -> Result<i64> {
        self.validator.record(request).await
    }

    /// Record the disconnection of a currently connected pair
    pub async fn disconnect(&self, request: &ConnectionRequest) -> Result<i64> {
        self.validator.disconnect(request).await
    }

    pub async fn resolve_pair(&self, a: &Endpoint, b: &Endpoint) -> Result<Option<ResolvedEdge>> {
        self.resolver().resolve_pair(a, b).await
    }

    pub async fn resolve_ports(&self, antenna_base_id: &str) -> Result<AntennaPorts> {
        self.ports.resolve_ports(antenna_base_id).await
    }

    pub async fn all_chains(&self) -> Result<Vec<Chain>> {
        self.chains.all_chains().await
    }

    pub async fn connected_edges(&self) -> Result<Vec<ResolvedEdge>> {
        self.resolver().connected_edges().await
    }

    /// Audit trail for one part, in arrival order
    pub async fn history(&self, part_id: &str) -> Result<Vec<AssemblyEvent>> {
        self.log().events_touching(part_id.trim()).await
    }

    pub async fn audit(&self) -> Result<Vec<Violation>> {
        audit::audit(self.resolver(), self.part_types()).await
    }
}
