//! HTTP API handlers for hwa-dr

pub mod audit;
pub mod chains;
pub mod error;
pub mod health;
pub mod history;
pub mod ports;

pub use audit::get_audit;
pub use chains::{get_chains, get_edges};
pub use error::ApiError;
pub use health::health_routes;
pub use history::get_history;
pub use ports::get_ports;
