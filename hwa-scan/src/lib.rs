//! hwa-scan library - technician scanning tool
//!
//! Thin layer over `hwa_common::ledger`: parses a subcommand, opens the
//! ledger database under the resolved root folder and prints the result.

pub mod cli;
pub mod commands;

pub use cli::{BoardsCommand, Cli, Command, LinkArgs};
pub use commands::{execute, open_ledger};
