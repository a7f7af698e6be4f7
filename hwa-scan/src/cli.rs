//! Command-line arguments for hwa-scan

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use hwa_common::Endpoint;
use std::path::PathBuf;

/// Technician scanning tool for the hardware assembly ledger
#[derive(Parser, Debug)]
#[command(name = "hwa-scan")]
#[command(about = "Record and inspect antenna signal chain assembly")]
#[command(version)]
pub struct Cli {
    /// Root folder holding hwa.db
    #[arg(short, long, global = true, env = "HWA_ROOT_FOLDER")]
    pub root_folder: Option<PathBuf>,

    /// Config file (defaults to ~/.config/hwa/hwa.toml or /etc/hwa/hwa.toml)
    #[arg(short, long, global = true, env = "HWA_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record a source -> target connection
    Record(LinkArgs),

    /// Record that a connected pair has been taken apart
    Disconnect(LinkArgs),

    /// Resolve both polarizations of an antenna to digitizer ports
    Ports {
        /// Antenna base identifier, e.g. ANT001
        antenna: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print every connected chain, one per line
    Chains,

    /// Print every event touching a part, in arrival order
    History {
        /// Part base identifier
        part: String,

        #[arg(long)]
        json: bool,
    },

    /// Re-check the resolved graph against the assembly rules
    Audit,

    /// Digitizer board configuration
    Boards {
        #[command(subcommand)]
        command: BoardsCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum BoardsCommand {
    /// Load a [[board]] TOML file (defaults to boards_file from hwa.toml)
    Import { file: Option<PathBuf> },

    /// List configured boards
    List,
}

/// Both ends of one scanned link
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// Source identifier with polarization suffix, e.g. ANT001P1
    #[arg(long = "from", value_parser = parse_endpoint)]
    pub source: Endpoint,

    /// Source part type, e.g. Antenna
    #[arg(long = "from-type")]
    pub source_type: String,

    /// Target identifier with polarization suffix, e.g. LNA001P1
    #[arg(long = "to", value_parser = parse_endpoint)]
    pub target: Endpoint,

    #[arg(long = "to-type")]
    pub target_type: String,

    /// Scan time of the source (RFC 3339); defaults to now
    #[arg(long = "at")]
    pub event_time: Option<DateTime<Utc>>,

    /// Scan time of the target (RFC 3339); defaults to the source time
    #[arg(long = "target-at")]
    pub target_event_time: Option<DateTime<Utc>>,
}

fn parse_endpoint(value: &str) -> Result<Endpoint, String> {
    Endpoint::parse(value).map_err(|e| e.to_string())
}
