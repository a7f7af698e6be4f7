//! Subcommand execution
//!
//! Every command writes its report to `out` so the binary prints to stdout
//! and tests can capture it.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use hwa_common::config::LedgerConfig;
use hwa_common::db::init_database;
use hwa_common::ledger::{render_report, AssemblyLedger, PortWalk};
use hwa_common::{ConnectionRequest, Polarization};
use std::io::Write;

use crate::cli::{BoardsCommand, Command, LinkArgs};

/// Open the ledger database under the configured root folder
pub async fn open_ledger(config: &LedgerConfig) -> Result<AssemblyLedger> {
    let db_path = config.database_path();
    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open ledger database {}", db_path.display()))?;

    Ok(AssemblyLedger::new(
        pool,
        config.part_types.clone(),
        config.ports_per_board,
    ))
}

/// Run one subcommand against `ledger`
pub async fn execute<W: Write>(
    command: &Command,
    ledger: &AssemblyLedger,
    config: &LedgerConfig,
    out: &mut W,
) -> Result<()> {
    match command {
        Command::Record(link) => {
            let request = to_request(link);
            let sequence_id = ledger.record(&request).await?;
            writeln!(
                out,
                "Recorded #{}: {} -> {}",
                sequence_id,
                request.source(),
                request.target()
            )?;
        }
        Command::Disconnect(link) => {
            let request = to_request(link);
            let sequence_id = ledger.disconnect(&request).await?;
            writeln!(
                out,
                "Disconnected #{}: {} -x- {}",
                sequence_id,
                request.source(),
                request.target()
            )?;
        }
        Command::Ports { antenna, json } => {
            let ports = ledger.resolve_ports(antenna).await?;
            if *json {
                writeln!(out, "{}", serde_json::to_string_pretty(&ports)?)?;
            } else {
                for pol in Polarization::ALL {
                    writeln!(out, "{}{}: {}", ports.antenna, pol, describe_walk(ports.walk(pol)))?;
                }
            }
        }
        Command::Chains => {
            let chains = ledger.all_chains().await?;
            write!(out, "{}", render_report(&chains))?;
        }
        Command::History { part, json } => {
            let events = ledger.history(part).await?;
            if *json {
                writeln!(out, "{}", serde_json::to_string_pretty(&events)?)?;
            } else {
                for event in &events {
                    writeln!(
                        out,
                        "#{} {} {} {} ({}) -> {} ({})",
                        event.sequence_id,
                        event.event_time.to_rfc3339(),
                        event.status,
                        event.part(),
                        event.part_type,
                        event.peer(),
                        event.peer_type
                    )?;
                }
            }
        }
        Command::Audit => {
            let violations = ledger.audit().await?;
            if violations.is_empty() {
                writeln!(out, "No violations")?;
            } else {
                for violation in &violations {
                    writeln!(out, "{}", violation)?;
                }
                bail!("{} assembly rule violation(s) found", violations.len());
            }
        }
        Command::Boards { command } => match command {
            BoardsCommand::Import { file } => {
                let Some(path) = file.as_ref().or(config.boards_file.as_ref()) else {
                    bail!("No boards file given and boards_file is not set in hwa.toml");
                };
                let count = ledger
                    .boards()
                    .import_toml(path)
                    .await
                    .with_context(|| format!("Failed to import {}", path.display()))?;
                writeln!(out, "Imported {} boards", count)?;
            }
            BoardsCommand::List => {
                for board in ledger.boards().list().await? {
                    writeln!(
                        out,
                        "{}{} serial={} ip={} engine={}",
                        board.chassis, board.slot, board.serial, board.ip_address, board.engine_id
                    )?;
                }
            }
        },
    }

    Ok(())
}

fn to_request(link: &LinkArgs) -> ConnectionRequest {
    let event_time = link.event_time.unwrap_or_else(Utc::now);
    ConnectionRequest {
        source_id: link.source.id.clone(),
        source_type: link.source_type.clone(),
        source_polarization: link.source.pol,
        event_time,
        target_id: link.target.id.clone(),
        target_type: link.target_type.clone(),
        target_polarization: link.target.pol,
        target_event_time: link.target_event_time.unwrap_or(event_time),
    }
}

fn describe_walk(walk: &PortWalk) -> String {
    match walk {
        PortWalk::Resolved(resolution) => {
            let mut line = format!(
                "{} via {}",
                resolution.hardware_address,
                resolution.chain_path.join(" -> ")
            );
            match &resolution.board_routing {
                Some(routing) => line.push_str(&format!(
                    " [ip {} serial {} engine {} packet index {}]",
                    routing.ip_address, routing.serial, routing.engine_id, routing.packet_index
                )),
                None => line.push_str(" [no board configured]"),
            }
            line
        }
        PortWalk::Incomplete(incomplete) => format!(
            "incomplete ({}) via {}",
            incomplete.stop,
            incomplete.chain_path.join(" -> ")
        ),
    }
}
