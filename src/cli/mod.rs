//! Operator command line.

pub mod db;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use crate::app::{runtime, App, Config};
use crate::core::domain::{CompetitionId, CompetitionStatus, OrderId};
use crate::error::Result;

#[derive(Debug, Parser)]
#[command(name = "coinarena", version, about = "Paper-trading competition core")]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the ingest, matching, and lifecycle tasks (default).
    Run,
    /// Apply pending database migrations.
    InitDb,
    /// Manage competitions.
    Competition {
        #[command(subcommand)]
        command: CompetitionCommand,
    },
    /// Repair the fill price of a corrupted filled order. Prints the plan;
    /// pass --apply to execute it.
    RepairOrder {
        order_id: OrderId,
        /// Corrected fill price in KRW.
        #[arg(long)]
        price: Decimal,
        #[arg(long)]
        apply: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum CompetitionCommand {
    /// Create a competition in `pending` state.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value = "1000000")]
        initial_balance: Decimal,
        #[arg(long, default_value = "0.0005")]
        fee_rate: Decimal,
        /// Start of the trading window (RFC 3339).
        #[arg(long)]
        start: DateTime<Utc>,
        /// End of the trading window (RFC 3339).
        #[arg(long)]
        end: DateTime<Utc>,
    },
    /// List competitions, optionally filtered by status.
    List {
        #[arg(long)]
        status: Option<CompetitionStatus>,
    },
    /// Explicitly transition `pending -> active`.
    Activate { id: CompetitionId },
    /// Explicitly transition `active -> ended`.
    End { id: CompetitionId },
}

pub async fn execute(command: Option<Command>, config: Config) -> Result<()> {
    match command.unwrap_or(Command::Run) {
        Command::Run => {
            let app = App::build(config).await?;
            runtime::run(app).await
        }
        Command::InitDb => db::run_migrations(&config.database.url),
        Command::Competition { command } => {
            let app = App::build(config).await?;
            competition(&app, command)
        }
        Command::RepairOrder {
            order_id,
            price,
            apply,
        } => {
            let app = App::build(config).await?;
            let report = if apply {
                app.repair.apply(order_id, price)?
            } else {
                app.repair.plan(order_id, price)?
            };
            println!(
                "{} order {} ({} {} x {})",
                if apply { "repaired" } else { "would repair" },
                report.order_id,
                report.side,
                report.code,
                report.quantity,
            );
            println!(
                "  filled_price: {} -> {}",
                report.old_filled_price, report.new_filled_price
            );
            println!("  fee:          {} -> {}", report.old_fee, report.new_fee);
            println!("  balance_delta: {}", report.balance_delta);
            if let Some(avg) = report.new_avg_buy_price {
                println!("  avg_buy_price -> {avg}");
            }
            if !apply {
                println!("dry run; pass --apply to execute");
            }
            Ok(())
        }
    }
}

fn competition(app: &App, command: CompetitionCommand) -> Result<()> {
    match command {
        CompetitionCommand::Create {
            name,
            description,
            initial_balance,
            fee_rate,
            start,
            end,
        } => {
            let competition = app.competitions.create(
                &name,
                description.as_deref(),
                initial_balance,
                fee_rate,
                start,
                end,
            )?;
            println!("created competition {}", competition.id);
            Ok(())
        }
        CompetitionCommand::List { status } => {
            for competition in app.competitions.list(status)? {
                println!(
                    "{}  {:8}  {}  {} .. {}",
                    competition.id,
                    competition.status.as_str(),
                    competition.name,
                    competition.start_time,
                    competition.end_time,
                );
            }
            Ok(())
        }
        CompetitionCommand::Activate { id } => {
            let competition = app.lifecycle.activate(id)?;
            println!("competition {} is now {}", competition.id, competition.status);
            Ok(())
        }
        CompetitionCommand::End { id } => {
            let competition = app.lifecycle.end(id)?;
            println!("competition {} is now {}", competition.id, competition.status);
            Ok(())
        }
    }
}
