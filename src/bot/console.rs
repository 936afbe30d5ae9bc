//! Line based operator commands read from stdin while the bot runs.

use std::io::BufRead;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    bot::{coordinator::RaidCoordinator, report},
    core::{gas::GasOracle, notifier::Notifier, types::BotError},
    utils::time::current_timestamp,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Attack(u64),
    Settle(u64),
    SettleAll,
    Loots,
    Teams,
    Gas,
    Help,
}

const HELP: &str = "Commands: attack <team id>, settle <game id>, settle-all, loots, teams, gas, help";

impl std::str::FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default().trim_start_matches('/').to_lowercase();
        let id = |arg: Option<&str>, what: &str| -> Result<u64, String> {
            arg.ok_or_else(|| format!("missing {what}"))?
                .trim_start_matches('#')
                .parse()
                .map_err(|_| format!("invalid {what}"))
        };

        match command.as_str() {
            "attack" => Ok(ConsoleCommand::Attack(id(parts.next(), "team id")?)),
            "settle" => Ok(ConsoleCommand::Settle(id(parts.next(), "game id")?)),
            "settle-all" | "settleall" => Ok(ConsoleCommand::SettleAll),
            "loots" => Ok(ConsoleCommand::Loots),
            "teams" => Ok(ConsoleCommand::Teams),
            "gas" => Ok(ConsoleCommand::Gas),
            "help" => Ok(ConsoleCommand::Help),
            other => Err(format!("unknown command: {other}")),
        }
    }
}

/// Reads stdin on a detached thread so a pending read never holds up shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

pub async fn run(
    coordinator: Arc<RaidCoordinator>,
    oracle: Arc<GasOracle>,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
) {
    let mut lines = spawn_stdin_reader();
    info!("{HELP}");

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<ConsoleCommand>() {
            Ok(command) => command,
            Err(err) => {
                warn!("{err}. {HELP}");
                continue;
            }
        };

        // settlements wait for receipts, keep the console responsive
        let coordinator = coordinator.clone();
        let oracle = oracle.clone();
        let notifier = notifier.clone();
        tokio::spawn(async move {
            if let Err(err) = execute(command, &coordinator, &oracle, notifier.as_ref()).await {
                warn!(?command, %err, "Command failed");
                // settle_game reports its own failures
                if !matches!(command, ConsoleCommand::Settle(_)) {
                    notifier.notify(&format!("Command failed: {err}")).await;
                }
            }
        });
    }
}

async fn execute(
    command: ConsoleCommand,
    coordinator: &RaidCoordinator,
    oracle: &GasOracle,
    notifier: &dyn Notifier,
) -> Result<(), BotError> {
    match command {
        ConsoleCommand::Attack(team_id) => {
            coordinator.enqueue_team_id(team_id).await?;
            info!(team = team_id, "Attack queued");
            notifier.notify(&format!("Attacking using team #{team_id}")).await;
        }
        ConsoleCommand::Settle(game_id) => {
            coordinator.settle_game(game_id).await?;
        }
        ConsoleCommand::SettleAll => {
            coordinator.settle_all(false).await?;
        }
        ConsoleCommand::Loots => {
            let loots = coordinator.active_loots().await?;
            notifier.notify(&report::loot_report(&loots, current_timestamp())).await;
        }
        ConsoleCommand::Teams => {
            let teams = coordinator.all_teams().await?;
            notifier.notify(&report::team_report(&teams)).await;
        }
        ConsoleCommand::Gas => notifier.notify(&report::gas_report(oracle.published())).await,
        ConsoleCommand::Help => info!("{HELP}"),
    }
    Ok(())
}
