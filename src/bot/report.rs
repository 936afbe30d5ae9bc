//! Operator-facing text reports.

use std::time::Duration;

use ethers::types::U256;

use crate::{
    core::gas::to_gwei,
    strategy::settle::{can_settle_at, loot_status_at, settle_time},
    types::{Game, Team},
    utils::link::short_address,
    utils::time::format_duration,
};

pub fn loot_report(games: &[Game], now: i64) -> String {
    if games.is_empty() {
        return "No active loots.".to_string();
    }
    games
        .iter()
        .map(|game| loot_line(game, now))
        .collect::<Vec<_>>()
        .join("\n")
}

fn loot_line(game: &Game, now: i64) -> String {
    let status = loot_status_at(game, now);
    let team = game.attack_team_id.map(|id| format!("#{id}")).unwrap_or_else(|| "?".to_string());
    let owner = game
        .attack_team_owner
        .as_ref()
        .map(short_address)
        .unwrap_or_else(|| "?".to_string());

    let settle = if can_settle_at(game, now) {
        "ready to settle".to_string()
    } else {
        let remaining = Duration::from_secs((settle_time(game) - now).max(0) as u64);
        format!("settle in {}", format_duration(remaining))
    };

    format!(
        "Game #{} team {} ({}): last action {}, {}, {}",
        game.id,
        team,
        owner,
        status.last_action(),
        status,
        settle
    )
}

pub fn team_report(teams: &[Team]) -> String {
    if teams.is_empty() {
        return "No teams found.".to_string();
    }
    teams
        .iter()
        .map(|team| {
            format!(
                "Team #{}: strength {}, owner {}, {}",
                team.id,
                team.strength,
                short_address(&team.wallet),
                team.status
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn gas_report(published: Option<U256>) -> String {
    match published {
        Some(price) => format!("Gas price: {} gwei", to_gwei(price)),
        None => "Gas price not available yet".to_string(),
    }
}
