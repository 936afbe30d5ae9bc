//! Loot settlement eligibility and status.

use std::time::Duration;

use crate::types::{Game, ProcessAction};

/// Minimum loot duration counted from the mine start.
pub const LOOT_DURATION: Duration = Duration::from_secs(60 * 60);

/// Window each side has to answer the other's last move.
pub const PROCESS_WINDOW: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LootStatus {
    /// We attacked last and the defender's window has closed.
    Won,
    /// We attacked last, defender may still reinforce.
    AwaitingReinforcement,
    /// Defender reinforced last and our window has closed.
    Lost,
    /// Defender reinforced last; we need this many points to be ahead again.
    ReinforcementNeeded(i64),
    Unknown,
}

impl LootStatus {
    pub fn last_action(&self) -> &'static str {
        match self {
            LootStatus::Won | LootStatus::AwaitingReinforcement => "attacked",
            LootStatus::Lost | LootStatus::ReinforcementNeeded(_) => "opponent reinforced",
            LootStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for LootStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LootStatus::Won => write!(f, "won"),
            LootStatus::AwaitingReinforcement => write!(f, "waiting for opponent's reinforcement"),
            LootStatus::Lost => write!(f, "lost"),
            LootStatus::ReinforcementNeeded(points) => write!(f, "{points} reinforcement needed"),
            LootStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Unix second after which the game can be settled.
///
/// The later of `start_time + LOOT_DURATION` and the last process event plus
/// `PROCESS_WINDOW`.
pub fn settle_time(game: &Game) -> i64 {
    let by_duration = game.start_time + LOOT_DURATION.as_secs() as i64;
    match game.last_process() {
        Some(event) => by_duration.max(event.transaction_time + PROCESS_WINDOW.as_secs() as i64),
        None => by_duration,
    }
}

/// Strictly after the settle time.
pub fn can_settle_at(game: &Game, now: i64) -> bool {
    now > settle_time(game)
}

pub fn can_settle(game: &Game) -> bool {
    can_settle_at(game, crate::utils::time::current_timestamp())
}

pub fn loot_status_at(game: &Game, now: i64) -> LootStatus {
    let Some(last) = game.last_process() else {
        return LootStatus::Unknown;
    };
    let window_closed = now - last.transaction_time > PROCESS_WINDOW.as_secs() as i64;

    match last.action {
        ProcessAction::Attack | ProcessAction::ReinforceAttack if window_closed => LootStatus::Won,
        ProcessAction::Attack | ProcessAction::ReinforceAttack => LootStatus::AwaitingReinforcement,
        ProcessAction::ReinforceDefense if window_closed => LootStatus::Lost,
        ProcessAction::ReinforceDefense => {
            LootStatus::ReinforcementNeeded(game.defense_point - game.attack_point)
        }
        _ => LootStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProcessEvent;

    const START: i64 = 1_640_995_200;

    fn loot(process: Vec<(ProcessAction, i64)>) -> Game {
        Game {
            id: 7,
            defense_point: 690,
            start_time: START,
            attack_team_id: Some(3),
            attack_point: 650,
            process: process
                .into_iter()
                .map(|(action, transaction_time)| ProcessEvent { action, transaction_time })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_settle_boundary_without_process() {
        let game = loot(vec![]);
        let threshold = START + 3600;
        assert_eq!(settle_time(&game), threshold);
        assert!(!can_settle_at(&game, threshold - 1));
        assert!(!can_settle_at(&game, threshold));
        assert!(can_settle_at(&game, threshold + 1));
    }

    #[test]
    fn test_late_reinforcement_extends_settle_time() {
        let reinforced_at = START + 50 * 60;
        let game = loot(vec![(ProcessAction::Attack, START + 10), (ProcessAction::ReinforceDefense, reinforced_at)]);
        let threshold = reinforced_at + 30 * 60;
        assert_eq!(settle_time(&game), threshold);
        assert!(!can_settle_at(&game, threshold - 1));
        assert!(can_settle_at(&game, threshold + 1));
    }

    #[test]
    fn test_early_process_keeps_loot_duration() {
        let game = loot(vec![(ProcessAction::Attack, START + 60)]);
        assert_eq!(settle_time(&game), START + 3600);
    }

    #[test]
    fn test_loot_status() {
        let attacked = loot(vec![(ProcessAction::Attack, START)]);
        assert_eq!(loot_status_at(&attacked, START + 60), LootStatus::AwaitingReinforcement);
        assert_eq!(loot_status_at(&attacked, START + 31 * 60), LootStatus::Won);

        let reinforced = loot(vec![(ProcessAction::Attack, START), (ProcessAction::ReinforceDefense, START + 60)]);
        assert_eq!(loot_status_at(&reinforced, START + 120), LootStatus::ReinforcementNeeded(40));
        assert_eq!(loot_status_at(&reinforced, START + 60 + 31 * 60), LootStatus::Lost);
        assert_eq!(LootStatus::ReinforcementNeeded(40).to_string(), "40 reinforcement needed");

        assert_eq!(loot_status_at(&loot(vec![]), START), LootStatus::Unknown);
    }
}
