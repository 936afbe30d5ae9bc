//! Attack decision policy.
//!
//! Only games younger than [`MAX_GAME_AGE`] are considered: older mines are
//! usually already taken by faster bots. The scanner acts on the first game
//! that passes, not the best one.

use std::time::Duration;

/// Minimum battle-point advantage over the defending team.
pub const MIN_STRENGTH_ADVANTAGE: i64 = 20;

/// Games at least this old are skipped.
pub const MAX_GAME_AGE: Duration = Duration::from_secs(3);

pub fn should_attack(team_strength: i64, opponent_defense: i64, game_age: Duration) -> bool {
    team_strength - opponent_defense >= MIN_STRENGTH_ADVANTAGE && game_age < MAX_GAME_AGE
}
