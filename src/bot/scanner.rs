//! Per-team search for a freshly started game, followed by the attack.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    bot::submitter::TransactionSubmitter,
    config::ScanConfig,
    core::{ledger::LedgerGateway, notifier::Notifier, types::BotError},
    strategy::matching::should_attack,
    types::{Confirmed, Game, Team},
    utils::time,
};

#[derive(Debug)]
enum ScanState {
    Polling,
    CandidateFound(Game),
    Attacking(Game),
    Retrying,
}

/// How a team's scan ended.
#[derive(Debug)]
pub enum ScanOutcome {
    Succeeded { game_id: u64, confirmed: Confirmed },
    Aborted { attempts: u32, error: BotError },
    Cancelled,
}

pub struct EventScanner {
    ledger: Arc<dyn LedgerGateway>,
    submitter: Arc<TransactionSubmitter>,
    notifier: Arc<dyn Notifier>,
    config: ScanConfig,
}

impl EventScanner {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        submitter: Arc<TransactionSubmitter>,
        notifier: Arc<dyn Notifier>,
        config: ScanConfig,
    ) -> Self {
        Self {
            ledger,
            submitter,
            notifier,
            config,
        }
    }

    /// Poll until an attack on a fresh game succeeds, the error limit is hit, or
    /// `cancel` fires. There is no timeout on finding an opponent.
    #[instrument(skip_all, fields(team = team.id, strength = team.strength))]
    pub async fn run(&self, team: &Team, cancel: &CancellationToken) -> ScanOutcome {
        self.notifier
            .notify(&format!("Finding game using team #{}", team.id))
            .await;

        let mut errors = 0u32;
        let mut last_block = None;
        let mut state = ScanState::Polling;

        loop {
            state = match state {
                ScanState::Polling => {
                    if cancel.is_cancelled() {
                        return ScanOutcome::Cancelled;
                    }
                    match self.poll_once(team, &mut last_block).await {
                        Some(game) => ScanState::CandidateFound(game),
                        None => {
                            tokio::select! {
                                _ = cancel.cancelled() => return ScanOutcome::Cancelled,
                                _ = tokio::time::sleep(self.config.idle_poll) => {}
                            }
                            ScanState::Polling
                        }
                    }
                }
                ScanState::CandidateFound(game) => {
                    info!(
                        "Game: {}, opponent strength: {}, team strength: {}, started {} ({} ago)",
                        game.id,
                        game.defense_point,
                        team.strength,
                        time::timestamp_to_string(game.start_time),
                        time::format_duration(time::age(game.start_time))
                    );
                    ScanState::Attacking(game)
                }
                ScanState::Attacking(game) => match self.submitter.submit_attack(team, &game).await {
                    Ok(confirmed) => {
                        return ScanOutcome::Succeeded {
                            game_id: game.id,
                            confirmed,
                        }
                    }
                    Err(err) if !err.counts_toward_breaker() => {
                        warn!(%err, "Attack not attempted, stopping scan");
                        return ScanOutcome::Aborted {
                            attempts: errors,
                            error: err,
                        };
                    }
                    Err(err) => {
                        errors += 1;
                        if errors >= self.config.max_consecutive_errors {
                            error!(%err, errors, "Giving up on team");
                            self.notifier
                                .notify(&format!(
                                    "More than {} errors while trying to attack using team {}. {}",
                                    self.config.max_consecutive_errors, team.id, err
                                ))
                                .await;
                            return ScanOutcome::Aborted {
                                attempts: errors,
                                error: err,
                            };
                        }
                        error!(%err, errors, transient = err.is_transient(), "error attacking");
                        ScanState::Retrying
                    }
                },
                ScanState::Retrying => {
                    // the failed candidate's block may still hold a fresh game
                    last_block = None;
                    ScanState::Polling
                }
            };
        }
    }

    /// One polling step: returns the first qualifying game of a new block.
    async fn poll_once(&self, team: &Team, last_block: &mut Option<u64>) -> Option<Game> {
        let best_block = match self.ledger.block_height().await {
            Ok(height) => height,
            Err(error) => {
                warn!(%error, "error getting block number");
                return None;
            }
        };

        if *last_block == Some(best_block) {
            return None;
        }

        let events = match self.ledger.game_start_events(best_block).await {
            Ok(events) => events,
            Err(error) => {
                warn!(%error, block = best_block, "error filtering start game");
                return None;
            }
        };
        *last_block = Some(best_block);
        debug!(block = best_block, events = events.len(), "New block");

        for event in events {
            let game_info = match self.ledger.game_info(event.game_id).await {
                Ok(info) => info,
                Err(error) => {
                    warn!(%error, game = event.game_id, "error getting game info");
                    continue;
                }
            };
            let team_info = match self.ledger.team_info(event.team_id).await {
                Ok(info) => info,
                Err(error) => {
                    warn!(%error, team = event.team_id, "error getting team info");
                    continue;
                }
            };

            let game_age = time::age(game_info.start_time);
            if should_attack(team.strength, team_info.battle_point, game_age) {
                return Some(Game {
                    id: event.game_id,
                    defense_point: team_info.battle_point,
                    start_time: game_info.start_time,
                    ..Default::default()
                });
            }
            debug!(
                game = event.game_id,
                defense = team_info.battle_point,
                age = ?game_age,
                "Skipping game"
            );
        }

        None
    }
}
