//! Drives scans for the managed teams and settles finished loots.

use std::collections::HashSet;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use ethers::types::Address;
use futures::future::try_join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    bot::{
        scanner::{EventScanner, ScanOutcome},
        submitter::TransactionSubmitter,
    },
    config::CoordinatorConfig,
    core::{
        api::GameApi,
        notifier::Notifier,
        types::{BotError, Result},
    },
    strategy::settle::can_settle,
    types::{Confirmed, Game, Team},
};

pub struct RaidCoordinator {
    api: Arc<dyn GameApi>,
    scanner: EventScanner,
    submitter: Arc<TransactionSubmitter>,
    notifier: Arc<dyn Notifier>,
    wallets: Vec<Address>,
    config: CoordinatorConfig,
    attack_tx: mpsc::Sender<Team>,
    attack_rx: Mutex<Option<mpsc::Receiver<Team>>>,
    high_gas: AtomicBool,
    scanning: Mutex<HashSet<u64>>,
}

/// Marks a team as scanning until dropped.
struct TeamClaim<'a> {
    scanning: &'a Mutex<HashSet<u64>>,
    team_id: u64,
}

impl Drop for TeamClaim<'_> {
    fn drop(&mut self) {
        self.scanning.lock().unwrap_or_else(|e| e.into_inner()).remove(&self.team_id);
    }
}

impl RaidCoordinator {
    pub fn new(
        api: Arc<dyn GameApi>,
        scanner: EventScanner,
        submitter: Arc<TransactionSubmitter>,
        notifier: Arc<dyn Notifier>,
        wallets: Vec<Address>,
        config: CoordinatorConfig,
    ) -> Self {
        let (attack_tx, attack_rx) = mpsc::channel(config.queue_capacity);
        Self {
            api,
            scanner,
            submitter,
            notifier,
            wallets,
            config,
            attack_tx,
            attack_rx: Mutex::new(Some(attack_rx)),
            high_gas: AtomicBool::new(false),
            scanning: Mutex::new(HashSet::new()),
        }
    }

    /// `None` when the sweep or the queue is already scanning with this team.
    fn claim(&self, team_id: u64) -> Option<TeamClaim<'_>> {
        let mut scanning = self.scanning.lock().unwrap_or_else(|e| e.into_inner());
        scanning.insert(team_id).then(|| TeamClaim {
            scanning: &self.scanning,
            team_id,
        })
    }

    /// Teams of every managed wallet, as the game API reports them now.
    pub async fn all_teams(&self) -> Result<Vec<Team>> {
        let per_wallet = try_join_all(self.wallets.iter().map(|wallet| self.api.teams(*wallet))).await?;
        Ok(per_wallet.into_iter().flatten().collect())
    }

    pub async fn team_for_id(&self, team_id: u64) -> Result<Option<Team>> {
        Ok(self.all_teams().await?.into_iter().find(|team| team.id == team_id))
    }

    /// Re-reads the team's status; the snapshot in hand may be stale.
    pub async fn team_is_available(&self, team: &Team) -> Result<bool> {
        let teams = self.api.teams(team.wallet).await?;
        Ok(teams.iter().any(|t| t.id == team.id && t.is_available()))
    }

    /// One sweep over all available teams, one scan at a time. Returns the
    /// number of teams that were scanned.
    pub async fn raid(&self, cancel: &CancellationToken, announce_busy: bool) -> Result<usize> {
        let teams = self.all_teams().await?;
        let mut scanned = 0;

        for team in teams {
            if cancel.is_cancelled() {
                break;
            }
            match self.team_is_available(&team).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(team = team.id, status = %team.status, "Team busy, skipping");
                    continue;
                }
                Err(err) => {
                    warn!(team = team.id, %err, "error checking team status");
                    continue;
                }
            }

            let Some(_claim) = self.claim(team.id) else {
                debug!(team = team.id, "Team already scanning, skipping");
                continue;
            };
            scanned += 1;
            log_outcome(&team, &self.scanner.run(&team, cancel).await);
        }

        if scanned == 0 && announce_busy {
            self.notifier.notify("All teams are busy.").await;
        }
        Ok(scanned)
    }

    /// Queue a manual attack for the queue consumer.
    pub fn enqueue(&self, team: Team) -> Result<()> {
        self.attack_tx.try_send(team).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => BotError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => BotError::Config("attack queue is closed".to_string()),
        })
    }

    /// Looks the team up across the managed wallets and queues it.
    pub async fn enqueue_team_id(&self, team_id: u64) -> Result<()> {
        let team = self
            .team_for_id(team_id)
            .await?
            .ok_or_else(|| BotError::Data(format!("team #{team_id} not found in managed wallets")))?;
        self.enqueue(team)
    }

    /// Single consumer of the manual attack queue. Can only be started once.
    pub async fn run_attack_queue(&self, cancel: CancellationToken) -> Result<()> {
        let mut rx = self
            .attack_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| BotError::Config("attack queue consumer already running".to_string()))?;

        info!("Attack queue running");
        loop {
            let team = tokio::select! {
                _ = cancel.cancelled() => break,
                team = rx.recv() => match team {
                    Some(team) => team,
                    None => break,
                },
            };
            if let Err(err) = self.attack(&team, &cancel).await {
                error!(team = team.id, %err, "Queued attack failed");
                self.notifier
                    .notify(&format!("Queued attack with team {} failed: {}", team.id, err))
                    .await;
            }
        }
        info!("Attack queue stopped");
        Ok(())
    }

    /// Validates availability, then scans and attacks with `team`.
    pub async fn attack(&self, team: &Team, cancel: &CancellationToken) -> Result<Option<ScanOutcome>> {
        let claim = self.claim(team.id);
        if claim.is_none() || !self.team_is_available(team).await? {
            self.notifier
                .notify(&format!("Cannot attack, team {} is not available", team.id))
                .await;
            return Ok(None);
        }
        let outcome = self.scanner.run(team, cancel).await;
        log_outcome(team, &outcome);
        Ok(Some(outcome))
    }

    /// Open loots of every managed wallet.
    pub async fn active_loots(&self) -> Result<Vec<Game>> {
        let per_wallet = try_join_all(self.wallets.iter().map(|wallet| self.api.active_loots(*wallet))).await?;
        Ok(per_wallet.into_iter().flatten().collect())
    }

    /// Settles every loot past its settle time. Returns how many were settled.
    pub async fn settle_all(&self, is_auto: bool) -> Result<usize> {
        let ready: Vec<Game> = self.active_loots().await?.into_iter().filter(can_settle).collect();

        if ready.is_empty() {
            if !is_auto {
                self.notifier.notify("No games ready to be settled.").await;
            }
            return Ok(0);
        }

        let mut settled = 0;
        for game in ready {
            match self.settle_game(game.id).await {
                Ok(_) => settled += 1,
                Err(err) => warn!(game = game.id, %err, "error settling game"),
            }
        }
        Ok(settled)
    }

    pub async fn settle_game(&self, game_id: u64) -> Result<Confirmed> {
        self.notifier.notify(&format!("Settling game #{game_id}")).await;

        let result = self.resolve_and_settle(game_id).await;
        if let Err(err) = &result {
            // the submitter already reported these
            let reported = matches!(
                err,
                BotError::GasTooHigh { .. } | BotError::Timeout { .. } | BotError::TransactionReverted { .. }
            );
            if !reported {
                self.notifier
                    .notify(&format!("Error settling game #{game_id}: {err}"))
                    .await;
            }
        }
        result
    }

    async fn resolve_and_settle(&self, game_id: u64) -> Result<Confirmed> {
        let game = self.api.game(game_id).await?;
        let team = game
            .attack_team()
            .ok_or_else(|| BotError::Data(format!("game #{game_id} has no attacking team")))?;
        self.submitter.submit_settle(&team, game_id).await
    }

    /// Settle and sweep every `auto_interval` until cancelled.
    pub async fn run_auto(&self, cancel: CancellationToken) {
        self.notifier.notify("Bot is running on auto.").await;

        let mut interval = tokio::time::interval(self.config.auto_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.auto_cycle(&cancel).await;
        }
        info!("Auto loop stopped");
    }

    async fn auto_cycle(&self, cancel: &CancellationToken) {
        match self.submitter.gas_price() {
            Ok(_) => {
                if self.high_gas.swap(false, Ordering::Relaxed) {
                    self.notifier.notify("Gas price is back to normal, auto resumed.").await;
                }
            }
            Err(err @ BotError::GasTooHigh { .. }) => {
                if !self.high_gas.swap(true, Ordering::Relaxed) {
                    self.notifier.notify(&format!("{err}, auto paused.")).await;
                }
                return;
            }
            Err(err) => {
                warn!(%err, "Skipping auto cycle");
                return;
            }
        }

        if let Err(err) = self.settle_all(true).await {
            warn!(%err, "Auto settle failed");
        }
        if let Err(err) = self.raid(cancel, false).await {
            warn!(%err, "Auto raid failed");
        }
    }
}

fn log_outcome(team: &Team, outcome: &ScanOutcome) {
    match outcome {
        ScanOutcome::Succeeded { game_id, confirmed } => {
            info!(team = team.id, game = game_id, tx_hash = ?confirmed.tx_hash, "Attack confirmed")
        }
        ScanOutcome::Aborted { attempts, error } => {
            warn!(team = team.id, attempts, %error, "Scan aborted")
        }
        ScanOutcome::Cancelled => info!(team = team.id, "Scan cancelled"),
    }
}
