//! Signed contract calls with receipt confirmation.

use std::sync::Arc;
use std::time::Duration;

use ethers::types::{H256, U256};
use tracing::{error, info, warn};

use crate::{
    config::{GasPolicy, SubmitPolicy},
    core::{
        gas::{to_gwei, GasOracle},
        ledger::LedgerGateway,
        nonce::NonceSequencer,
        notifier::Notifier,
        types::{BotError, Result},
    },
    types::{Confirmed, Game, GameCall, ReceiptStatus, Team, TxIntent},
    utils::link,
};

pub struct TransactionSubmitter {
    ledger: Arc<dyn LedgerGateway>,
    oracle: Arc<GasOracle>,
    notifier: Arc<dyn Notifier>,
    nonces: NonceSequencer,
    gas: GasPolicy,
    policy: SubmitPolicy,
}

impl TransactionSubmitter {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        oracle: Arc<GasOracle>,
        notifier: Arc<dyn Notifier>,
        gas: GasPolicy,
        policy: SubmitPolicy,
    ) -> Self {
        Self {
            ledger,
            oracle,
            notifier,
            nonces: NonceSequencer::new(),
            gas,
            policy,
        }
    }

    /// Effective price for the next transaction, or `GasTooHigh` when it is at
    /// or above the ceiling.
    pub fn gas_price(&self) -> Result<U256> {
        let price = self.oracle.current_effective_price(self.gas.margin)?;
        if price >= self.gas.ceiling {
            return Err(BotError::GasTooHigh {
                price_gwei: to_gwei(price),
                ceiling_gwei: to_gwei(self.gas.ceiling),
            });
        }
        Ok(price)
    }

    pub async fn submit_attack(&self, team: &Team, game: &Game) -> Result<Confirmed> {
        let advantage = team.strength - game.defense_point;
        info!("Attacking {} using {}, strength advantage: {}.", game.id, team.id, advantage);

        let call = GameCall::Attack { game_id: game.id, team_id: team.id };
        let tx_hash = self.send(team, call).await?;
        info!(?tx_hash, "Attack tx hash");

        match self.confirm(team, tx_hash, game.id, self.policy.attack_timeout).await {
            Ok(confirmed) => {
                self.notifier
                    .notify(&format!(
                        "Game #{} attack successful by team #{}, defense adv: {}.\n{}",
                        game.id, team.id, advantage, confirmed.link
                    ))
                    .await;
                Ok(confirmed)
            }
            Err(err) => {
                let text = match &err {
                    BotError::Timeout { waited_secs, .. } => format!(
                        "Game #{} attack by team #{} unconfirmed after {}s.\n{}",
                        game.id,
                        team.id,
                        waited_secs,
                        link::tx(&tx_hash)
                    ),
                    _ => format!(
                        "Game #{} attack by team #{} failed.\n{}",
                        game.id,
                        team.id,
                        link::tx(&tx_hash)
                    ),
                };
                self.notifier.notify(&text).await;
                Err(err)
            }
        }
    }

    pub async fn submit_settle(&self, team: &Team, game_id: u64) -> Result<Confirmed> {
        info!(game = game_id, team = team.id, "Settling game");

        let tx_hash = self.send(team, GameCall::Settle { game_id }).await?;
        info!(?tx_hash, "Settle hash");

        match self.confirm(team, tx_hash, game_id, self.policy.settle_timeout).await {
            Ok(confirmed) => {
                self.notifier
                    .notify(&format!(
                        "Game #{} Team #{} has been settled.\n{}",
                        game_id, team.id, confirmed.link
                    ))
                    .await;
                Ok(confirmed)
            }
            Err(err) => {
                let text = match &err {
                    BotError::Timeout { waited_secs, .. } => format!(
                        "Game #{} Team #{} settle sent, but did not get confirmed in {}s.\n{}",
                        game_id,
                        team.id,
                        waited_secs,
                        link::tx(&tx_hash)
                    ),
                    _ => format!(
                        "Game #{} Team #{} settle failed.\n{}",
                        game_id,
                        team.id,
                        link::tx(&tx_hash)
                    ),
                };
                self.notifier.notify(&text).await;
                Err(err)
            }
        }
    }

    /// Price, sequence, sign and broadcast. No network call happens when the
    /// gas ceiling is breached.
    async fn send(&self, team: &Team, call: GameCall) -> Result<H256> {
        let gas_price = match self.gas_price() {
            Ok(price) => price,
            Err(err @ BotError::GasTooHigh { .. }) => {
                warn!(%err, %call, "Cannot make transaction");
                self.notifier
                    .notify(&format!("Cannot make transaction for {call} using team #{}: {err}.", team.id))
                    .await;
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        info!(gas_gwei = %to_gwei(gas_price), "Using gas");

        let mut nonce_guard = self.nonces.lock(team.wallet).await;
        let nonce = nonce_guard
            .next(self.ledger.as_ref())
            .await
            .map_err(|e| BotError::Submission(format!("error getting nonce: {e}")))?;

        let intent = TxIntent {
            from: team.wallet,
            call,
            nonce,
            gas_price,
            gas_limit: self.gas.gas_limit,
            value: U256::zero(),
        };

        let tx_hash = self.ledger.submit(&intent).await.map_err(|e| match e {
            BotError::Submission(_) => e,
            other => BotError::Submission(other.to_string()),
        })?;
        nonce_guard.commit(nonce);
        Ok(tx_hash)
    }

    async fn confirm(&self, team: &Team, tx_hash: H256, game_id: u64, timeout: Duration) -> Result<Confirmed> {
        match self.ledger.poll_receipt(tx_hash, timeout).await {
            Ok(ReceiptStatus::Success) => Ok(Confirmed {
                tx_hash,
                link: link::tx(&tx_hash),
            }),
            Ok(ReceiptStatus::Failed) => {
                warn!(?tx_hash, "Transaction mined but failed");
                Err(BotError::TransactionReverted {
                    game_id,
                    tx_hash: format!("{tx_hash:#x}"),
                })
            }
            Err(err) => {
                error!(?tx_hash, %err, "No receipt");
                if matches!(err, BotError::Timeout { .. }) {
                    // a dropped transaction leaves the chain's pending count behind ours
                    self.nonces.forget(team.wallet).await;
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gas::gwei;
    use crate::testing::{submitter_with, team, FakeLedger, RecordingNotifier};

    fn fresh_game(defense: i64) -> Game {
        Game {
            id: 555,
            defense_point: defense,
            start_time: crate::utils::time::current_timestamp(),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_gas_ceiling_blocks_before_any_network_call() {
        let ledger = Arc::new(FakeLedger::default());
        let notifier = Arc::new(RecordingNotifier::default());
        // 180 + 30 margin = 210 >= 200
        let submitter = submitter_with(ledger.clone(), notifier.clone(), gwei(180)).await;

        let result = submitter.submit_attack(&team(1, 100), &fresh_game(70)).await;

        assert!(matches!(result, Err(BotError::GasTooHigh { .. })));
        assert_eq!(ledger.submissions().len(), 0);
        assert_eq!(ledger.nonce_reads(), 0);
        assert_eq!(ledger.receipt_polls(), 0);
        assert_eq!(notifier.count_containing("Cannot make transaction"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_is_inclusive() {
        let ledger = Arc::new(FakeLedger::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let submitter = submitter_with(ledger.clone(), notifier.clone(), gwei(170)).await;
        assert!(matches!(submitter.gas_price(), Err(BotError::GasTooHigh { .. })));

        let submitter = submitter_with(ledger, notifier, gwei(169)).await;
        assert_eq!(submitter.gas_price().unwrap(), gwei(199));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attack_success_on_second_poll() {
        let ledger = Arc::new(FakeLedger::default());
        ledger.set_pending_nonce(12);
        ledger.mine_after(2, ReceiptStatus::Success);
        let notifier = Arc::new(RecordingNotifier::default());
        let submitter = submitter_with(ledger.clone(), notifier.clone(), gwei(25)).await;

        let team = team(1, 100);
        let confirmed = submitter.submit_attack(&team, &fresh_game(70)).await.unwrap();

        let submissions = ledger.submissions();
        assert_eq!(submissions.len(), 1);
        let intent = &submissions[0];
        assert_eq!(intent.from, team.wallet);
        assert_eq!(intent.call, GameCall::Attack { game_id: 555, team_id: 1 });
        assert_eq!(intent.nonce, U256::from(12u64));
        assert_eq!(intent.gas_price, gwei(55));
        assert_eq!(intent.gas_limit, U256::from(200_000u64));
        assert!(intent.value.is_zero());

        assert_eq!(ledger.receipt_polls(), 2);
        assert_eq!(notifier.count_containing("attack successful"), 1);
        assert_eq!(notifier.messages().len(), 1);
        assert!(notifier.messages()[0].contains(&confirmed.link));
        assert!(confirmed.link.starts_with("https://snowtrace.io/tx/0x"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attack_timeout_reports_unconfirmed_once() {
        let ledger = Arc::new(FakeLedger::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let submitter = submitter_with(ledger.clone(), notifier.clone(), gwei(25)).await;

        let result = submitter.submit_attack(&team(1, 100), &fresh_game(70)).await;

        assert!(matches!(result, Err(BotError::Timeout { waited_secs: 120, .. })));
        assert_eq!(notifier.count_containing("unconfirmed"), 1);
        assert_eq!(notifier.messages().len(), 1);

        let polls = ledger.receipt_polls();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ledger.receipt_polls(), polls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reverted_attack() {
        let ledger = Arc::new(FakeLedger::default());
        ledger.mine_after(1, ReceiptStatus::Failed);
        let notifier = Arc::new(RecordingNotifier::default());
        let submitter = submitter_with(ledger.clone(), notifier.clone(), gwei(25)).await;

        let result = submitter.submit_attack(&team(1, 100), &fresh_game(70)).await;

        assert!(matches!(result, Err(BotError::TransactionReverted { game_id: 555, .. })));
        assert_eq!(notifier.count_containing("failed"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_broadcast_is_submission_error() {
        let ledger = Arc::new(FakeLedger::default());
        ledger.fail_submissions(1);
        let notifier = Arc::new(RecordingNotifier::default());
        let submitter = submitter_with(ledger.clone(), notifier.clone(), gwei(25)).await;

        let result = submitter.submit_attack(&team(1, 100), &fresh_game(70)).await;

        assert!(matches!(result, Err(BotError::Submission(_))));
        assert_eq!(ledger.receipt_polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_sends_use_increasing_nonces() {
        let ledger = Arc::new(FakeLedger::default());
        ledger.set_pending_nonce(4);
        ledger.mine_after(1, ReceiptStatus::Success);
        let notifier = Arc::new(RecordingNotifier::default());
        let submitter = submitter_with(ledger.clone(), notifier.clone(), gwei(25)).await;

        let team = team(1, 100);
        submitter.submit_settle(&team, 10).await.unwrap();
        submitter.submit_settle(&team, 11).await.unwrap();

        let nonces: Vec<_> = ledger.submissions().iter().map(|intent| intent.nonce).collect();
        assert_eq!(nonces, vec![U256::from(4u64), U256::from(5u64)]);
        assert_eq!(notifier.count_containing("has been settled"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_nonce_is_reused() {
        let ledger = Arc::new(FakeLedger::default());
        ledger.set_pending_nonce(7);
        let notifier = Arc::new(RecordingNotifier::default());
        let submitter = submitter_with(ledger.clone(), notifier.clone(), gwei(25)).await;

        let team = team(1, 100);
        for game_id in [10, 11, 12] {
            let result = submitter.submit_settle(&team, game_id).await;
            assert!(matches!(result, Err(BotError::Timeout { .. })));
        }

        let nonces: Vec<_> = ledger.submissions().iter().map(|intent| intent.nonce).collect();
        assert_eq!(nonces, vec![U256::from(7u64); 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_timeout_message() {
        let ledger = Arc::new(FakeLedger::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let submitter = submitter_with(ledger.clone(), notifier.clone(), gwei(25)).await;

        let result = submitter.submit_settle(&team(2, 100), 77).await;

        assert!(matches!(result, Err(BotError::Timeout { .. })));
        assert_eq!(notifier.count_containing("did not get confirmed"), 1);
    }
}
