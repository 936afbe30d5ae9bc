//! Chain access for the idle game contract.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::{
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{
        transaction::eip2718::TypedTransaction, Address, BlockNumber, Bytes, TransactionRequest, H256,
        U256, U64,
    },
};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::{
    bindings::IdleGame,
    core::types::{BotError, Result},
    types::{GameCall, GameInfo, GameStarted, ReceiptStatus, TeamInfo, TxIntent},
};

pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn block_height(&self) -> Result<u64>;

    /// `StartGame` events emitted since `from_block`.
    async fn game_start_events(&self, from_block: u64) -> Result<Vec<GameStarted>>;

    async fn game_info(&self, game_id: u64) -> Result<GameInfo>;

    async fn team_info(&self, team_id: u64) -> Result<TeamInfo>;

    async fn pending_nonce(&self, wallet: Address) -> Result<U256>;

    /// Sign with the key of `intent.from` and broadcast.
    async fn submit(&self, intent: &TxIntent) -> Result<H256>;

    /// Single receipt lookup; `None` while the transaction is not mined.
    async fn receipt(&self, tx_hash: H256) -> Result<Option<ReceiptStatus>>;

    /// Poll [`LedgerGateway::receipt`] every [`RECEIPT_POLL_INTERVAL`] until it is
    /// mined or `timeout` has elapsed.
    async fn poll_receipt(&self, tx_hash: H256, timeout: Duration) -> Result<ReceiptStatus> {
        let started = Instant::now();
        loop {
            match self.receipt(tx_hash).await {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => debug!(?tx_hash, "Checking for receipt"),
                Err(error) => warn!(?tx_hash, %error, "error fetching receipt"),
            }

            if started.elapsed() >= timeout {
                return Err(BotError::Timeout {
                    tx_hash: format!("{tx_hash:#x}"),
                    waited_secs: timeout.as_secs(),
                });
            }
            sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

pub(crate) fn to_u64(value: U256, what: &str) -> Result<u64> {
    if value.bits() > 64 {
        return Err(BotError::Data(format!("{what} {value} does not fit in u64")));
    }
    Ok(value.low_u64())
}

/// JSON-RPC backed gateway holding the signing keys of the managed wallets.
pub struct EthersLedger {
    provider: Arc<Provider<Http>>,
    contract: IdleGame<Provider<Http>>,
    contract_address: Address,
    chain_id: u64,
    wallets: HashMap<Address, LocalWallet>,
}

impl EthersLedger {
    pub fn new(rpc_url: &str, contract_address: Address, chain_id: u64, private_keys: &[String]) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| BotError::Config(format!("Failed to connect to RPC: {e}")))?;
        let provider = Arc::new(provider);

        let mut wallets = HashMap::new();
        for key in private_keys {
            let wallet = key
                .trim_start_matches("0x")
                .parse::<LocalWallet>()
                .map_err(|e| BotError::Config(format!("Invalid private key: {e}")))?
                .with_chain_id(chain_id);
            info!(wallet = ?wallet.address(), "Loaded signing key");
            wallets.insert(wallet.address(), wallet);
        }

        Ok(Self {
            contract: IdleGame::new(contract_address, provider.clone()),
            provider,
            contract_address,
            chain_id,
            wallets,
        })
    }

    /// Addresses we hold keys for.
    pub fn wallets(&self) -> Vec<Address> {
        let mut wallets: Vec<_> = self.wallets.keys().copied().collect();
        wallets.sort();
        wallets
    }

    fn calldata(&self, call: GameCall) -> Result<Bytes> {
        let data = match call {
            GameCall::Attack { game_id, team_id } => {
                self.contract.attack(U256::from(game_id), U256::from(team_id)).calldata()
            }
            GameCall::Settle { game_id } => self.contract.settle_game(U256::from(game_id)).calldata(),
        };
        data.ok_or_else(|| BotError::Submission(format!("could not encode {call}")))
    }
}

fn network<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> BotError {
    move |e| BotError::Network(format!("{context}: {e}"))
}

#[async_trait]
impl LedgerGateway for EthersLedger {
    async fn block_height(&self) -> Result<u64> {
        let height = self
            .provider
            .get_block_number()
            .await
            .map_err(network("error getting block number"))?;
        Ok(height.as_u64())
    }

    async fn game_start_events(&self, from_block: u64) -> Result<Vec<GameStarted>> {
        let events = self
            .contract
            .start_game_filter()
            .from_block(from_block)
            .query()
            .await
            .map_err(network("error filtering start game"))?;

        events
            .into_iter()
            .map(|event| {
                Ok(GameStarted {
                    game_id: to_u64(event.game_id, "game id")?,
                    team_id: to_u64(event.team_id, "team id")?,
                })
            })
            .collect()
    }

    async fn game_info(&self, game_id: u64) -> Result<GameInfo> {
        let (_team_id, _cra_reward, _tus_reward, start_time, _duration, _status) = self
            .contract
            .get_game_basic_info(U256::from(game_id))
            .call()
            .await
            .map_err(network("error getting game info"))?;

        Ok(GameInfo {
            game_id,
            start_time: i64::from(start_time),
        })
    }

    async fn team_info(&self, team_id: u64) -> Result<TeamInfo> {
        let (owner, _crab1, _crab2, _crab3, battle_point, _time_point, _current_game, _lock_to) = self
            .contract
            .get_team_info(U256::from(team_id))
            .call()
            .await
            .map_err(network("error getting team info"))?;

        Ok(TeamInfo {
            team_id,
            owner,
            battle_point: i64::from(battle_point),
        })
    }

    async fn pending_nonce(&self, wallet: Address) -> Result<U256> {
        self.provider
            .get_transaction_count(wallet, Some(BlockNumber::Pending.into()))
            .await
            .map_err(network("error getting nonce"))
    }

    async fn submit(&self, intent: &TxIntent) -> Result<H256> {
        let wallet = self
            .wallets
            .get(&intent.from)
            .ok_or_else(|| BotError::Submission(format!("no signing key for {:#x}", intent.from)))?;

        let tx: TypedTransaction = TransactionRequest::new()
            .from(intent.from)
            .to(self.contract_address)
            .data(self.calldata(intent.call)?)
            .nonce(intent.nonce)
            .gas_price(intent.gas_price)
            .gas(intent.gas_limit)
            .value(intent.value)
            .chain_id(self.chain_id)
            .into();

        let signature = wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| BotError::Submission(format!("error signing tx: {e}")))?;

        let pending = self
            .provider
            .send_raw_transaction(tx.rlp_signed(&signature))
            .await
            .map_err(|e| BotError::Submission(format!("error sending {}: {e}", intent.call)))?;

        Ok(pending.tx_hash())
    }

    async fn receipt(&self, tx_hash: H256) -> Result<Option<ReceiptStatus>> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(network("error getting receipt"))?;

        Ok(receipt.map(|receipt| {
            debug!(?tx_hash, block = ?receipt.block_number, gas_used = ?receipt.gas_used, "Receipt");
            if receipt.status == Some(U64::from(1)) {
                ReceiptStatus::Success
            } else {
                ReceiptStatus::Failed
            }
        }))
    }
}
