//! In-memory fakes for the chain, the game API and the notification channel.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use tokio_util::sync::CancellationToken;

use crate::{
    bot::submitter::TransactionSubmitter,
    config::{GasPolicy, SubmitPolicy},
    core::{
        api::GameApi,
        gas::{GasFeed, GasOracle},
        ledger::LedgerGateway,
        notifier::Notifier,
        types::{BotError, Result},
    },
    types::{Game, GameInfo, GameStarted, ReceiptStatus, Team, TeamInfo, TeamStatus, TxIntent},
};

pub const WALLET: Address = Address::repeat_byte(0xaa);

pub fn team(id: u64, strength: i64) -> Team {
    Team {
        id,
        strength,
        wallet: WALLET,
        status: TeamStatus::Available,
    }
}

#[derive(Default)]
struct LedgerState {
    height: u64,
    height_errors: u32,
    events: BTreeMap<u64, Vec<GameStarted>>,
    game_start: HashMap<u64, i64>,
    team_battle_point: HashMap<u64, i64>,
    filter_calls: Vec<u64>,
    pending_nonce: u64,
    nonce_reads: u32,
    failing_submissions: u32,
    submit_attempts: u32,
    submissions: Vec<TxIntent>,
    mine_after: Option<(u32, ReceiptStatus)>,
    polls_by_tx: HashMap<H256, u32>,
    receipt_polls: u32,
}

#[derive(Default)]
pub struct FakeLedger {
    state: Mutex<LedgerState>,
}

impl FakeLedger {
    fn state(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap()
    }

    /// A `StartGame` event at `block` for a game defended with `defense`.
    pub fn add_game(&self, block: u64, game_id: u64, team_id: u64, defense: i64, start_time: i64) {
        let mut state = self.state();
        state.height = state.height.max(block);
        state.events.entry(block).or_default().push(GameStarted { game_id, team_id });
        state.game_start.insert(game_id, start_time);
        state.team_battle_point.insert(team_id, defense);
    }

    /// A bare `StartGame` event whose game and team cannot be read back.
    pub fn add_event(&self, block: u64, game_id: u64, team_id: u64) {
        let mut state = self.state();
        state.height = state.height.max(block);
        state.events.entry(block).or_default().push(GameStarted { game_id, team_id });
    }

    pub fn set_height(&self, height: u64) {
        self.state().height = height;
    }

    pub fn fail_block_height(&self, times: u32) {
        self.state().height_errors = times;
    }

    pub fn set_pending_nonce(&self, nonce: u64) {
        self.state().pending_nonce = nonce;
    }

    /// The next `times` broadcasts are rejected.
    pub fn fail_submissions(&self, times: u32) {
        self.state().failing_submissions = times;
    }

    /// Every transaction gets a receipt on its `polls`-th lookup.
    pub fn mine_after(&self, polls: u32, status: ReceiptStatus) {
        self.state().mine_after = Some((polls, status));
    }

    pub fn submissions(&self) -> Vec<TxIntent> {
        self.state().submissions.clone()
    }

    pub fn submit_attempts(&self) -> u32 {
        self.state().submit_attempts
    }

    pub fn nonce_reads(&self) -> u32 {
        self.state().nonce_reads
    }

    pub fn receipt_polls(&self) -> u32 {
        self.state().receipt_polls
    }

    pub fn filter_calls(&self) -> Vec<u64> {
        self.state().filter_calls.clone()
    }
}

#[async_trait]
impl LedgerGateway for FakeLedger {
    async fn block_height(&self) -> Result<u64> {
        let mut state = self.state();
        if state.height_errors > 0 {
            state.height_errors -= 1;
            return Err(BotError::Network("connection reset".to_string()));
        }
        Ok(state.height)
    }

    async fn game_start_events(&self, from_block: u64) -> Result<Vec<GameStarted>> {
        let mut state = self.state();
        state.filter_calls.push(from_block);
        let events = state
            .events
            .iter()
            .filter(|(block, _)| **block >= from_block)
            .flat_map(|(_, events)| events.iter().copied())
            .collect();
        Ok(events)
    }

    async fn game_info(&self, game_id: u64) -> Result<GameInfo> {
        let state = self.state();
        let start_time = *state
            .game_start
            .get(&game_id)
            .ok_or_else(|| BotError::Network(format!("execution reverted: game {game_id}")))?;
        Ok(GameInfo { game_id, start_time })
    }

    async fn team_info(&self, team_id: u64) -> Result<TeamInfo> {
        let state = self.state();
        let battle_point = *state
            .team_battle_point
            .get(&team_id)
            .ok_or_else(|| BotError::Network(format!("execution reverted: team {team_id}")))?;
        Ok(TeamInfo {
            team_id,
            owner: Address::repeat_byte(0xbb),
            battle_point,
        })
    }

    async fn pending_nonce(&self, _wallet: Address) -> Result<U256> {
        let mut state = self.state();
        state.nonce_reads += 1;
        Ok(U256::from(state.pending_nonce))
    }

    async fn submit(&self, intent: &TxIntent) -> Result<H256> {
        let mut state = self.state();
        state.submit_attempts += 1;
        if state.failing_submissions > 0 {
            state.failing_submissions -= 1;
            return Err(BotError::Submission("nonce too low".to_string()));
        }
        state.submissions.push(intent.clone());
        Ok(H256::from_low_u64_be(state.submissions.len() as u64))
    }

    async fn receipt(&self, tx_hash: H256) -> Result<Option<ReceiptStatus>> {
        let mut state = self.state();
        state.receipt_polls += 1;
        let polls = {
            let polls = state.polls_by_tx.entry(tx_hash).or_default();
            *polls += 1;
            *polls
        };
        Ok(match state.mine_after {
            Some((after, status)) if polls >= after => Some(status),
            _ => None,
        })
    }
}

#[derive(Default)]
struct ApiState {
    teams: HashMap<Address, Vec<Team>>,
    loots: HashMap<Address, Vec<Game>>,
    games: HashMap<u64, Game>,
    failing: bool,
}

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<ApiState>,
}

impl FakeApi {
    pub fn add_team(&self, team: Team) {
        self.state.lock().unwrap().teams.entry(team.wallet).or_default().push(team);
    }

    pub fn set_team_status(&self, team_id: u64, status: TeamStatus) {
        let mut state = self.state.lock().unwrap();
        for team in state.teams.values_mut().flatten() {
            if team.id == team_id {
                team.status = status;
            }
        }
    }

    pub fn add_loot(&self, wallet: Address, game: Game) {
        let mut state = self.state.lock().unwrap();
        state.games.insert(game.id, game.clone());
        state.loots.entry(wallet).or_default().push(game);
    }

    pub fn fail_requests(&self) {
        self.state.lock().unwrap().failing = true;
    }

    fn check(&self) -> Result<()> {
        if self.state.lock().unwrap().failing {
            return Err(BotError::Data("error fetching: INTERNAL_SERVER_ERROR, message: boom".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl GameApi for FakeApi {
    async fn active_loots(&self, wallet: Address) -> Result<Vec<Game>> {
        self.check()?;
        Ok(self.state.lock().unwrap().loots.get(&wallet).cloned().unwrap_or_default())
    }

    async fn teams(&self, wallet: Address) -> Result<Vec<Team>> {
        self.check()?;
        Ok(self.state.lock().unwrap().teams.get(&wallet).cloned().unwrap_or_default())
    }

    async fn game(&self, game_id: u64) -> Result<Game> {
        self.check()?;
        self.state
            .lock()
            .unwrap()
            .games
            .get(&game_id)
            .cloned()
            .ok_or_else(|| BotError::Data(format!("error fetching game by id: NOT_FOUND, message: {game_id}")))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages().iter().filter(|message| message.contains(needle)).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str) {
        self.messages.lock().unwrap().push(text.to_string());
    }
}

pub struct FixedGasFeed(pub U256);

#[async_trait]
impl GasFeed for FixedGasFeed {
    async fn fast_price(&self) -> Result<U256> {
        Ok(self.0)
    }
}

pub async fn oracle_with(price: U256) -> Arc<GasOracle> {
    let oracle = Arc::new(GasOracle::new(
        Arc::new(FixedGasFeed(price)),
        Duration::from_secs(10),
        CancellationToken::new(),
    ));
    oracle.refresh().await.unwrap();
    oracle
}

pub async fn submitter_with(
    ledger: Arc<FakeLedger>,
    notifier: Arc<RecordingNotifier>,
    price: U256,
) -> TransactionSubmitter {
    TransactionSubmitter::new(
        ledger,
        oracle_with(price).await,
        notifier,
        GasPolicy::default(),
        SubmitPolicy::default(),
    )
}
