use std::fmt;

use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeamStatus {
    Available,
    Busy,
    Lock,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for TeamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamStatus::Available => write!(f, "available"),
            TeamStatus::Busy => write!(f, "busy"),
            TeamStatus::Lock => write!(f, "lock"),
            TeamStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Snapshot of one of our teams as listed by the game API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    #[serde(rename = "team_id")]
    pub id: u64,
    #[serde(rename = "battle_point", default)]
    pub strength: i64,
    #[serde(rename = "owner")]
    pub wallet: Address,
    pub status: TeamStatus,
}

impl Team {
    pub fn is_available(&self) -> bool {
        self.status == TeamStatus::Available
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessAction {
    CreateGame,
    Attack,
    ReinforceDefense,
    ReinforceAttack,
    Settle,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEvent {
    pub action: ProcessAction,
    /// Unix seconds.
    pub transaction_time: i64,
}

/// A raid instance.
///
/// Opponent mines discovered on-chain only carry `id`, `defense_point` and
/// `start_time`; our own loots fetched from the API carry the attacking side
/// and the process log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    #[serde(rename = "game_id")]
    pub id: u64,
    #[serde(default)]
    pub defense_point: i64,
    /// Unix seconds.
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub attack_team_id: Option<u64>,
    #[serde(default)]
    pub attack_point: i64,
    #[serde(default)]
    pub attack_team_owner: Option<Address>,
    #[serde(default)]
    pub process: Vec<ProcessEvent>,
}

impl Game {
    pub fn last_process(&self) -> Option<&ProcessEvent> {
        self.process.last()
    }

    /// The attacking team, when the snapshot carries one.
    pub fn attack_team(&self) -> Option<Team> {
        Some(Team {
            id: self.attack_team_id?,
            strength: self.attack_point,
            wallet: self.attack_team_owner?,
            status: TeamStatus::Unknown,
        })
    }
}

/// `StartGame` log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameStarted {
    pub game_id: u64,
    pub team_id: u64,
}

/// Subset of the on-chain game state the scanner needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameInfo {
    pub game_id: u64,
    /// Unix seconds.
    pub start_time: i64,
}

/// Subset of the on-chain team state the scanner needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamInfo {
    pub team_id: u64,
    pub owner: Address,
    pub battle_point: i64,
}

/// Contract function targeted by a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameCall {
    Attack { game_id: u64, team_id: u64 },
    Settle { game_id: u64 },
}

impl fmt::Display for GameCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameCall::Attack { game_id, team_id } => {
                write!(f, "attack(game #{game_id}, team #{team_id})")
            }
            GameCall::Settle { game_id } => write!(f, "settleGame(game #{game_id})"),
        }
    }
}

/// Everything needed to sign one transaction. Built fresh per submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIntent {
    pub from: Address,
    pub call: GameCall,
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub value: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Failed,
}

/// Result of a confirmed submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmed {
    pub tx_hash: H256,
    pub link: String,
}
