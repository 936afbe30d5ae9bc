use ethers::types::U256;

/// Error type shared by every engine component
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Transient RPC / HTTP failure; callers retry by looping.
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed or error-coded response from the game API.
    #[error("Data error: {0}")]
    Data(String),

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Transaction {tx_hash} reverted on game #{game_id}")]
    TransactionReverted { game_id: u64, tx_hash: String },

    #[error("Transaction {tx_hash} not confirmed after {waited_secs}s")]
    Timeout { tx_hash: String, waited_secs: u64 },

    #[error("Gas price {price_gwei} gwei is at or above the {ceiling_gwei} gwei ceiling")]
    GasTooHigh { price_gwei: U256, ceiling_gwei: U256 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Attack queue is full")]
    QueueFull,
}

impl BotError {
    /// Whether the failure is worth retrying in a polling loop.
    pub fn is_transient(&self) -> bool {
        matches!(self, BotError::Network(_))
    }

    /// Failures that count toward the per-team circuit breaker.
    pub fn counts_toward_breaker(&self) -> bool {
        !matches!(
            self,
            BotError::GasTooHigh { .. } | BotError::Config(_) | BotError::QueueFull
        )
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
