use std::fmt;
use std::time::Duration;

use clap::Parser;
use ethers::types::{Address, U256};
use tracing::info;

use crate::core::{
    api::DEFAULT_API_URL,
    gas::{gwei, to_gwei},
    types::{BotError, Result},
};

pub const AVAX_CHAIN_ID: u64 = 43114;
pub const IDLE_CONTRACT_ADDRESS: &str = "0x82a85407BD612f52577909F4A58bfC6873f14DA8";
pub const GAS_API_URL: &str = "https://api.debank.com/chain/gas_price_dict_v2?chain=avax";

/// Shared configuration for every subcommand.
#[derive(Clone, Debug, Parser)]
pub struct ConfigArgs {
    #[arg(long, env = "AVAX_RPC_URL", default_value = "https://api.avax.network/ext/bc/C/rpc")]
    pub rpc_url: String,

    #[arg(long, env = "IDLE_CONTRACT_ADDRESS", default_value = IDLE_CONTRACT_ADDRESS)]
    pub contract_address: Address,

    /// Hex private keys of the managed wallets, comma separated.
    #[arg(long, env = "BOT_PRIVATE_KEYS", value_delimiter = ',', hide_env_values = true)]
    pub private_keys: Vec<String>,

    /// Extra wallets to report on without signing for them.
    #[arg(long, env = "MANAGED_WALLETS", value_delimiter = ',')]
    pub wallets: Vec<Address>,

    #[arg(long, env = "IDLE_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    #[arg(long, env = "GAS_API_URL", default_value = GAS_API_URL)]
    pub gas_api_url: String,

    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_bot_token: Option<String>,

    #[arg(long, env = "TELEGRAM_CHAT_ID", allow_hyphen_values = true)]
    pub telegram_chat_id: Option<i64>,

    /// Added on top of the fast gas price.
    #[arg(long, env = "GAS_MARGIN_GWEI", default_value_t = 30)]
    pub gas_margin_gwei: u64,

    /// Transactions priced at or above this are not sent.
    #[arg(long, env = "GAS_CEILING_GWEI", default_value_t = 200)]
    pub gas_ceiling_gwei: u64,

    #[arg(long, env = "GAS_LIMIT", default_value_t = 200_000)]
    pub gas_limit: u64,
}

#[derive(Debug, Clone)]
pub struct GasPolicy {
    pub margin: U256,
    pub ceiling: U256,
    pub gas_limit: U256,
    pub refresh_interval: Duration,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            margin: gwei(30),
            ceiling: gwei(200),
            gas_limit: U256::from(200_000u64),
            refresh_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmitPolicy {
    pub attack_timeout: Duration,
    pub settle_timeout: Duration,
}

impl Default for SubmitPolicy {
    fn default() -> Self {
        Self {
            attack_timeout: Duration::from_secs(120),
            settle_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Consecutive failed attacks before a team's scan is aborted.
    pub max_consecutive_errors: u32,
    /// Wait between polls while the block height has not advanced.
    pub idle_poll: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_consecutive_errors: 3,
            idle_poll: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub queue_capacity: usize,
    pub auto_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 5,
            auto_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Default)]
pub struct NotificationConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<i64>,
}

impl NotificationConfig {
    pub fn telegram(&self) -> Option<(&str, i64)> {
        Some((self.telegram_bot_token.as_deref()?, self.telegram_chat_id?))
    }
}

impl fmt::Debug for NotificationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationConfig")
            .field("telegram_bot_token", &self.telegram_bot_token.as_ref().map(|_| "<redacted>"))
            .field("telegram_chat_id", &self.telegram_chat_id)
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub contract_address: Address,
    pub api_url: String,
    pub gas_api_url: String,
    pub private_keys: Vec<String>,
    pub wallets: Vec<Address>,
    pub gas: GasPolicy,
    pub submit: SubmitPolicy,
    pub scan: ScanConfig,
    pub coordinator: CoordinatorConfig,
    pub notification: NotificationConfig,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("contract_address", &self.contract_address)
            .field("api_url", &self.api_url)
            .field("gas_api_url", &self.gas_api_url)
            .field("private_keys", &format!("<{} keys>", self.private_keys.len()))
            .field("wallets", &self.wallets)
            .field("gas", &self.gas)
            .field("submit", &self.submit)
            .field("scan", &self.scan)
            .field("coordinator", &self.coordinator)
            .field("notification", &self.notification)
            .finish()
    }
}

impl TryFrom<ConfigArgs> for AppConfig {
    type Error = BotError;

    fn try_from(args: ConfigArgs) -> Result<Self> {
        let config = AppConfig {
            rpc_url: args.rpc_url,
            chain_id: AVAX_CHAIN_ID,
            contract_address: args.contract_address,
            api_url: args.api_url,
            gas_api_url: args.gas_api_url,
            private_keys: args.private_keys,
            wallets: args.wallets,
            gas: GasPolicy {
                margin: gwei(args.gas_margin_gwei),
                ceiling: gwei(args.gas_ceiling_gwei),
                gas_limit: U256::from(args.gas_limit),
                ..GasPolicy::default()
            },
            submit: SubmitPolicy::default(),
            scan: ScanConfig::default(),
            coordinator: CoordinatorConfig::default(),
            notification: NotificationConfig {
                telegram_bot_token: args.telegram_bot_token,
                telegram_chat_id: args.telegram_chat_id,
            },
        };
        config.validate()?;
        Ok(config)
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if url::Url::parse(&self.rpc_url).is_err() {
            return Err(BotError::Config(format!("Invalid RPC URL: {}", self.rpc_url)));
        }
        if url::Url::parse(&self.api_url).is_err() {
            return Err(BotError::Config(format!("Invalid API URL: {}", self.api_url)));
        }
        if url::Url::parse(&self.gas_api_url).is_err() {
            return Err(BotError::Config(format!("Invalid gas API URL: {}", self.gas_api_url)));
        }
        if self.private_keys.is_empty() && self.wallets.is_empty() {
            return Err(BotError::Config(
                "at least one of BOT_PRIVATE_KEYS or MANAGED_WALLETS is required".to_string(),
            ));
        }
        if self.gas.margin >= self.gas.ceiling {
            return Err(BotError::Config("gas margin must be below the gas ceiling".to_string()));
        }
        if self.gas.gas_limit.is_zero() {
            return Err(BotError::Config("gas limit cannot be zero".to_string()));
        }
        if self.scan.max_consecutive_errors == 0 {
            return Err(BotError::Config("max_consecutive_errors must be at least 1".to_string()));
        }
        if self.coordinator.queue_capacity == 0 {
            return Err(BotError::Config("queue capacity must be at least 1".to_string()));
        }
        if self.notification.telegram_bot_token.is_some() != self.notification.telegram_chat_id.is_some() {
            return Err(BotError::Config(
                "TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID must be set together".to_string(),
            ));
        }
        Ok(())
    }

    /// Log the configuration without secrets.
    pub fn print_summary(&self) {
        info!("=== Config ===");
        info!("RPC URL: {} (chain id {})", self.rpc_url, self.chain_id);
        info!("Idle contract: {:#x}", self.contract_address);
        info!("Signing keys: {}", self.private_keys.len());
        info!("Report-only wallets: {}", self.wallets.len());
        info!(
            "Gas: +{} gwei margin, {} gwei ceiling, limit {}",
            to_gwei(self.gas.margin),
            to_gwei(self.gas.ceiling),
            self.gas.gas_limit
        );
        info!(
            "Telegram notifications: {}",
            if self.notification.telegram().is_some() { "enabled" } else { "disabled" }
        );
        info!("==============");
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        rpc_url: "http://127.0.0.1:8545".to_string(),
        chain_id: AVAX_CHAIN_ID,
        contract_address: IDLE_CONTRACT_ADDRESS.parse().unwrap(),
        api_url: DEFAULT_API_URL.to_string(),
        gas_api_url: GAS_API_URL.to_string(),
        private_keys: Vec::new(),
        wallets: vec![Address::repeat_byte(0xaa)],
        gas: GasPolicy::default(),
        submit: SubmitPolicy::default(),
        scan: ScanConfig::default(),
        coordinator: CoordinatorConfig::default(),
        notification: NotificationConfig::default(),
    }
}
