use std::{sync::Arc, time::Duration};

use eyre::{eyre, Result, WrapErr};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    bot::{console, coordinator::RaidCoordinator, report, scanner::EventScanner, submitter::TransactionSubmitter},
    config::AppConfig,
    core::{
        api::CrabadaApi,
        gas::{to_gwei, DebankGasFeed, GasOracle},
        ledger::EthersLedger,
        notifier::{LogNotifier, Notifier, TelegramNotifier},
    },
    utils::{link, time::current_timestamp},
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Everything a subcommand needs, wired from the config.
pub struct Bot {
    pub oracle: Arc<GasOracle>,
    pub coordinator: Arc<RaidCoordinator>,
    pub notifier: Arc<dyn Notifier>,
    pub cancel: CancellationToken,
}

impl Bot {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let cancel = CancellationToken::new();
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .wrap_err("Failed to build HTTP client")?;

        let notifier: Arc<dyn Notifier> = match config.notification.telegram() {
            Some((token, chat_id)) => Arc::new(TelegramNotifier::new(client.clone(), token, chat_id)),
            None => Arc::new(LogNotifier),
        };

        let ledger = Arc::new(EthersLedger::new(
            &config.rpc_url,
            config.contract_address,
            config.chain_id,
            &config.private_keys,
        )?);
        let mut wallets = ledger.wallets();
        for wallet in &config.wallets {
            if !wallets.contains(wallet) {
                wallets.push(*wallet);
            }
        }
        for wallet in &wallets {
            info!("Managed wallet {}", link::address(wallet));
        }

        let feed = Arc::new(DebankGasFeed::new(client.clone(), &config.gas_api_url));
        let oracle = Arc::new(GasOracle::new(feed, config.gas.refresh_interval, cancel.child_token()));
        let price = oracle.refresh().await.wrap_err("Initial gas price fetch failed")?;
        info!(gas_gwei = %to_gwei(price), "Gas price");

        let submitter = Arc::new(TransactionSubmitter::new(
            ledger.clone(),
            oracle.clone(),
            notifier.clone(),
            config.gas.clone(),
            config.submit.clone(),
        ));
        let scanner = EventScanner::new(ledger, submitter.clone(), notifier.clone(), config.scan.clone());
        let api = Arc::new(CrabadaApi::new(client, &config.api_url));
        let coordinator = Arc::new(RaidCoordinator::new(
            api,
            scanner,
            submitter,
            notifier.clone(),
            wallets,
            config.coordinator.clone(),
        ));

        Ok(Self {
            oracle,
            coordinator,
            notifier,
            cancel,
        })
    }

    /// Cancel everything on Ctrl-C.
    fn cancel_on_ctrl_c(&self) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, shutting down");
                cancel.cancel();
            }
        });
    }
}

/// Auto loop, manual attack queue, gas refresher and console until Ctrl-C.
pub async fn run(config: AppConfig) -> Result<()> {
    config.print_summary();
    let bot = Bot::new(&config).await?;
    bot.cancel_on_ctrl_c();

    let gas_task = bot.oracle.start();
    let queue_task = tokio::spawn({
        let coordinator = bot.coordinator.clone();
        let cancel = bot.cancel.clone();
        async move { coordinator.run_attack_queue(cancel).await }
    });
    let auto_task = tokio::spawn({
        let coordinator = bot.coordinator.clone();
        let cancel = bot.cancel.clone();
        async move { coordinator.run_auto(cancel).await }
    });
    let console_task = tokio::spawn(console::run(
        bot.coordinator.clone(),
        bot.oracle.clone(),
        bot.notifier.clone(),
        bot.cancel.clone(),
    ));

    info!("Crabada raider started");
    bot.cancel.cancelled().await;
    bot.oracle.stop();

    let (queue, auto, gas, console) = tokio::join!(queue_task, auto_task, gas_task, console_task);
    queue??;
    auto?;
    gas?;
    console?;
    info!("Crabada raider stopped");
    Ok(())
}

pub async fn raid(config: AppConfig) -> Result<()> {
    let bot = Bot::new(&config).await?;
    bot.cancel_on_ctrl_c();
    let scanned = bot.coordinator.raid(&bot.cancel, true).await?;
    info!(scanned, "Raid finished");
    Ok(())
}

pub async fn attack(config: AppConfig, team_id: u64) -> Result<()> {
    let bot = Bot::new(&config).await?;
    bot.cancel_on_ctrl_c();
    let team = bot
        .coordinator
        .team_for_id(team_id)
        .await?
        .ok_or_else(|| eyre!("Team #{team_id} not found in managed wallets"))?;
    bot.coordinator.attack(&team, &bot.cancel).await?;
    Ok(())
}

pub async fn settle_all(config: AppConfig) -> Result<()> {
    let bot = Bot::new(&config).await?;
    let settled = bot.coordinator.settle_all(false).await?;
    info!(settled, "Settle finished");
    Ok(())
}

pub async fn settle(config: AppConfig, game_id: u64) -> Result<()> {
    let bot = Bot::new(&config).await?;
    bot.coordinator.settle_game(game_id).await?;
    Ok(())
}

pub async fn loots(config: AppConfig) -> Result<()> {
    let bot = Bot::new(&config).await?;
    let loots = bot.coordinator.active_loots().await?;
    bot.notifier
        .notify(&report::loot_report(&loots, current_timestamp()))
        .await;
    Ok(())
}

pub async fn teams(config: AppConfig) -> Result<()> {
    let bot = Bot::new(&config).await?;
    let teams = bot.coordinator.all_teams().await?;
    bot.notifier.notify(&report::team_report(&teams)).await;
    Ok(())
}

pub async fn gas(config: AppConfig) -> Result<()> {
    let bot = Bot::new(&config).await?;
    bot.notifier.notify(&report::gas_report(bot.oracle.published())).await;
    Ok(())
}
