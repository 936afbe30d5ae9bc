mod bindings;
mod bot;
mod config;
mod core;
mod strategy;
#[cfg(test)]
mod testing;
mod types;
mod utils;

use clap::Parser;
use eyre::Result;

use crate::config::{AppConfig, ConfigArgs};

#[derive(clap::Parser)]
#[command(version, about = "Crabada idle game raid and settlement bot")]
pub struct Args {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand)]
pub enum Command {
    /// Run the auto loop, the manual attack queue and the console until Ctrl-C
    StartBot,
    /// One sweep over every available team
    Raid,
    /// Find a game and attack it with one team
    Attack {
        #[arg(long)]
        team_id: u64,
    },
    /// Settle every loot past its settle time
    SettleAll,
    Settle {
        #[arg(long)]
        game_id: u64,
    },
    /// Report the active loots of the managed wallets
    Loots,
    /// Report the teams of the managed wallets
    Teams,
    /// Report the current gas price
    Gas,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    bot::start_bot::init_tracing();

    let config = AppConfig::try_from(args.config)?;

    match args.command {
        Command::StartBot => bot::start_bot::run(config).await,
        Command::Raid => bot::start_bot::raid(config).await,
        Command::Attack { team_id } => bot::start_bot::attack(config, team_id).await,
        Command::SettleAll => bot::start_bot::settle_all(config).await,
        Command::Settle { game_id } => bot::start_bot::settle(config, game_id).await,
        Command::Loots => bot::start_bot::loots(config).await,
        Command::Teams => bot::start_bot::teams(config).await,
        Command::Gas => bot::start_bot::gas(config).await,
    }
}
