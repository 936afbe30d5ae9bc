//! Crabada idle game HTTP API.

use async_trait::async_trait;
use ethers::types::Address;
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;

use crate::{
    core::types::{BotError, Result},
    types::{Game, Team},
};

pub const DEFAULT_API_URL: &str = "https://idle-api.crabada.com/public/idle";

#[async_trait]
pub trait GameApi: Send + Sync {
    /// Open loot games where `wallet` is the looter.
    async fn active_loots(&self, wallet: Address) -> Result<Vec<Game>>;

    async fn teams(&self, wallet: Address) -> Result<Vec<Team>>;

    /// Single game snapshot, including the attacking team.
    async fn game(&self, game_id: u64) -> Result<Game>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(rename = "totalRecord", default)]
    total_record: u64,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

fn unwrap_envelope<T: DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|e| BotError::Data(format!("invalid {what} response: {e}")))?;

    if let Some(code) = envelope.error_code.filter(|code| !code.is_empty()) {
        return Err(BotError::Data(format!(
            "error fetching {what}: {code}, message: {}",
            envelope.message.unwrap_or_default()
        )));
    }

    envelope
        .result
        .ok_or_else(|| BotError::Data(format!("empty {what} response")))
}

pub struct CrabadaApi {
    client: reqwest::Client,
    base_url: String,
}

impl CrabadaApi {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(%url, "GET");

        // error-coded bodies come with non-2xx statuses too, so read the body either way
        let body = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BotError::Network(format!("error fetching {what}: {e}")))?
            .text()
            .await
            .map_err(|e| BotError::Network(format!("error reading {what}: {e}")))?;

        unwrap_envelope(&body, what)
    }
}

#[async_trait]
impl GameApi for CrabadaApi {
    async fn active_loots(&self, wallet: Address) -> Result<Vec<Game>> {
        let page: Page<Game> = self
            .get(
                &format!("mines?looter_address={wallet:#x}&page=1&status=open&limit=8"),
                "active loots",
            )
            .await?;
        Ok(page.data)
    }

    async fn teams(&self, wallet: Address) -> Result<Vec<Team>> {
        let page: Page<Team> = self.get(&format!("teams?user_address={wallet:#x}"), "teams").await?;
        if page.total_record == 0 {
            return Ok(Vec::new());
        }
        Ok(page.data)
    }

    async fn game(&self, game_id: u64) -> Result<Game> {
        self.get(&format!("mine/{game_id}"), "game by id").await
    }
}
