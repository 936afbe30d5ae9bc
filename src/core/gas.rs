//! Gas price oracle.
//!
//! One background task publishes the feed's "fast" price into a lock-guarded
//! cell; submitters read the last published value and never wait for a
//! refresh in flight.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::U256;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::types::{BotError, Result};

pub const GWEI: u64 = 1_000_000_000;

pub fn gwei(amount: u64) -> U256 {
    U256::from(amount) * U256::from(GWEI)
}

pub fn to_gwei(wei: U256) -> U256 {
    wei / U256::from(GWEI)
}

/// Source of the recommended gas price.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GasFeed: Send + Sync {
    /// Recommended "fast" price in wei.
    async fn fast_price(&self) -> Result<U256>;
}

#[derive(Debug, Deserialize)]
struct GasPriceDict {
    data: GasTiers,
}

#[derive(Debug, Deserialize)]
struct GasTiers {
    fast: GasTier,
}

#[derive(Debug, Deserialize)]
struct GasTier {
    price: f64,
}

/// Debank `gas_price_dict_v2` feed.
pub struct DebankGasFeed {
    client: reqwest::Client,
    url: String,
}

impl DebankGasFeed {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl GasFeed for DebankGasFeed {
    async fn fast_price(&self) -> Result<U256> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| BotError::Network(format!("error fetching gas: {e}")))?;

        let body = response
            .text()
            .await
            .map_err(|e| BotError::Network(format!("error reading gas response: {e}")))?;

        parse_fast_price(&body)
    }
}

fn parse_fast_price(body: &str) -> Result<U256> {
    let dict: GasPriceDict =
        serde_json::from_str(body).map_err(|e| BotError::Data(format!("invalid gas response: {e}")))?;

    let price = dict.data.fast.price;
    if !price.is_finite() || price < 0.0 {
        return Err(BotError::Data(format!("invalid fast gas price: {price}")));
    }
    Ok(U256::from(price as u128))
}

pub struct GasOracle {
    feed: Arc<dyn GasFeed>,
    price: RwLock<Option<U256>>,
    interval: Duration,
    cancel: CancellationToken,
}

impl GasOracle {
    pub fn new(feed: Arc<dyn GasFeed>, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            feed,
            price: RwLock::new(None),
            interval,
            cancel,
        }
    }

    /// Fetch and publish a new price. On failure the previous value stays.
    pub async fn refresh(&self) -> Result<U256> {
        let price = self.feed.fast_price().await?;
        // The write lock is only held for the store, never across the fetch.
        *self.price.write().unwrap_or_else(|e| e.into_inner()) = Some(price);
        debug!(gas_gwei = %to_gwei(price), "Published gas price");
        Ok(price)
    }

    /// Last successfully published price.
    pub fn published(&self) -> Option<U256> {
        *self.price.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current_effective_price(&self, margin: U256) -> Result<U256> {
        self.published()
            .map(|price| price.saturating_add(margin))
            .ok_or_else(|| BotError::Network("gas price not available yet".to_string()))
    }

    /// Spawn the periodic refresher. Runs until [`GasOracle::stop`] or the parent
    /// token is cancelled.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let oracle = Arc::clone(self);
        tokio::spawn(async move {
            info!(interval = ?oracle.interval, "Gas update running");
            loop {
                tokio::select! {
                    _ = oracle.cancel.cancelled() => break,
                    _ = tokio::time::sleep(oracle.interval) => {}
                }
                if let Err(error) = oracle.refresh().await {
                    warn!(%error, "err updating gas");
                }
            }
            info!("Gas update stopped");
        })
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    fn oracle(feed: MockGasFeed) -> Arc<GasOracle> {
        Arc::new(GasOracle::new(Arc::new(feed), Duration::from_secs(10), CancellationToken::new()))
    }

    #[test]
    fn test_parse_fast_price() {
        let body = r#"{"data":{"slow":{"price":25000000000.0},"normal":{"price":26000000000.0},"fast":{"price":27500000000.0}},"error_code":0}"#;
        assert_eq!(parse_fast_price(body).unwrap(), U256::from(27_500_000_000u64));
        assert!(matches!(parse_fast_price(r#"{"data":{}}"#), Err(BotError::Data(_))));
    }

    #[tokio::test]
    async fn test_effective_price_adds_margin() {
        let mut feed = MockGasFeed::new();
        feed.expect_fast_price().returning(|| Ok(gwei(25)));
        let oracle = oracle(feed);

        assert!(oracle.current_effective_price(gwei(30)).is_err());
        oracle.refresh().await.unwrap();
        assert_eq!(oracle.current_effective_price(gwei(30)).unwrap(), gwei(55));
        assert_eq!(oracle.current_effective_price(U256::zero()).unwrap(), gwei(25));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_price() {
        let mut seq = Sequence::new();
        let mut feed = MockGasFeed::new();
        feed.expect_fast_price().times(1).in_sequence(&mut seq).returning(|| Ok(gwei(40)));
        feed.expect_fast_price()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(BotError::Network("feed down".into())));
        let oracle = oracle(feed);

        oracle.refresh().await.unwrap();
        assert!(oracle.refresh().await.is_err());
        assert_eq!(oracle.published(), Some(gwei(40)));
    }

    #[tokio::test]
    async fn test_concurrent_readers_see_published_value() {
        let mut feed = MockGasFeed::new();
        feed.expect_fast_price().returning(|| Ok(gwei(100)));
        let oracle = oracle(feed);
        oracle.refresh().await.unwrap();

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let oracle = Arc::clone(&oracle);
                tokio::spawn(async move { oracle.current_effective_price(gwei(30)).unwrap() })
            })
            .collect();
        for reader in readers {
            assert_eq!(reader.await.unwrap(), gwei(130));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresher_runs_until_stopped() {
        let mut feed = MockGasFeed::new();
        let mut seq = Sequence::new();
        feed.expect_fast_price()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(BotError::Network("feed down".into())));
        feed.expect_fast_price().returning(|| Ok(gwei(33)));
        let oracle = oracle(feed);

        let handle = oracle.start();
        // first tick fails, second succeeds
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(oracle.published(), Some(gwei(33)));

        oracle.stop();
        handle.await.unwrap();
    }
}
