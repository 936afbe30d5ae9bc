//! Per-wallet nonce allocation.
//!
//! A wallet's lock is held from the nonce read through the broadcast, so the
//! automatic sweep and the manual queue never hand out the same nonce.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ethers::types::{Address, U256};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::core::{ledger::LedgerGateway, types::Result};

#[derive(Default)]
pub struct NonceSequencer {
    wallets: Mutex<HashMap<Address, Arc<AsyncMutex<Option<U256>>>>>,
}

pub struct NonceGuard {
    wallet: Address,
    last_used: OwnedMutexGuard<Option<U256>>,
}

impl NonceSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `wallet`'s nonce sequence.
    pub async fn lock(&self, wallet: Address) -> NonceGuard {
        let cell = {
            let mut wallets = self.wallets.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(wallets.entry(wallet).or_default())
        };
        NonceGuard {
            wallet,
            last_used: cell.lock_owned().await,
        }
    }

    /// Drop the cached nonce of `wallet`; the next allocation trusts the chain.
    pub async fn forget(&self, wallet: Address) {
        self.lock(wallet).await.forget();
    }
}

impl NonceGuard {
    /// Next nonce: the chain's pending count, unless we already broadcast a
    /// transaction the node has not accounted for yet.
    pub async fn next(&self, ledger: &dyn LedgerGateway) -> Result<U256> {
        let pending = ledger.pending_nonce(self.wallet).await?;
        let nonce = match *self.last_used {
            Some(last) if last >= pending => last + 1,
            _ => pending,
        };
        debug!(wallet = ?self.wallet, %pending, %nonce, "Allocated nonce");
        Ok(nonce)
    }

    /// Record a nonce that made it to the network.
    pub fn commit(&mut self, nonce: U256) {
        *self.last_used = Some(nonce);
    }

    pub fn forget(&mut self) {
        if let Some(last) = self.last_used.take() {
            debug!(wallet = ?self.wallet, %last, "Forgot cached nonce");
        }
    }
}
