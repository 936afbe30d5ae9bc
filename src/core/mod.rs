//! Engine building blocks: chain access, gas pricing, nonce sequencing, the
//! game API and operator notifications.

pub mod api;
pub mod gas;
pub mod ledger;
pub mod nonce;
pub mod notifier;
pub mod types;
