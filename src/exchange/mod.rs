pub mod kraken;
mod wire;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::types::{OrderBookSnapshot, TradingPair};

/// Anything that can produce a validated depth snapshot for one pair.
#[async_trait]
pub trait OrderBookSource: Send + Sync {
    /// Fetch at most `depth` levels per side for `pair`.
    async fn fetch(&self, pair: &TradingPair, depth: usize) -> Result<OrderBookSnapshot, FetchError>;
}

pub use kraken::KrakenClient;
