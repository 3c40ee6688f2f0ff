//! Poll one market's order book and keep a copy of it in cloud storage.
//!
//! Each process run is independent: load settings, acquire a storage
//! credential, fetch a validated snapshot from the exchange, then
//! create-or-replace the object the retention policy addresses.

pub mod config;
pub mod credentials;
pub mod error;
pub mod exchange;
pub mod run;
pub mod storage;
pub mod sync;
pub mod types;

#[cfg(test)]
mod testutil;

pub use error::{FetchError, RunError, SyncError};
pub use run::{poll_and_sync, run, RunReport};
pub use types::{OrderBookSnapshot, PriceLevel, TradingPair};
