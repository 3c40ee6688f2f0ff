//! One scheduled invocation: credentials, fetch, sync. Nothing survives the
//! process; the scheduler's next trigger is the retry.

use crate::config::{RetentionPolicy, Settings, StorageBackend};
use crate::credentials::{Credential, DRIVE_SCOPE};
use crate::error::RunError;
use crate::exchange::{KrakenClient, OrderBookSource};
use crate::storage::{DriveStore, LocalStore, ObjectStore};
use crate::sync::{SyncOutcome, SyncTarget, Syncer};
use crate::types::TradingPair;

/// What a successful run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub target: SyncTarget,
    pub outcome: SyncOutcome,
    pub bids: usize,
    pub asks: usize,
}

/// Fetch one snapshot and persist it. The store is never touched if the
/// fetch fails.
pub async fn poll_and_sync(
    source: &dyn OrderBookSource,
    store: &dyn ObjectStore,
    pair: &TradingPair,
    depth: usize,
    policy: RetentionPolicy,
) -> Result<RunReport, RunError> {
    let snap = source.fetch(pair, depth).await?;
    tracing::info!(
        pair = %pair,
        bids = snap.bids().len(),
        asks = snap.asks().len(),
        best_bid = ?snap.best_bid().map(|l| l.price),
        best_ask = ?snap.best_ask().map(|l| l.price),
        "snapshot fetched"
    );

    let target = SyncTarget::for_snapshot(store.location(), policy, &snap);
    let outcome = Syncer::new(store).sync(&snap, &target).await?;
    tracing::info!(location = %target.location, key = %target.key, outcome = ?outcome, "snapshot synced");

    Ok(RunReport {
        target,
        outcome,
        bids: snap.bids().len(),
        asks: snap.asks().len(),
    })
}

async fn open_store(s: &Settings, http: &reqwest::Client) -> Result<Box<dyn ObjectStore>, RunError> {
    let folder = s.folder_id().map_err(|e| RunError::Config(e.to_string()))?;
    match s.storage_backend {
        StorageBackend::Local => Ok(Box::new(LocalStore::new(folder))),
        StorageBackend::Drive => {
            let cred = Credential::acquire(s)?;
            tracing::debug!(credential = ?cred, "credential loaded");
            let token = cred.access_token(http, DRIVE_SCOPE).await?;
            Ok(Box::new(DriveStore::new(&s.drive_api_url, http.clone(), token, folder)))
        }
    }
}

/// Full run from settings, bounded by the run deadline.
pub async fn run(s: &Settings) -> Result<RunReport, RunError> {
    let http = reqwest::Client::builder()
        .timeout(s.http_timeout())
        .user_agent(concat!("book-sync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| RunError::Config(format!("build http client: {e}")))?;

    let work = async {
        let store = open_store(s, &http).await?;
        let exchange = KrakenClient::new(&s.exchange_url, http.clone());
        poll_and_sync(&exchange, store.as_ref(), &s.pair, s.depth, s.retention).await
    };

    tokio::time::timeout(s.run_timeout(), work)
        .await
        .map_err(|_| RunError::TimedOut(s.run_timeout_sec))?
}
