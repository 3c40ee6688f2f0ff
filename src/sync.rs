use crate::config::RetentionPolicy;
use crate::error::SyncError;
use crate::storage::{ObjectId, ObjectKey, ObjectStore};
use crate::types::OrderBookSnapshot;

pub const CSV_HEADER: &str = "timestamp_utc,best_bid,best_ask";
const JSON_MIME: &str = "application/json";
const CSV_MIME: &str = "text/csv";

/// Where one snapshot goes: the store's root location plus a key derived
/// from the pair (and, for `history`, the capture time).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    pub location: String,
    pub key: ObjectKey,
    pub policy: RetentionPolicy,
}

impl SyncTarget {
    pub fn for_snapshot(location: impl Into<String>, policy: RetentionPolicy, snap: &OrderBookSnapshot) -> Self {
        let slug = snap.pair().slug();
        let key = match policy {
            RetentionPolicy::Latest => ObjectKey::from_segments(&[&slug, "latest.json"]),
            RetentionPolicy::History => {
                let t = snap.captured_at();
                let day = t.format("%Y-%m-%d").to_string();
                let file = format!("{}.json", t.format("%H%M%S%3f"));
                ObjectKey::from_segments(&[&slug, &day, &file])
            }
            RetentionPolicy::Csv => ObjectKey::from_segments(&[&slug, "orderbook_snapshots.csv"]),
        };
        Self {
            location: location.into(),
            key,
            policy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Created(ObjectId),
    Replaced(ObjectId),
    /// The object already held this capture
    Unchanged(ObjectId),
}

/// Writes snapshots with create-or-replace semantics.
pub struct Syncer<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> Syncer<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    pub async fn sync(&self, snap: &OrderBookSnapshot, target: &SyncTarget) -> Result<SyncOutcome, SyncError> {
        let existing = self.store.lookup(&target.key).await?;

        let (body, mime) = match target.policy {
            RetentionPolicy::Latest | RetentionPolicy::History => (encode_json(snap)?, JSON_MIME),
            RetentionPolicy::Csv => {
                let current = match &existing {
                    Some(id) => {
                        let bytes = self.store.download(id).await?;
                        String::from_utf8(bytes).map_err(|e| SyncError::Corrupt {
                            key: target.key.to_string(),
                            reason: e.to_string(),
                        })?
                    }
                    None => String::new(),
                };
                match append_csv_row(&current, snap) {
                    Some(next) => (next.into_bytes(), CSV_MIME),
                    None => {
                        let id = existing.ok_or_else(|| SyncError::Io("csv unchanged but absent".into()))?;
                        tracing::info!(key = %target.key, "capture already logged");
                        return Ok(SyncOutcome::Unchanged(id));
                    }
                }
            }
        };

        let outcome = match existing {
            Some(id) => {
                self.store.replace(&id, body, mime).await?;
                SyncOutcome::Replaced(id)
            }
            None => SyncOutcome::Created(self.store.create(&target.key, body, mime).await?),
        };
        Ok(outcome)
    }
}

fn encode_json(snap: &OrderBookSnapshot) -> Result<Vec<u8>, SyncError> {
    let mut body = serde_json::to_vec_pretty(snap).map_err(|e| SyncError::Io(format!("encode snapshot: {e}")))?;
    body.push(b'\n');
    Ok(body)
}

pub fn csv_row(snap: &OrderBookSnapshot) -> String {
    let cell = |l: Option<&crate::types::PriceLevel>| l.map(|l| l.price.to_string()).unwrap_or_default();
    format!(
        "{},{},{}",
        snap.captured_at().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        cell(snap.best_bid()),
        cell(snap.best_ask())
    )
}

/// New file content with the snapshot's row appended, or `None` if the last
/// row already carries this capture's timestamp.
fn append_csv_row(current: &str, snap: &OrderBookSnapshot) -> Option<String> {
    let row = csv_row(snap);
    let ts = row.split(',').next().unwrap_or_default();

    let last = current.lines().rev().find(|l| !l.trim().is_empty());
    if last.and_then(|l| l.split(',').next()) == Some(ts) {
        return None;
    }

    let mut out = if current.trim().is_empty() {
        format!("{CSV_HEADER}\n")
    } else {
        current.to_string()
    };
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&row);
    out.push('\n');
    Some(out)
}
