#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use book_sync::error::{FetchError, SyncError};
use book_sync::exchange::OrderBookSource;
use book_sync::storage::{ObjectId, ObjectKey, ObjectStore};
use book_sync::types::{OrderBookSnapshot, PriceLevel, TradingPair};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

/// One canned exchange reply.
pub enum Reply {
    Book { bids: Vec<(Decimal, Decimal)>, asks: Vec<(Decimal, Decimal)> },
    Fail(FetchError),
}

/// Exchange stand-in. Books still go through the snapshot's validation, the
/// same way a decoded upstream response does.
pub struct ScriptedSource {
    replies: Mutex<VecDeque<Reply>>,
    clock: Mutex<DateTime<Utc>>,
    pub calls: Mutex<usize>,
}

impl ScriptedSource {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            clock: Mutex::new(Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()),
            calls: Mutex::new(0),
        }
    }
}

fn levels(raw: Vec<(Decimal, Decimal)>) -> Vec<PriceLevel> {
    raw.into_iter().map(|(p, s)| PriceLevel::new(p, s)).collect()
}

#[async_trait]
impl OrderBookSource for ScriptedSource {
    async fn fetch(&self, pair: &TradingPair, depth: usize) -> Result<OrderBookSnapshot, FetchError> {
        *self.calls.lock().unwrap() += 1;
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted reply left");
        let captured_at = {
            let mut clock = self.clock.lock().unwrap();
            let now = *clock;
            *clock = now + chrono::Duration::minutes(5);
            now
        };
        match reply {
            Reply::Book { bids, asks } => {
                let bids = levels(bids).into_iter().take(depth).collect();
                let asks = levels(asks).into_iter().take(depth).collect();
                Ok(OrderBookSnapshot::new(pair.clone(), captured_at, bids, asks)?)
            }
            Reply::Fail(e) => Err(e),
        }
    }
}

pub type Failure = fn() -> SyncError;

/// In-memory object store that counts every write.
pub struct MemoryStore {
    objects: Mutex<BTreeMap<ObjectKey, (ObjectId, Vec<u8>)>>,
    next_id: Mutex<u64>,
    fail: Mutex<Option<Failure>>,
    pub creates: Mutex<usize>,
    pub replaces: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            next_id: Mutex::new(0),
            fail: Mutex::new(None),
            creates: Mutex::new(0),
            replaces: Mutex::new(0),
        }
    }

    /// Every subsequent call fails with `f()`.
    pub fn fail_with(&self, f: Failure) {
        *self.fail.lock().unwrap() = Some(f);
    }

    fn check(&self) -> Result<(), SyncError> {
        match *self.fail.lock().unwrap() {
            Some(f) => Err(f()),
            None => Ok(()),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().map(|k| k.to_string()).collect()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let key = ObjectKey::new(key).unwrap();
        self.objects.lock().unwrap().get(&key).map(|(_, b)| b.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn location(&self) -> &str {
        "memory"
    }

    async fn lookup(&self, key: &ObjectKey) -> Result<Option<ObjectId>, SyncError> {
        self.check()?;
        Ok(self.objects.lock().unwrap().get(key).map(|(id, _)| id.clone()))
    }

    async fn download(&self, id: &ObjectId) -> Result<Vec<u8>, SyncError> {
        self.check()?;
        self.objects
            .lock()
            .unwrap()
            .values()
            .find(|(oid, _)| oid == id)
            .map(|(_, b)| b.clone())
            .ok_or_else(|| SyncError::Rejected { status: 404, body: id.to_string() })
    }

    async fn create(&self, key: &ObjectKey, body: Vec<u8>, _content_type: &str) -> Result<ObjectId, SyncError> {
        self.check()?;
        let mut objects = self.objects.lock().unwrap();
        assert!(!objects.contains_key(key), "create over existing key {key}");
        let id = {
            let mut n = self.next_id.lock().unwrap();
            *n += 1;
            ObjectId(format!("obj-{}", *n))
        };
        objects.insert(key.clone(), (id.clone(), body));
        *self.creates.lock().unwrap() += 1;
        Ok(id)
    }

    async fn replace(&self, id: &ObjectId, body: Vec<u8>, _content_type: &str) -> Result<(), SyncError> {
        self.check()?;
        let mut objects = self.objects.lock().unwrap();
        let slot = objects
            .values_mut()
            .find(|(oid, _)| oid == id)
            .ok_or_else(|| SyncError::Rejected { status: 404, body: id.to_string() })?;
        slot.1 = body;
        *self.replaces.lock().unwrap() += 1;
        Ok(())
    }
}
