pub mod drive;
pub mod local;

use std::fmt;

use async_trait::async_trait;

use crate::error::SyncError;

/// `/`-separated path of an object beneath the store's root location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn new(key: impl Into<String>) -> Result<Self, String> {
        let key = key.into();
        if key.contains('\\') {
            return Err(format!("object key {key:?} contains a backslash"));
        }
        for seg in key.split('/') {
            if seg.is_empty() || seg == "." || seg == ".." {
                return Err(format!("object key {key:?} has an empty or relative segment"));
            }
        }
        Ok(Self(key))
    }

    /// Join segments that are plain names by construction (pair slugs,
    /// dates, fixed file names).
    pub(crate) fn from_segments(segs: &[&str]) -> Self {
        let key = segs.join("/");
        debug_assert!(Self::new(key.clone()).is_ok(), "bad key {key:?}");
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory segments, outermost first.
    pub fn dirs(&self) -> impl Iterator<Item = &str> {
        let mut segs: Vec<&str> = self.0.split('/').collect();
        segs.pop();
        segs.into_iter()
    }

    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend-specific handle of an existing object (drive file id, local path).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId(pub String);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote storage that can address objects by key and replace them whole.
///
/// Implementations must make `create` and `replace` all-or-nothing: after a
/// failure the object either has its previous content or the new content,
/// never a mix.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable root location, for logs.
    fn location(&self) -> &str;

    async fn lookup(&self, key: &ObjectKey) -> Result<Option<ObjectId>, SyncError>;

    async fn download(&self, id: &ObjectId) -> Result<Vec<u8>, SyncError>;

    async fn create(&self, key: &ObjectKey, body: Vec<u8>, content_type: &str) -> Result<ObjectId, SyncError>;

    async fn replace(&self, id: &ObjectId, body: Vec<u8>, content_type: &str) -> Result<(), SyncError>;
}

pub use drive::DriveStore;
pub use local::LocalStore;
