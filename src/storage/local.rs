use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{ObjectId, ObjectKey, ObjectStore};
use crate::error::SyncError;

/// Directory-backed store. Writes land in a temp file beside the target and
/// are renamed over it, so readers never see a half-written object.
pub struct LocalStore {
    root: PathBuf,
    location: String,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let location = root.display().to_string();
        Self { root, location }
    }

    fn path_for(&self, key: &ObjectKey) -> PathBuf {
        key.as_str().split('/').fold(self.root.clone(), |p, seg| p.join(seg))
    }

    async fn write_atomic(path: &Path, body: &[u8]) -> Result<(), SyncError> {
        let dir = path
            .parent()
            .ok_or_else(|| SyncError::Io(format!("{} has no parent directory", path.display())))?;
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("object");
        let tmp = dir.join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()));

        let res = async {
            let mut f = tokio::fs::File::create(&tmp).await?;
            f.write_all(body).await?;
            f.sync_all().await?;
            drop(f);
            tokio::fs::rename(&tmp, path).await
        }
        .await;

        if let Err(e) = res {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn location(&self) -> &str {
        &self.location
    }

    async fn lookup(&self, key: &ObjectKey) -> Result<Option<ObjectId>, SyncError> {
        let path = self.path_for(key);
        match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => Ok(Some(ObjectId(path.display().to_string()))),
            Ok(_) => Err(SyncError::Io(format!("{} exists but is not a file", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn download(&self, id: &ObjectId) -> Result<Vec<u8>, SyncError> {
        Ok(tokio::fs::read(&id.0).await?)
    }

    async fn create(&self, key: &ObjectKey, body: Vec<u8>, _content_type: &str) -> Result<ObjectId, SyncError> {
        if tokio::fs::metadata(&self.root).await.is_err() {
            return Err(SyncError::Io(format!("root {} does not exist", self.root.display())));
        }
        let path = self.path_for(key);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        Self::write_atomic(&path, &body).await?;
        tracing::debug!(path = %path.display(), bytes = body.len(), "created object");
        Ok(ObjectId(path.display().to_string()))
    }

    async fn replace(&self, id: &ObjectId, body: Vec<u8>, _content_type: &str) -> Result<(), SyncError> {
        Self::write_atomic(Path::new(&id.0), &body).await?;
        tracing::debug!(path = %id, bytes = body.len(), "replaced object");
        Ok(())
    }
}
