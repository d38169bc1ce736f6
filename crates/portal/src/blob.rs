//! Blob collaborator contract. Files are referenced by path and never inlined into rows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::PortalError;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("object {bucket}/{path} already exists")]
    Exists { bucket: String, path: String },
    #[error("blob store unavailable: {0}")]
    Unavailable(String),
}

impl From<BlobError> for PortalError {
    fn from(value: BlobError) -> Self {
        match value {
            exists @ BlobError::Exists { .. } => PortalError::Conflict(exists.to_string()),
            BlobError::Unavailable(reason) => PortalError::Transport(reason),
        }
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `bucket/path`, returning the path rows should reference.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BlobError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryBlobStore {
    objects: Arc<Mutex<HashMap<(String, String), StoredBlob>>>,
}

impl InMemoryBlobStore {
    pub fn get(&self, bucket: &str, path: &str) -> Option<StoredBlob> {
        let guard = self.objects.lock().ok()?;
        guard.get(&(bucket.to_string(), path.to_string())).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BlobError> {
        let mut guard = self
            .objects
            .lock()
            .map_err(|_| BlobError::Unavailable("blob table lock poisoned".to_string()))?;
        let key = (bucket.to_string(), path.to_string());
        if guard.contains_key(&key) {
            return Err(BlobError::Exists {
                bucket: key.0,
                path: key.1,
            });
        }
        guard.insert(
            key,
            StoredBlob {
                content_type: content_type.to_string(),
                bytes,
            },
        );
        Ok(path.to_string())
    }
}
