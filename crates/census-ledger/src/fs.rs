use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::traits::SnapshotStore;

/// Snapshot documents stored as `<dir>/<reference>.json`.
#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    dir: PathBuf,
}

impl FsSnapshotStore {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, reference: &str) -> Option<PathBuf> {
        // References are hex digests; anything else could escape the directory.
        if reference.is_empty() || !reference.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(self.dir.join(format!("{}.json", reference)))
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    async fn put(&self, document: &[u8]) -> Result<String, StoreError> {
        let reference = census_crypto::content_address(document);
        let path = self
            .path_for(&reference)
            .ok_or_else(|| StoreError::Corrupt(format!("bad snapshot reference {}", reference)))?;
        if tokio::fs::try_exists(&path).await? {
            return Ok(reference);
        }

        let tmp = self.dir.join(format!("{}.tmp-{}", reference, uuid::Uuid::now_v7().simple()));
        tokio::fs::write(&tmp, document).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(reference = %reference, bytes = document.len(), "snapshot written");
        Ok(reference)
    }

    async fn get(&self, reference: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(path) = self.path_for(reference) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
