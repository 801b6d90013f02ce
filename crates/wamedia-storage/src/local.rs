//! Local filesystem store. Keys map to paths under `root`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use wamedia_core::config::LocalStorageConfig;
use wamedia_core::error::WamediaError;
use wamedia_core::shellexpand;
use wamedia_core::traits::{MediaStore, StoredObject};

use crate::{join_url, validate_key};

pub struct LocalStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.to_string(),
        }
    }

    pub fn from_config(config: &LocalStorageConfig) -> Self {
        Self::new(shellexpand(&config.root), &config.public_base_url)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path under the root.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, WamediaError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl MediaStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<StoredObject, WamediaError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write then rename so readers never see a partial file.
        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!("stored {} bytes at {}", bytes.len(), path.display());
        Ok(StoredObject {
            key: key.to_string(),
            url: join_url(&self.public_base_url, key),
            size: bytes.len() as u64,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, WamediaError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
