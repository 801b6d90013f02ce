//! # wamedia-storage
//!
//! [`MediaStore`](wamedia_core::traits::MediaStore) implementations.

pub mod local;
pub mod s3;

pub use local::LocalStore;
pub use s3::S3Store;

use std::sync::Arc;
use wamedia_core::config::{StorageBackend, StorageConfig};
use wamedia_core::error::WamediaError;
use wamedia_core::traits::MediaStore;

/// Build the configured store.
pub async fn build_store(config: &StorageConfig) -> Result<Arc<dyn MediaStore>, WamediaError> {
    match config.backend {
        StorageBackend::Local => Ok(Arc::new(LocalStore::from_config(&config.local))),
        StorageBackend::S3 => Ok(Arc::new(S3Store::from_config(&config.s3).await?)),
    }
}

/// Reject keys that could escape the store root or address a directory.
pub(crate) fn validate_key(key: &str) -> Result<(), WamediaError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.ends_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(WamediaError::Storage(format!("invalid object key '{key}'")));
    }
    Ok(())
}

/// Join a base URL and a key with exactly one slash.
pub(crate) fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("images/inst/2024/05/a.jpg").is_ok());
        for bad in ["", "/abs.jpg", "a/../b", "a//b", "dir/", "a\\b", "./a"] {
            assert!(validate_key(bad).is_err(), "key: {bad:?}");
        }
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://h/media/", "/a/b.jpg"), "http://h/media/a/b.jpg");
        assert_eq!(join_url("http://h", "a.jpg"), "http://h/a.jpg");
    }
}
