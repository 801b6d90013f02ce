use crate::error::WamediaError;
use async_trait::async_trait;
use serde::Serialize;

/// Where a stored object ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    /// Object key inside the store (`images/inst/2024/05/ABC.jpg`).
    pub key: String,
    /// URL the UI should load.
    pub url: String,
    pub size: u64,
}

/// Object storage trait: where re-hosted media lands.
///
/// Every backend (local filesystem, MinIO, etc.) implements this trait so the
/// ingest pipeline does not care where bytes go.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Human-readable store name.
    fn name(&self) -> &str;

    /// Write `bytes` under `key`, overwriting any existing object.
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<StoredObject, WamediaError>;

    /// Read an object back. `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, WamediaError>;
}

/// Media bytes decrypted by a server that holds the WhatsApp session keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMedia {
    /// Plain base64 (no data-URI prefix).
    pub base64: String,
    pub mimetype: Option<String>,
    pub file_name: Option<String>,
}

/// Server-side decryption of `.enc` media.
#[async_trait]
pub trait MediaDecrypter: Send + Sync {
    async fn decrypt_media(
        &self,
        instance: &str,
        message_id: &str,
    ) -> Result<DecryptedMedia, WamediaError>;
}
