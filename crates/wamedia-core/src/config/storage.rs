use serde::{Deserialize, Serialize};
use url::Url;

use super::defaults::*;

/// Which object store re-hosted media goes to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Files under a local directory, served by the API at `/media`.
    #[default]
    Local,
    /// S3-compatible bucket (MinIO).
    S3,
}

/// Object storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub local: LocalStorageConfig,
    #[serde(default)]
    pub s3: S3StorageConfig,
}

/// Local filesystem store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    #[serde(default = "default_local_root")]
    pub root: String,
    /// URL prefix the stored key is appended to.
    #[serde(default = "default_local_public_url")]
    pub public_base_url: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root: default_local_root(),
            public_base_url: default_local_public_url(),
        }
    }
}

/// S3-compatible store (MinIO).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3StorageConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_s3_region")]
    pub region: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    /// Public URL prefix. Empty = use `endpoint`.
    #[serde(default)]
    pub public_base_url: String,
}

impl Default for S3StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: default_s3_region(),
            bucket: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            public_base_url: String::new(),
        }
    }
}

impl S3StorageConfig {
    /// Host of the public URL, registered with the classifier as a known
    /// storage host.
    pub fn public_host(&self) -> Option<String> {
        let base = if self.public_base_url.is_empty() {
            &self.endpoint
        } else {
            &self.public_base_url
        };
        let url = Url::parse(base).ok()?;
        url.host_str()
            .filter(|h| !h.is_empty())
            .map(str::to_ascii_lowercase)
    }
}
