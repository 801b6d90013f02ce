//! S3-compatible store (MinIO) with path-style addressing.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, info};
use wamedia_core::config::S3StorageConfig;
use wamedia_core::error::WamediaError;
use wamedia_core::traits::{MediaStore, StoredObject};

use crate::{join_url, validate_key};

pub struct S3Store {
    client: S3Client,
    bucket: String,
    public_base_url: String,
}

impl S3Store {
    pub async fn from_config(config: &S3StorageConfig) -> Result<Self, WamediaError> {
        if config.endpoint.is_empty() || config.bucket.is_empty() {
            return Err(WamediaError::Config(
                "s3 storage requires endpoint and bucket".into(),
            ));
        }

        let base_config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint)
            .region(Region::new(config.region.clone()))
            .credentials_provider(Credentials::new(
                config.access_key.clone(),
                config.secret_key.clone(),
                None,
                None,
                "static",
            ))
            .load()
            .await;

        let s3_config = S3ConfigBuilder::from(&base_config)
            .force_path_style(true)
            .build();

        info!(
            "s3 store ready: endpoint={} bucket={}",
            config.endpoint, config.bucket
        );
        Ok(Self {
            client: S3Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            public_base_url: public_base(config),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// `{public_base_url or endpoint}/{bucket}`, the prefix keys are appended to.
fn public_base(config: &S3StorageConfig) -> String {
    let base = if config.public_base_url.is_empty() {
        &config.endpoint
    } else {
        &config.public_base_url
    };
    join_url(base, &config.bucket)
}

#[async_trait]
impl MediaStore for S3Store {
    fn name(&self) -> &str {
        "s3"
    }

    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<StoredObject, WamediaError> {
        validate_key(key)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                WamediaError::Storage(format!(
                    "put s3://{}/{key}: {}",
                    self.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;

        debug!("uploaded {} bytes to s3://{}/{key}", bytes.len(), self.bucket);
        Ok(StoredObject {
            key: key.to_string(),
            url: join_url(&self.public_base_url, key),
            size: bytes.len() as u64,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, WamediaError> {
        validate_key(key)?;
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Ok(None)
            }
            Err(e) => {
                return Err(WamediaError::Storage(format!(
                    "get s3://{}/{key}: {}",
                    self.bucket,
                    DisplayErrorContext(&e)
                )))
            }
        };

        let data = output.body.collect().await.map_err(|e| {
            WamediaError::Storage(format!("read s3://{}/{key}: {e}", self.bucket))
        })?;
        Ok(Some(data.into_bytes().to_vec()))
    }
}
