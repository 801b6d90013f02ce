//! Outbound media downloads.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use wamedia_core::config::FetchConfig;
use wamedia_core::error::WamediaError;

/// Bytes downloaded from a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    /// `Content-Type` the server claimed, if any.
    pub content_type: Option<String>,
}

/// Anything that can turn a URL into bytes.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Fetched, WamediaError>;
}

/// `reqwest`-backed fetcher with a timeout and a size cap.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn from_config(config: &FetchConfig) -> Result<Self, WamediaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| WamediaError::Fetch(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Fetched, WamediaError> {
        debug!("fetch: GET {url}");
        let mut resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| WamediaError::Fetch(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(WamediaError::Fetch(format!("upstream returned {status}")));
        }
        if let Some(len) = resp.content_length() {
            if len > self.max_bytes {
                return Err(WamediaError::Fetch(format!(
                    "body of {len} bytes exceeds limit of {}",
                    self.max_bytes
                )));
            }
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Content-Length can be absent or wrong; enforce the cap while reading.
        let mut bytes = Vec::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| WamediaError::Fetch(format!("read failed: {e}")))?
        {
            if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(WamediaError::Fetch(format!(
                    "body exceeds limit of {} bytes",
                    self.max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(Fetched {
            bytes,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::header, routing::get, Router};

    async fn spawn_upstream() -> String {
        let app = Router::new()
            .route(
                "/photo.jpg",
                get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], vec![0xFFu8, 0xD8, 0xFF, 0xE0]) }),
            )
            .route("/big.bin", get(|| async { vec![0u8; 4096] }))
            .route(
                "/gone",
                get(|| async { (axum::http::StatusCode::FORBIDDEN, "<html>denied</html>") }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn fetcher(max_bytes: u64) -> HttpFetcher {
        HttpFetcher::from_config(&FetchConfig {
            max_bytes,
            ..FetchConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_ok() {
        let base = spawn_upstream().await;
        let got = fetcher(1024).fetch(&format!("{base}/photo.jpg")).await.unwrap();
        assert_eq!(got.bytes, vec![0xFF, 0xD8, 0xFF, 0xE0]);
        assert_eq!(got.content_type.as_deref(), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn test_fetch_enforces_size_limit() {
        let base = spawn_upstream().await;
        let err = fetcher(1024).fetch(&format!("{base}/big.bin")).await.unwrap_err();
        assert!(err.to_string().contains("exceeds limit"));
        assert!(fetcher(8192).fetch(&format!("{base}/big.bin")).await.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_http_error() {
        let base = spawn_upstream().await;
        let err = fetcher(1024).fetch(&format!("{base}/gone")).await.unwrap_err();
        assert!(matches!(err, WamediaError::Fetch(ref m) if m.contains("403")));
    }
}
