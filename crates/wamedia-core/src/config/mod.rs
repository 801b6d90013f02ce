mod defaults;
mod storage;


pub use storage::*;

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::WamediaError;
use defaults::*;

/// Top-level wamedia configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub wamedia: GeneralConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub evolution: EvolutionConfig,
}

/// General service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// HTTP API configuration -- webhook receiver and image proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Shared secret Evolution must send (`apikey` header or `?token=`).
    /// Empty = accept every webhook (for local-only use).
    #[serde(default)]
    pub webhook_secret: String,
    /// Maximum request body in bytes. Webhooks with inline base64 are large.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            webhook_secret: String::new(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

/// `/api/image-proxy` settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Hosts the proxy may fetch from. Suffix match, so `whatsapp.net`
    /// covers `mmg.whatsapp.net`.
    #[serde(default = "default_proxy_hosts")]
    pub allowed_hosts: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: default_proxy_hosts(),
        }
    }
}

impl ProxyConfig {
    pub fn allows(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.allowed_hosts.iter().any(|allowed| {
            let allowed = allowed.to_ascii_lowercase();
            host == allowed || host.ends_with(&format!(".{allowed}"))
        })
    }
}

/// Outbound download settings shared by the pipeline and the proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_fetch_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_bytes: default_fetch_max_bytes(),
            user_agent: default_user_agent(),
        }
    }
}

/// Message record store config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Evolution API REST access, used for server-side media decryption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_evolution_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Ask Evolution to transcode audio/video to mp4 when decrypting.
    #[serde(default)]
    pub convert_to_mp4: bool,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_evolution_url(),
            api_key: String::new(),
            convert_to_mp4: false,
        }
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

impl Config {
    /// Pull secrets from the environment so they can stay out of `config.toml`.
    /// Non-empty environment values win over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("WAMEDIA_WEBHOOK_SECRET") {
            self.api.webhook_secret = v;
        }
        if let Some(v) = get("WAMEDIA_EVOLUTION_API_KEY") {
            self.evolution.api_key = v;
        }
        if let Some(v) = get("WAMEDIA_S3_ACCESS_KEY") {
            self.storage.s3.access_key = v;
        }
        if let Some(v) = get("WAMEDIA_S3_SECRET_KEY") {
            self.storage.s3.secret_key = v;
        }
    }
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, WamediaError> {
    let path = Path::new(path);
    let mut config = if !path.exists() {
        info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        Config::default()
    } else {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WamediaError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| WamediaError::Config(format!("failed to parse config: {}", e)))?
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Reject combinations that would only fail later at request time.
    pub fn validate(&self) -> Result<(), WamediaError> {
        if self.storage.backend == StorageBackend::S3 {
            let s3 = &self.storage.s3;
            if s3.endpoint.is_empty() || s3.bucket.is_empty() {
                return Err(WamediaError::Config(
                    "storage backend is s3 but storage.s3.endpoint or bucket is empty".into(),
                ));
            }
        }
        if self.evolution.enabled && self.evolution.api_key.is_empty() {
            return Err(WamediaError::Config(
                "evolution is enabled but api_key is empty. \
                 Set it in config.toml or WAMEDIA_EVOLUTION_API_KEY."
                    .into(),
            ));
        }
        Ok(())
    }
}
