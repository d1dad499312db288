use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use token_chain::{ChainConfig, Endpoints, HttpConfig, RetryPolicy};

use crate::error::{AppError, Result};

/// Contents of `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Refresh tokens, one per line.
    pub input_file: PathBuf,
    /// Proxies, one per line, `host:port` or a full URL.
    pub proxy_file: PathBuf,
    /// Final tokens are written here, one per line.
    pub output_file: PathBuf,
    pub concurrent_limit: usize,

    /// Optional JSON report of every failed item and stage summary.
    #[serde(default)]
    pub report_file: Option<PathBuf>,

    /// Per-request timeout; 0 disables it.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub endpoints: EndpointSettings,
}

/// Throttle handling for the login stage. Unset fields keep the
/// retry-forever, 5 seconds apart behavior.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrySettings {
    pub max_retries: Option<u32>,
    pub max_elapsed_secs: Option<u64>,
    pub backoff_secs: Option<u64>,
}

/// Provider URL overrides, e.g. for a mirror.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointSettings {
    /// Replaces the host of every stage, keeping the standard paths.
    pub base_url: Option<String>,
    pub live_token: Option<String>,
    pub xbox_user_auth: Option<String>,
    pub xsts_authorize: Option<String>,
    pub minecraft_login: Option<String>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| AppError::read(path, e))?;
        Self::parse(&raw, path)
    }

    fn parse(raw: &str, path: &Path) -> Result<Self> {
        let config: Self = serde_json::from_str(raw).map_err(|source| AppError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        if config.concurrent_limit == 0 {
            return Err(AppError::InvalidConfig(
                "concurrent_limit must be at least 1".to_owned(),
            ));
        }
        Ok(config)
    }

    pub fn chain_config(&self) -> ChainConfig {
        let mut http = HttpConfig::default();
        if let Some(secs) = self.timeout_secs {
            http.timeout = Duration::from_secs(secs);
        }

        ChainConfig::default()
            .with_concurrency_limit(self.concurrent_limit)
            .with_endpoints(self.endpoints.resolve())
            .with_http(http)
            .with_retry(self.retry.policy())
    }
}

impl RetrySettings {
    fn policy(&self) -> RetryPolicy {
        let mut policy = match self.backoff_secs {
            Some(secs) => RetryPolicy::fixed(Duration::from_secs(secs)),
            None => RetryPolicy::default(),
        };
        if let Some(max) = self.max_retries {
            policy = policy.with_max_retries(max);
        }
        if let Some(secs) = self.max_elapsed_secs {
            policy = policy.with_max_elapsed(Duration::from_secs(secs));
        }
        policy
    }
}

impl EndpointSettings {
    fn resolve(&self) -> Endpoints {
        let mut endpoints = match &self.base_url {
            Some(base) => Endpoints::with_base_url(base),
            None => Endpoints::default(),
        };
        if let Some(url) = &self.live_token {
            endpoints.live_token = url.clone();
        }
        if let Some(url) = &self.xbox_user_auth {
            endpoints.xbox_user_auth = url.clone();
        }
        if let Some(url) = &self.xsts_authorize {
            endpoints.xsts_authorize = url.clone();
        }
        if let Some(url) = &self.minecraft_login {
            endpoints.minecraft_login = url.clone();
        }
        endpoints
    }
}
