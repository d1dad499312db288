use std::time::Duration;

use crate::error::ChainError;
use crate::retry::RetryPolicy;

pub const DEFAULT_USER_AGENT: &str = concat!("token-chain/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_LIVE_TOKEN_URL: &str = "https://login.live.com/oauth20_token.srf";
pub const DEFAULT_XBOX_USER_AUTH_URL: &str = "https://user.auth.xboxlive.com/user/authenticate";
pub const DEFAULT_XSTS_AUTHORIZE_URL: &str = "https://xsts.auth.xboxlive.com/xsts/authorize";
pub const DEFAULT_MINECRAFT_LOGIN_URL: &str =
    "https://api.minecraftservices.com/authentication/login_with_xbox";

/// Provider URLs, one per stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub live_token: String,
    pub xbox_user_auth: String,
    pub xsts_authorize: String,
    pub minecraft_login: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            live_token: DEFAULT_LIVE_TOKEN_URL.to_owned(),
            xbox_user_auth: DEFAULT_XBOX_USER_AUTH_URL.to_owned(),
            xsts_authorize: DEFAULT_XSTS_AUTHORIZE_URL.to_owned(),
            minecraft_login: DEFAULT_MINECRAFT_LOGIN_URL.to_owned(),
        }
    }
}

impl Endpoints {
    /// Point every stage at the same host, keeping the production paths.
    /// Used for mirrors and mock servers.
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            live_token: format!("{base}/oauth20_token.srf"),
            xbox_user_auth: format!("{base}/user/authenticate"),
            xsts_authorize: format!("{base}/xsts/authorize"),
            minecraft_login: format!("{base}/authentication/login_with_xbox"),
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("live_token", self.live_token.as_str()),
            ("xbox_user_auth", self.xbox_user_auth.as_str()),
            ("xsts_authorize", self.xsts_authorize.as_str()),
            ("minecraft_login", self.minecraft_login.as_str()),
        ]
        .into_iter()
    }
}

/// OAuth2 client parameters for the refresh grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveOAuthConfig {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
}

impl Default for LiveOAuthConfig {
    fn default() -> Self {
        Self {
            client_id: "000000004c12ae6f".to_owned(),
            redirect_uri: "https://login.live.com/oauth20_desktop.srf".to_owned(),
            scope: "service::user.auth.xboxlive.com::MBI_SSL".to_owned(),
        }
    }
}

/// Per-lane HTTP client settings.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Overall timeout for one request. Zero disables it.
    pub timeout: Duration,
    /// Time allowed to establish the connection through the proxy.
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl HttpConfig {
    pub(crate) fn client_builder(&self) -> reqwest::ClientBuilder {
        let mut builder = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .connect_timeout(self.connect_timeout);
        if self.timeout > Duration::ZERO {
            builder = builder.timeout(self.timeout);
        }
        builder
    }
}

/// Configuration for a [`TokenPipeline`](crate::TokenPipeline) run.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Maximum number of tasks in flight at once, across all stages.
    pub concurrency_limit: usize,
    pub endpoints: Endpoints,
    pub live: LiveOAuthConfig,
    pub http: HttpConfig,
    /// Throttle handling for the final login stage.
    pub retry: RetryPolicy,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 10,
            endpoints: Endpoints::default(),
            live: LiveOAuthConfig::default(),
            http: HttpConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ChainConfig {
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        if self.concurrency_limit == 0 {
            return Err(ChainError::invalid_config(
                "concurrency limit must be at least 1",
            ));
        }

        for (name, endpoint) in self.endpoints.iter() {
            url::Url::parse(endpoint).map_err(|e| {
                ChainError::invalid_config(format!("endpoint `{name}` ({endpoint}): {e}"))
            })?;
        }

        Ok(())
    }
}
