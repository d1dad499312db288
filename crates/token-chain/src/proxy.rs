//! Proxy endpoints and the pool of per-proxy HTTP clients ("lanes").

use std::fmt;

use rand::RngExt;
use reqwest::{Client, Proxy};
use tracing::{debug, warn};
use url::Url;

use crate::config::HttpConfig;
use crate::error::ChainError;

/// Scheme assumed for bare `host:port` lines.
pub const DEFAULT_PROXY_SCHEME: &str = "http";

/// Proxy protocol, derived from the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyType {
    Http,
    Https,
    /// `socks5://` resolves names locally, `socks5h://` on the proxy.
    Socks5,
}

impl ProxyType {
    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            "socks5" | "socks5h" => Some(Self::Socks5),
            _ => None,
        }
    }
}

/// A validated proxy URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    url: Url,
    proxy_type: ProxyType,
}

impl ProxyEndpoint {
    /// Parse one line of a proxy list. Lines without a scheme get
    /// `http://` prepended; credentials may be embedded as `user:pass@host`.
    pub fn parse(line: &str) -> Result<Self, ChainError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(ChainError::invalid_proxy(line, "empty proxy entry"));
        }

        let candidate = if trimmed.contains("://") {
            trimmed.to_owned()
        } else {
            format!("{DEFAULT_PROXY_SCHEME}://{trimmed}")
        };

        let url = Url::parse(&candidate)
            .map_err(|e| ChainError::invalid_proxy(trimmed, e.to_string()))?;
        let proxy_type = ProxyType::from_scheme(url.scheme()).ok_or_else(|| {
            ChainError::invalid_proxy(trimmed, format!("unsupported scheme `{}`", url.scheme()))
        })?;
        if url.host_str().is_none() {
            return Err(ChainError::invalid_proxy(trimmed, "missing host"));
        }

        Ok(Self { url, proxy_type })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn proxy_type(&self) -> ProxyType {
        self.proxy_type
    }

    fn to_reqwest(&self) -> Result<Proxy, ChainError> {
        // `Proxy::all` routes both http and https targets through the
        // endpoint; the provider URLs are https.
        Proxy::all(self.url.as_str())
            .map_err(|e| ChainError::invalid_proxy(self.url.as_str(), e.to_string()))
    }
}

impl fmt::Display for ProxyEndpoint {
    /// Host and port only, never the embedded credentials.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port_or_known_default() {
            Some(port) => write!(f, "{}://{host}:{port}", self.url.scheme()),
            None => write!(f, "{}://{host}", self.url.scheme()),
        }
    }
}

/// An egress route: a proxy endpoint (or none) and a client bound to it.
#[derive(Debug, Clone)]
pub struct ProxyLane {
    endpoint: Option<ProxyEndpoint>,
    client: Client,
}

impl ProxyLane {
    pub fn endpoint(&self) -> Option<&ProxyEndpoint> {
        self.endpoint.as_ref()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl fmt::Display for ProxyLane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.endpoint {
            Some(endpoint) => fmt::Display::fmt(endpoint, f),
            None => f.write_str("direct"),
        }
    }
}

/// Prebuilt lanes, one per proxy endpoint, selected uniformly at random.
#[derive(Debug, Clone)]
pub struct ProxyPool {
    lanes: Vec<ProxyLane>,
    direct: bool,
}

impl ProxyPool {
    /// Build one client per endpoint. An empty list yields a single direct
    /// lane that ignores system proxy settings.
    pub fn new(endpoints: Vec<ProxyEndpoint>, http: &HttpConfig) -> Result<Self, ChainError> {
        if endpoints.is_empty() {
            warn!("No proxies configured; all requests will use a direct connection");
            let client = http.client_builder().no_proxy().build()?;
            return Ok(Self {
                lanes: vec![ProxyLane {
                    endpoint: None,
                    client,
                }],
                direct: true,
            });
        }

        let lanes = endpoints
            .into_iter()
            .map(|endpoint| {
                let client = http.client_builder().proxy(endpoint.to_reqwest()?).build()?;
                debug!(proxy = %endpoint, "Built proxy lane");
                Ok(ProxyLane {
                    endpoint: Some(endpoint),
                    client,
                })
            })
            .collect::<Result<Vec<_>, ChainError>>()?;

        Ok(Self {
            lanes,
            direct: false,
        })
    }

    /// Parse every non-blank line and build the pool.
    pub fn from_lines<I, S>(lines: I, http: &HttpConfig) -> Result<Self, ChainError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let endpoints = lines
            .into_iter()
            .filter(|line| !line.as_ref().trim().is_empty())
            .map(|line| ProxyEndpoint::parse(line.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(endpoints, http)
    }

    /// A direct-connection pool.
    pub fn direct(http: &HttpConfig) -> Result<Self, ChainError> {
        Self::new(Vec::new(), http)
    }

    /// Uniformly random lane.
    pub fn choose(&self) -> ProxyLane {
        let index = rand::rng().random_range(0..self.lanes.len());
        self.lanes[index].clone()
    }

    pub fn len(&self) -> usize {
        if self.direct { 0 } else { self.lanes.len() }
    }

    pub fn is_empty(&self) -> bool {
        self.direct
    }
}
