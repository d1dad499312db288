use reqwest::StatusCode;
use serde::Serialize;

/// Resolver messages for a lookup that may succeed if repeated (EAI_AGAIN on
/// glibc, WSATRY_AGAIN on Windows). Unknown hosts are permanent failures.
const TRANSIENT_RESOLUTION_MARKERS: &[&str] = &[
    "temporary failure in name resolution",
    "temporary error during hostname resolution",
];

/// Failure of a single stage task. Always contained to that task.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("transport error: {source}")]
    Transport {
        #[from]
        source: reqwest::Error,
    },

    #[error("upstream returned HTTP {status}: {body}")]
    Upstream { status: StatusCode, body: String },

    #[error("malformed response ({reason}): {body}")]
    Malformed { reason: String, body: String },

    #[error("still throttled after {attempts} attempts: {last}")]
    Throttled { attempts: u32, last: Box<StageError> },

    #[error("task cancelled")]
    Cancelled,

    #[error("task panicked: {0}")]
    Panicked(String),
}

impl StageError {
    pub fn upstream(status: StatusCode, body: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            body: body.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
            body: body.into(),
        }
    }

    /// Whether the upstream asked us to slow down, or the resolver had a
    /// transient failure. Both are retried by the login stage.
    pub fn is_throttle(&self) -> bool {
        match self {
            Self::Upstream { status, .. } => *status == StatusCode::TOO_MANY_REQUESTS,
            Self::Transport { source } => is_transient_resolution(source),
            _ => false,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport { .. } => FailureKind::Transport,
            Self::Upstream { .. } => FailureKind::Upstream,
            Self::Malformed { .. } => FailureKind::Malformed,
            Self::Throttled { .. } => FailureKind::Throttled,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Panicked(_) => FailureKind::Panicked,
        }
    }
}

/// Serializable classification of a [`StageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Upstream,
    Malformed,
    Throttled,
    Cancelled,
    Panicked,
}

/// Fatal errors raised before any stage runs.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("invalid proxy `{input}`: {reason}")]
    InvalidProxy { input: String, reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("failed to build HTTP client: {source}")]
    HttpClient {
        #[from]
        source: reqwest::Error,
    },
}

impl ChainError {
    pub fn invalid_proxy(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidProxy {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Walk the source chain of `err` looking for a transient name resolution
/// failure.
pub fn is_transient_resolution(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        let message = e.to_string().to_ascii_lowercase();
        if TRANSIENT_RESOLUTION_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
        {
            return true;
        }
        current = e.source();
    }
    false
}
