//! # token-chain
//!
//! Converts a batch of Microsoft account refresh tokens into game-service
//! access tokens by driving them through four exchanges:
//!
//! 1. refresh token → Microsoft access token (OAuth2 refresh grant)
//! 2. access token → Xbox Live user token
//! 3. user token → XSTS token and user hash
//! 4. XSTS pair → game-service access token (retried while throttled)
//!
//! Every stage fans out one task per item, bounded by a run-wide
//! [`ConcurrencyLimiter`], with each task routed through a randomly chosen
//! proxy. A stage finishes completely before the next one starts. A failing
//! item is dropped and reported, never fatal to the batch.
//!
//! ```no_run
//! use token_chain::{ChainConfig, ProxyPool, TokenPipeline};
//!
//! # async fn demo() -> Result<(), token_chain::ChainError> {
//! let config = ChainConfig::default().with_concurrency_limit(20);
//! let proxies = ProxyPool::from_lines(["10.0.0.1:8080"], &config.http)?;
//! let pipeline = TokenPipeline::new(config, proxies)?;
//! let report = pipeline.run(["M.R3_BAY.refresh-token"]).await;
//! for token in report.token_strings() {
//!     println!("{token}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod limiter;
pub mod model;
pub mod pipeline;
pub mod proxy;
pub mod retry;
pub mod stages;

pub use config::{ChainConfig, Endpoints, HttpConfig, LiveOAuthConfig};
pub use driver::{StageContext, StageOutcome, StageReport, TaskFailure, run_stage};
pub use error::{ChainError, FailureKind, StageError};
pub use limiter::{ConcurrencyLimiter, LimiterPermit};
pub use model::{Credential, MinecraftToken, Tracked, XstsAuthorization};
pub use pipeline::{PipelineReport, TokenPipeline};
pub use proxy::{ProxyEndpoint, ProxyLane, ProxyPool, ProxyType};
pub use retry::{Backoff, RetryAction, RetryPolicy, retry_with_backoff};
pub use stages::{Exchange, Stage};

/// Re-exported so callers can wire their own shutdown signal.
pub use tokio_util::sync::CancellationToken;
