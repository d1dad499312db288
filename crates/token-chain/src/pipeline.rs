//! The four-stage run: credentials in, game-service tokens out.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ChainConfig;
use crate::driver::{StageContext, StageReport, TaskFailure, run_stage};
use crate::error::ChainError;
use crate::limiter::ConcurrencyLimiter;
use crate::model::{Credential, MinecraftToken, Tracked};
use crate::proxy::ProxyPool;
use crate::stages::{LiveTokenExchange, MinecraftLoginExchange, XboxUserExchange, XstsExchange};

/// Drives credentials through the four exchanges, one full stage at a time.
#[derive(Debug)]
pub struct TokenPipeline {
    config: ChainConfig,
    ctx: StageContext,
}

impl TokenPipeline {
    pub fn new(config: ChainConfig, proxies: ProxyPool) -> Result<Self, ChainError> {
        let limiter = ConcurrencyLimiter::new(config.concurrency_limit);
        Self::with_limiter(config, proxies, limiter)
    }

    /// Use an externally owned limiter, e.g. one shared between pipelines
    /// or inspected by tests. The limiter's capacity replaces
    /// `config.concurrency_limit`.
    pub fn with_limiter(
        mut config: ChainConfig,
        proxies: ProxyPool,
        limiter: ConcurrencyLimiter,
    ) -> Result<Self, ChainError> {
        config.concurrency_limit = limiter.capacity();
        config.validate()?;

        Ok(Self {
            config,
            ctx: StageContext {
                limiter,
                proxies: Arc::new(proxies),
                cancel: CancellationToken::new(),
            },
        })
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.ctx.limiter
    }

    /// Cancelling this token stops launching new tasks, interrupts in-flight
    /// ones (including throttle waits) and skips the remaining stages.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    pub async fn run<I, S>(&self, credentials: I) -> PipelineReport
    where
        I: IntoIterator<Item = S>,
        S: Into<Credential>,
    {
        let credentials: Vec<Tracked<Credential>> = credentials
            .into_iter()
            .enumerate()
            .map(|(index, credential)| Tracked::new(index + 1, credential.into()))
            .collect();

        let endpoints = &self.config.endpoints;
        let mut report = PipelineReport::default();

        info!(
            credentials = credentials.len(),
            proxies = self.ctx.proxies.len(),
            concurrency = self.ctx.limiter.capacity(),
            "Got {} credentials to process",
            credentials.len()
        );

        let live = LiveTokenExchange::new(&endpoints.live_token, self.config.live.clone());
        let outcome = run_stage(Arc::new(live), credentials, &self.ctx).await;
        if self.record(&mut report, outcome.report) {
            return report;
        }

        let xbox = XboxUserExchange::new(&endpoints.xbox_user_auth);
        let outcome = run_stage(Arc::new(xbox), outcome.outputs, &self.ctx).await;
        if self.record(&mut report, outcome.report) {
            return report;
        }

        let xsts = XstsExchange::new(&endpoints.xsts_authorize);
        let outcome = run_stage(Arc::new(xsts), outcome.outputs, &self.ctx).await;
        if self.record(&mut report, outcome.report) {
            return report;
        }

        let login = MinecraftLoginExchange::new(
            &endpoints.minecraft_login,
            self.config.retry.clone(),
            self.ctx.cancel.clone(),
        );
        let outcome = run_stage(Arc::new(login), outcome.outputs, &self.ctx).await;
        let cancelled = self.record(&mut report, outcome.report);
        report.tokens = outcome.outputs;

        if !cancelled {
            info!(
                tokens = report.tokens.len(),
                failures = report.failures().count(),
                "All token exchanges completed"
            );
        }
        report
    }

    /// Append a stage report; returns true if the run was cancelled.
    fn record(&self, report: &mut PipelineReport, stage: StageReport) -> bool {
        report.stages.push(stage);
        if self.ctx.cancel.is_cancelled() {
            warn!(
                completed_stages = report.stages.len(),
                "Run cancelled; skipping remaining stages"
            );
            report.cancelled = true;
        }
        report.cancelled
    }
}

/// Outcome of a full run.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Final tokens, each tagged with its credential.
    pub tokens: Vec<Tracked<MinecraftToken>>,
    /// One entry per stage that ran, in stage order.
    pub stages: Vec<StageReport>,
    pub cancelled: bool,
}

impl PipelineReport {
    pub fn failures(&self) -> impl Iterator<Item = &TaskFailure> {
        self.stages.iter().flat_map(|stage| stage.failures.iter())
    }

    pub fn token_strings(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(|token| token.value.as_str())
    }

    pub fn into_tokens(self) -> Vec<MinecraftToken> {
        self.tokens.into_iter().map(|token| token.value).collect()
    }
}
