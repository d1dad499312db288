//! Fan-out of one stage over its inputs, followed by a barrier.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{FailureKind, StageError};
use crate::limiter::ConcurrencyLimiter;
use crate::model::Tracked;
use crate::proxy::ProxyPool;
use crate::stages::{Exchange, Stage};

/// Shared resources handed to every stage of a run.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub limiter: ConcurrencyLimiter,
    pub proxies: Arc<ProxyPool>,
    pub cancel: CancellationToken,
}

/// One task that contributed nothing to its stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub stage: Stage,
    /// 1-based launch position within the stage.
    pub ordinal: usize,
    /// 1-based position of the originating credential.
    pub origin: usize,
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    fn new(stage: Stage, ordinal: usize, origin: usize, err: &StageError) -> Self {
        Self {
            stage,
            ordinal,
            origin,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<TaskFailure>,
}

#[derive(Debug)]
pub struct StageOutcome<O> {
    /// In launch order; not aligned with the stage inputs once items drop.
    pub outputs: Vec<Tracked<O>>,
    pub report: StageReport,
}

/// Run `exchange` once per input and wait for every task to finish.
///
/// A slot is acquired from the limiter before each launch, so launching
/// itself stalls while the limiter is full. Each task is handed a freshly
/// chosen lane and logs its own outcome. Results are gathered here once the
/// tasks hand them back, so tasks never share a mutable collection.
pub async fn run_stage<E: Exchange>(
    exchange: Arc<E>,
    inputs: Vec<Tracked<E::Input>>,
    ctx: &StageContext,
) -> StageOutcome<E::Output> {
    let stage = E::STAGE;
    let attempted = inputs.len();
    let mut handles = Vec::with_capacity(attempted);
    let mut outputs = Vec::with_capacity(attempted);
    let mut failures = Vec::new();

    info!(stage = %stage, items = attempted, "Stage {} starting", stage.number());

    for (index, Tracked { origin, value }) in inputs.into_iter().enumerate() {
        let ordinal = index + 1;

        let permit = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => None,
            permit = ctx.limiter.acquire() => permit.ok(),
        };
        let Some(permit) = permit else {
            failures.push(TaskFailure::new(stage, ordinal, origin, &StageError::Cancelled));
            continue;
        };

        let lane = ctx.proxies.choose();
        let exchange = exchange.clone();
        let cancel = ctx.cancel.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            let result = tokio::select! {
                _ = cancel.cancelled() => Err(StageError::Cancelled),
                result = exchange.exchange(value, &lane) => result,
            };
            log_outcome(stage, ordinal, origin, &result);
            result
        });
        handles.push((ordinal, origin, handle));
    }

    // Barrier: every launched task is awaited before the stage ends.
    for (ordinal, origin, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(join_error) => {
                let result = Err(StageError::Panicked(join_error.to_string()));
                log_outcome(stage, ordinal, origin, &result);
                result
            }
        };

        match result {
            Ok(value) => outputs.push(Tracked::new(origin, value)),
            Err(err) => failures.push(TaskFailure::new(stage, ordinal, origin, &err)),
        }
    }

    failures.sort_by_key(|failure| failure.ordinal);
    let report = StageReport {
        stage,
        attempted,
        succeeded: outputs.len(),
        failures,
    };

    info!(
        stage = %stage,
        succeeded = report.succeeded,
        failed = report.failures.len(),
        "---- get {stage} complete ({}/{}) ----",
        report.succeeded,
        report.attempted
    );

    StageOutcome { outputs, report }
}

fn log_outcome<O>(stage: Stage, ordinal: usize, origin: usize, result: &Result<O, StageError>) {
    match result {
        Ok(_) => info!(stage = %stage, origin, "Token #{ordinal}: get {stage} success"),
        Err(err) => warn!(
            stage = %stage,
            origin,
            kind = ?err.kind(),
            "Token #{ordinal}: get {stage} failed: {err}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::proxy::ProxyLane;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::time::Duration;

    /// Doubles even numbers after a short delay; rejects odd ones.
    struct Doubler;

    #[async_trait]
    impl Exchange for Doubler {
        const STAGE: Stage = Stage::XboxUserToken;

        type Input = u32;
        type Output = u32;

        async fn exchange(&self, input: u32, _lane: &ProxyLane) -> Result<u32, StageError> {
            tokio::time::sleep(Duration::from_millis(10 * u64::from(input % 3))).await;
            if input % 2 == 0 {
                Ok(input * 2)
            } else {
                Err(StageError::upstream(StatusCode::BAD_REQUEST, "odd"))
            }
        }
    }

    struct Panicker;

    #[async_trait]
    impl Exchange for Panicker {
        const STAGE: Stage = Stage::XstsToken;

        type Input = u32;
        type Output = u32;

        async fn exchange(&self, input: u32, _lane: &ProxyLane) -> Result<u32, StageError> {
            if input == 2 {
                panic!("unexpected shape");
            }
            Ok(input)
        }
    }

    fn context(limit: usize) -> StageContext {
        StageContext {
            limiter: ConcurrencyLimiter::new(limit),
            proxies: Arc::new(ProxyPool::direct(&HttpConfig::default()).unwrap()),
            cancel: CancellationToken::new(),
        }
    }

    fn tracked(values: impl IntoIterator<Item = u32>) -> Vec<Tracked<u32>> {
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| Tracked::new(i + 1, v))
            .collect()
    }

    #[tokio::test]
    async fn failures_are_dropped_and_reported() {
        let ctx = context(3);
        let outcome = run_stage(Arc::new(Doubler), tracked([2, 3, 4, 5, 6]), &ctx).await;

        let mut values: Vec<u32> = outcome.outputs.iter().map(|t| t.value).collect();
        values.sort_unstable();
        assert_eq!(values, vec![4, 8, 12]);

        assert_eq!(outcome.report.attempted, 5);
        assert_eq!(outcome.report.succeeded, 3);
        let failed_origins: Vec<usize> =
            outcome.report.failures.iter().map(|f| f.origin).collect();
        assert_eq!(failed_origins, vec![2, 4]);
        assert!(
            outcome
                .report
                .failures
                .iter()
                .all(|f| f.kind == FailureKind::Upstream)
        );
    }

    #[tokio::test]
    async fn outputs_keep_their_origin() {
        let ctx = context(2);
        let outcome = run_stage(Arc::new(Doubler), tracked([10, 20, 30]), &ctx).await;
        for item in outcome.outputs {
            assert_eq!(item.value, item.origin as u32 * 20);
        }
    }

    #[tokio::test]
    async fn limiter_bounds_in_flight_tasks() {
        let ctx = context(2);
        run_stage(Arc::new(Doubler), tracked(0..12), &ctx).await;
        assert!(ctx.limiter.peak() <= 2);
        assert_eq!(ctx.limiter.in_flight(), 0);
        assert_eq!(ctx.limiter.available(), 2);
    }

    #[tokio::test]
    async fn panicking_task_is_contained() {
        let ctx = context(4);
        let outcome = run_stage(Arc::new(Panicker), tracked([1, 2, 3]), &ctx).await;

        assert_eq!(outcome.report.succeeded, 2);
        assert_eq!(outcome.report.failures.len(), 1);
        let failure = &outcome.report.failures[0];
        assert_eq!(failure.kind, FailureKind::Panicked);
        assert_eq!(failure.origin, 2);
        assert_eq!(ctx.limiter.available(), 4);
    }

    #[tokio::test]
    async fn cancelled_stage_launches_nothing() {
        let ctx = context(2);
        ctx.cancel.cancel();
        let outcome = run_stage(Arc::new(Doubler), tracked([2, 4]), &ctx).await;

        assert!(outcome.outputs.is_empty());
        assert_eq!(outcome.report.failures.len(), 2);
        assert!(
            outcome
                .report
                .failures
                .iter()
                .all(|f| f.kind == FailureKind::Cancelled)
        );
    }

    #[tokio::test]
    async fn empty_input_is_an_empty_stage() {
        let ctx = context(1);
        let outcome = run_stage(Arc::new(Doubler), Vec::new(), &ctx).await;
        assert_eq!(outcome.report.attempted, 0);
        assert!(outcome.outputs.is_empty());
    }
}
