//! The unit of work the supervisor runs on every cycle.
//!
//! A [`Tick`] gets an owned [`TickContext`] (config snapshot, iteration number,
//! cancellation token) and never sees the supervisor's shared state. It returns
//! `Ok(())` or a [`TickError`]; any error ends the current worker run.

use std::future::Future;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// Inputs handed to a single tick
#[derive(Debug, Clone)]
pub struct TickContext {
    /// 1-based iteration number within the current run
    pub iteration: u64,
    /// Identifier of the worker run this tick belongs to
    pub run_id: String,
    /// Config as it was at the start of this cycle
    pub config: Map<String, Value>,
    /// Cancelled when `stop()` is requested; cooperative ticks may return early
    pub cancel: CancellationToken,
}

/// Error type for tick failures
#[derive(Debug, Clone, PartialEq)]
pub enum TickError {
    /// The work itself reported a failure
    Failed(String),
    /// The tick exceeded the configured timeout
    TimedOut(Duration),
    /// The tick panicked
    Panicked(String),
}

impl TickError {
    pub fn failed(msg: impl Into<String>) -> Self {
        TickError::Failed(msg.into())
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            TickError::Failed(_) => "failed",
            TickError::TimedOut(_) => "timeout",
            TickError::Panicked(_) => "panic",
        }
    }
}

impl std::fmt::Display for TickError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickError::Failed(msg) => write!(f, "{}", msg),
            TickError::TimedOut(after) => write!(f, "tick timed out after {:?}", after),
            TickError::Panicked(msg) => write!(f, "tick panicked: {}", msg),
        }
    }
}

impl std::error::Error for TickError {}

/// Injected work function
pub trait Tick: Send + Sync + 'static {
    fn tick(&self, ctx: TickContext) -> BoxFuture<'_, Result<(), TickError>>;
}

/// Stand-in work: waits a short, fixed delay and succeeds
#[derive(Debug, Clone)]
pub struct PlaceholderTick {
    delay: Duration,
}

impl PlaceholderTick {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for PlaceholderTick {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

impl Tick for PlaceholderTick {
    fn tick(&self, ctx: TickContext) -> BoxFuture<'_, Result<(), TickError>> {
        Box::pin(async move {
            tokio::select! {
                _ = ctx.cancel.cancelled() => {}
                _ = tokio::time::sleep(self.delay) => {}
            }
            Ok(())
        })
    }
}

/// Adapts an async closure into a [`Tick`]
///
/// ```ignore
/// let tick = FnTick::new(|ctx: TickContext| async move {
///     tracing::info!(iteration = ctx.iteration, "working");
///     Ok(())
/// });
/// ```
pub struct FnTick<F> {
    f: F,
}

impl<F> FnTick<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Tick for FnTick<F>
where
    F: Fn(TickContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TickError>> + Send + 'static,
{
    fn tick(&self, ctx: TickContext) -> BoxFuture<'_, Result<(), TickError>> {
        Box::pin((self.f)(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TickContext {
        TickContext {
            iteration: 1,
            run_id: "test-run".to_string(),
            config: Map::new(),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_placeholder_succeeds() {
        let tick = PlaceholderTick::new(Duration::from_millis(5));
        assert_eq!(tick.tick(ctx()).await, Ok(()));
    }

    #[tokio::test]
    async fn test_placeholder_returns_early_when_cancelled() {
        let tick = PlaceholderTick::new(Duration::from_secs(60));
        let ctx = ctx();
        ctx.cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), tick.tick(ctx)).await;
        assert_eq!(result, Ok(Ok(())));
    }

    #[tokio::test]
    async fn test_fn_tick_sees_context() {
        let tick = FnTick::new(|ctx: TickContext| async move {
            if ctx.iteration == 1 {
                Err(TickError::failed(format!("boom in {}", ctx.run_id)))
            } else {
                Ok(())
            }
        });

        let err = tick.tick(ctx()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom in test-run");
        assert_eq!(err.kind(), "failed");
    }

    #[test]
    fn test_error_display() {
        let err = TickError::TimedOut(Duration::from_secs(2));
        assert_eq!(err.to_string(), "tick timed out after 2s");
        assert_eq!(TickError::Panicked("oops".into()).to_string(), "tick panicked: oops");
    }
}
