//! Retry middleware and the attempt loop shared with units.

use async_trait::async_trait;

use super::{Middleware, Next};
use crate::backoff::Backoff;
use crate::context::InvokeContext;
use crate::error::LambdaError;

/// Why an attempt loop gave up.
#[derive(Debug)]
pub(crate) enum RetryStop {
    /// The context was cancelled or expired; carries the context error.
    Context(LambdaError),
    /// An error that must not be retried.
    Final(LambdaError),
    /// Every attempt failed with a retryable error.
    Exhausted { attempts: u32, last: LambdaError },
}

/// Runs `call` up to `retries + 1` times, sleeping `backoff.delay(n)` before
/// retry `n`. No attempt starts once `ctx` is done.
pub(crate) async fn run_attempts<I, O, F>(
    ctx: &InvokeContext,
    input: &I,
    retries: u32,
    backoff: Backoff,
    call: F,
) -> Result<O, RetryStop>
where
    I: Clone,
    F: Fn(InvokeContext, I) -> super::BoxResultFuture<O>,
{
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            ctx.sleep(backoff.delay(attempt))
                .await
                .map_err(RetryStop::Context)?;
        }
        if let Some(ctx_err) = ctx.err() {
            return Err(RetryStop::Context(ctx_err));
        }

        let err = match call(ctx.clone(), input.clone()).await {
            Ok(output) => return Ok(output),
            Err(err) => err,
        };
        if let Some(ctx_err) = ctx.err() {
            return Err(RetryStop::Context(ctx_err));
        }
        if !err.is_retryable() {
            return Err(RetryStop::Final(err));
        }

        attempt += 1;
        if attempt > retries {
            return Err(RetryStop::Exhausted {
                attempts: attempt,
                last: err,
            });
        }
        tracing::debug!(attempt, error = %err, "attempt failed, retrying");
    }
}

/// Retries the rest of the chain with exponential backoff (100ms doubling,
/// capped at 5s).
///
/// Only this middleware's position is retried: stages outside it run once per
/// call, stages inside it once per attempt.
#[derive(Debug, Clone, Copy)]
pub struct Retry {
    retries: u32,
    backoff: Backoff,
}

impl Retry {
    /// Allows `retries` additional attempts after the first failure.
    #[must_use]
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            backoff: Backoff::middleware_default(),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl<I, O> Middleware<I, O> for Retry
where
    I: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    async fn handle(&self, ctx: InvokeContext, input: I, next: Next<I, O>) -> Result<O, LambdaError> {
        let outcome = run_attempts(&ctx, &input, self.retries, self.backoff, |ctx, input| {
            next.run(ctx, input)
        })
        .await;

        match outcome {
            Ok(output) => Ok(output),
            Err(RetryStop::Context(err) | RetryStop::Final(err)) => Err(err),
            Err(RetryStop::Exhausted { attempts, last }) => {
                tracing::warn!(attempts, error = %last, "retries exhausted");
                Err(LambdaError::RetryExhausted {
                    attempts,
                    source: Box::new(last),
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
