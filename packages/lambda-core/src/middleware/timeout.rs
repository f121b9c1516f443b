//! Timeout middleware.
//!
//! Runs the rest of the chain on a separate tokio task and races it against a
//! deadline of `now + duration`. When the deadline wins, the caller gets
//! [`LambdaError::Timeout`] and the task is aborted.
//!
//! Cancellation is best-effort. Abort takes effect at the task's next `.await`,
//! and the derived context is cancelled so cooperative code can stop early, but
//! a synchronous stretch of code (or a blocking call) that is already running
//! completes before the abort lands. Side effects from such code can therefore
//! still occur after the timeout has been reported.
//!
//! A panic inside the raced task is re-raised on the calling task, so a
//! [`Recovery`](super::Recovery) placed outside this middleware still sees it.

use std::time::Duration;

use async_trait::async_trait;

use super::{Middleware, Next};
use crate::context::InvokeContext;
use crate::error::LambdaError;

#[derive(Debug, Clone, Copy)]
pub struct Timeout {
    duration: Duration,
}

impl Timeout {
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl<I, O> Middleware<I, O> for Timeout
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn handle(&self, ctx: InvokeContext, input: I, next: Next<I, O>) -> Result<O, LambdaError> {
        let duration = self.duration;
        let scoped = ctx.with_timeout(duration);
        let task_ctx = scoped.clone();
        let mut task = tokio::spawn(async move { next.run(task_ctx, input).await });

        tokio::select! {
            joined = &mut task => match joined {
                Ok(result) => result,
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => Err(LambdaError::Cancelled),
            },
            reason = scoped.done() => {
                scoped.cancel();
                task.abort();
                // An earlier deadline or cancellation on the caller's context wins.
                match ctx.err() {
                    Some(parent) => Err(parent),
                    None if reason.is_context_error() => {
                        tracing::debug!(timeout = ?duration, "raced call timed out");
                        Err(LambdaError::Timeout(duration))
                    }
                    None => Err(reason),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
