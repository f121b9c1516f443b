//! Metrics middleware.
//!
//! Times the rest of the chain and records the outcome into an externally
//! owned [`StatsHandle`], so several independently built chains can share one
//! statistics record.

use async_trait::async_trait;
use tokio::time::Instant;

use super::{Middleware, Next};
use crate::context::InvokeContext;
use crate::error::LambdaError;
use crate::stats::StatsHandle;

#[derive(Debug, Clone)]
pub struct Metrics {
    target: StatsHandle,
}

impl Metrics {
    #[must_use]
    pub fn new(target: StatsHandle) -> Self {
        Self { target }
    }
}

#[async_trait]
impl<I, O> Middleware<I, O> for Metrics
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn handle(&self, ctx: InvokeContext, input: I, next: Next<I, O>) -> Result<O, LambdaError> {
        let start = Instant::now();
        let result = next.run(ctx, input).await;
        self.target.record(start.elapsed(), result.is_ok());
        result
    }
}
