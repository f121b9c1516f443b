//! Caller-supplied hooks around the rest of the chain.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{Middleware, Next};
use crate::context::InvokeContext;
use crate::error::LambdaError;

type BeforeHook<I> = Arc<dyn Fn(&InvokeContext, &I) + Send + Sync>;
type AfterHook<I, O> = Arc<dyn Fn(&InvokeContext, &I, &Result<O, LambdaError>, Duration) + Send + Sync>;

/// Runs `before` ahead of `next` and `after` once it returns, whatever the
/// outcome. Neither hook can change the result.
pub struct BeforeAfter<I, O> {
    before: Option<BeforeHook<I>>,
    after: Option<AfterHook<I, O>>,
}

impl<I, O> BeforeAfter<I, O> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            before: None,
            after: None,
        }
    }

    #[must_use]
    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: Fn(&InvokeContext, &I) + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: Fn(&InvokeContext, &I, &Result<O, LambdaError>, Duration) + Send + Sync + 'static,
    {
        self.after = Some(Arc::new(hook));
        self
    }
}

impl<I, O> Default for BeforeAfter<I, O> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<I, O> Middleware<I, O> for BeforeAfter<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    async fn handle(&self, ctx: InvokeContext, input: I, next: Next<I, O>) -> Result<O, LambdaError> {
        let start = Instant::now();
        if let Some(before) = &self.before {
            before(&ctx, &input);
        }

        let Some(after) = &self.after else {
            return next.run(ctx, input).await;
        };
        let result = next.run(ctx.clone(), input.clone()).await;
        after(&ctx, &input, &result, start.elapsed());
        result
    }
}
