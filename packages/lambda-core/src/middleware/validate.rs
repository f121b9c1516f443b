//! Input validation middleware.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Middleware, Next};
use crate::context::InvokeContext;
use crate::error::LambdaError;

type Validator<I> = Arc<dyn Fn(&I) -> anyhow::Result<()> + Send + Sync>;

/// Runs a predicate before the rest of the chain. A rejected input
/// short-circuits with [`LambdaError::Validation`]; `next` is never called.
pub struct ValidateInput<I> {
    validator: Validator<I>,
}

impl<I> ValidateInput<I> {
    pub fn new<F>(validator: F) -> Self
    where
        F: Fn(&I) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            validator: Arc::new(validator),
        }
    }
}

#[async_trait]
impl<I, O> Middleware<I, O> for ValidateInput<I>
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn handle(&self, ctx: InvokeContext, input: I, next: Next<I, O>) -> Result<O, LambdaError> {
        (self.validator)(&input).map_err(LambdaError::Validation)?;
        next.run(ctx, input).await
    }
}
