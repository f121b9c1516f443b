//! Logging middleware.
//!
//! Wraps the rest of the chain in an `info_span!("lambda", ...)` and emits a
//! start event plus a completion event carrying `duration_ms` and `outcome`.
//! Input, output and error pass through untouched.

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{info_span, Instrument};

use super::{Middleware, Next};
use crate::context::InvokeContext;
use crate::error::LambdaError;

/// Tracing middleware labelled with a caller-chosen name.
#[derive(Debug, Clone)]
pub struct Logger {
    name: String,
}

impl Logger {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl<I, O> Middleware<I, O> for Logger
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn handle(&self, ctx: InvokeContext, input: I, next: Next<I, O>) -> Result<O, LambdaError> {
        let name = self.name.as_str();
        let span = info_span!(
            "lambda",
            name = name,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            tracing::info!(name = name, "invocation started");

            let result = next.run(ctx, input).await;

            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = start.elapsed().as_millis() as u64;
            let outcome = if result.is_ok() { "ok" } else { "error" };
            tracing::Span::current().record("duration_ms", duration_ms);
            tracing::Span::current().record("outcome", outcome);

            match &result {
                Ok(_) => tracing::info!(name = name, duration_ms, "invocation completed"),
                Err(err) => tracing::warn!(name = name, duration_ms, error = %err, "invocation failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}
