//! Panic recovery middleware.
//!
//! Catches a panic raised anywhere in the rest of the chain (including inside
//! a task spawned by an inner [`Timeout`](super::Timeout), which re-raises it
//! on the calling task) and turns it into [`LambdaError::Panicked`].

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;

use super::{Middleware, Next};
use crate::context::InvokeContext;
use crate::error::LambdaError;

#[derive(Debug, Clone, Copy, Default)]
pub struct Recovery;

impl Recovery {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl<I, O> Middleware<I, O> for Recovery
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn handle(&self, ctx: InvokeContext, input: I, next: Next<I, O>) -> Result<O, LambdaError> {
        let attempt = async move { next.run(ctx, input).await };
        match AssertUnwindSafe(attempt).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(&*payload);
                // Captured after unwinding, so it shows the recovery site.
                let backtrace = Backtrace::force_capture().to_string();
                tracing::error!(panic = %message, "panic recovered");
                Err(LambdaError::Panicked { message, backtrace })
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
