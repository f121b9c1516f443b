//! Interceptors wrapped around a terminal function.
//!
//! - [`chain`]: ordered composition of middleware around a terminal function
//! - [`logger`]: start/complete events via `tracing`
//! - [`recovery`]: converts panics into [`LambdaError::Panicked`]
//! - [`timeout`]: races the rest of the chain against a deadline
//! - [`retry`]: exponential-backoff retries of the rest of the chain
//! - [`metrics`]: records into an external [`StatsHandle`](crate::stats::StatsHandle)
//! - [`validate`] / [`transform`]: input checks and input/output mapping
//! - [`cache`]: output caching keyed by input
//! - [`rate_limit`]: sliding-window admission
//! - [`circuit_breaker`]: per-input failure gate
//! - [`before_after`]: caller-supplied hooks around the call

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::context::InvokeContext;
use crate::error::LambdaError;

pub mod before_after;
pub mod cache;
pub mod chain;
pub mod circuit_breaker;
pub mod logger;
pub mod metrics;
pub mod rate_limit;
pub mod recovery;
pub mod retry;
pub mod timeout;
pub mod transform;
pub mod validate;

pub use before_after::BeforeAfter;
pub use cache::{CacheOutput, MemoryCache};
pub use chain::Chain;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use logger::Logger;
pub use metrics::Metrics;
pub use rate_limit::{RateLimit, RateLimiter};
pub use recovery::Recovery;
pub use retry::Retry;
pub use timeout::Timeout;
pub use transform::{TransformInput, TransformOutput};
pub use validate::ValidateInput;

/// Boxed future returned by every stage of a chain.
pub type BoxResultFuture<O> = BoxFuture<'static, Result<O, LambdaError>>;

/// Type-erased invocation function: the terminal function of a chain, or a
/// chain already composed into a single callable.
pub type InvokeFn<I, O> = Arc<dyn Fn(InvokeContext, I) -> BoxResultFuture<O> + Send + Sync>;

/// Erases an async function into an [`InvokeFn`].
pub fn invoke_fn<I, O, E, F, Fut>(f: F) -> InvokeFn<I, O>
where
    F: Fn(InvokeContext, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    E: Into<LambdaError>,
{
    Arc::new(move |ctx: InvokeContext, input: I| -> BoxResultFuture<O> {
        let fut = f(ctx, input);
        async move { fut.await.map_err(Into::into) }.boxed()
    })
}

// ---------------------------------------------------------------------------
// Next
// ---------------------------------------------------------------------------

/// The remainder of a chain as seen from one middleware.
///
/// May be run zero, one or many times.
pub struct Next<I, O> {
    inner: InvokeFn<I, O>,
}

impl<I, O> Next<I, O> {
    #[must_use]
    pub fn new(inner: InvokeFn<I, O>) -> Self {
        Self { inner }
    }

    /// Runs the rest of the chain.
    pub fn run(&self, ctx: InvokeContext, input: I) -> BoxResultFuture<O> {
        (self.inner)(ctx, input)
    }
}

impl<I, O> Clone for Next<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

// ---------------------------------------------------------------------------
// Middleware trait
// ---------------------------------------------------------------------------

/// One interceptor stage of a [`Chain`].
///
/// An implementation may transform the input before calling `next`, transform
/// the output after it, call `next` several times, or return without calling
/// it at all (short-circuit).
#[async_trait]
pub trait Middleware<I, O>: Send + Sync + 'static
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn handle(&self, ctx: InvokeContext, input: I, next: Next<I, O>) -> Result<O, LambdaError>;
}

// ---------------------------------------------------------------------------
// FnMiddleware
// ---------------------------------------------------------------------------

/// Middleware built from a closure. See [`from_fn`].
pub struct FnMiddleware<F> {
    f: F,
}

/// Builds a middleware from an async closure.
///
/// ```
/// use minilambda_core::middleware::{from_fn, Chain};
///
/// let add_one = from_fn(|ctx, input: i32, next| async move {
///     let out: i32 = next.run(ctx, input).await?;
///     Ok::<_, minilambda_core::LambdaError>(out + 1)
/// });
/// let chain = Chain::from_fn(|_ctx, x: i32| async move { Ok::<_, anyhow::Error>(x * 2) })
///     .layer(add_one);
/// # let _ = chain;
/// ```
pub fn from_fn<I, O, F, Fut>(f: F) -> FnMiddleware<F>
where
    F: Fn(InvokeContext, I, Next<I, O>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, LambdaError>> + Send + 'static,
{
    FnMiddleware { f }
}

#[async_trait]
impl<I, O, F, Fut> Middleware<I, O> for FnMiddleware<F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(InvokeContext, I, Next<I, O>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, LambdaError>> + Send + 'static,
{
    async fn handle(&self, ctx: InvokeContext, input: I, next: Next<I, O>) -> Result<O, LambdaError> {
        (self.f)(ctx, input, next).await
    }
}
