//! The executable unit: a named function, its options and running statistics.

use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;

use futures_util::FutureExt;
use serde::Serialize;
use tokio::time::Instant;
use tracing::Instrument;

use crate::backoff::Backoff;
use crate::context::InvokeContext;
use crate::error::LambdaError;
use crate::middleware::retry::{run_attempts, RetryStop};
use crate::middleware::{invoke_fn, BoxResultFuture, Chain, InvokeFn, Middleware};
use crate::options::LambdaOptions;
use crate::result::LambdaResult;
use crate::stats::{InvocationStats, StatsHandle};

/// Introspection record for a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LambdaMeta {
    pub name: String,
    pub input_type: &'static str,
    pub output_type: &'static str,
    pub component_type: String,
    pub registered_at: SystemTime,
}

/// A named unit of work taking `I` and producing `O`.
///
/// Cloning is cheap; clones share the same function, chain and statistics.
/// The name and function never change after construction. Derivations such
/// as [`Lambda::with_options`] and [`Lambda::layer`] return new units that
/// keep reporting into the original statistics record.
pub struct Lambda<I, O> {
    name: Arc<str>,
    chain: Chain<I, O>,
    options: Arc<LambdaOptions>,
    stats: StatsHandle,
    created_at: SystemTime,
}

impl<I, O> Lambda<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    /// Creates a unit with its own statistics.
    #[must_use]
    pub fn new<E, F, Fut>(name: impl Into<String>, f: F, options: LambdaOptions) -> Self
    where
        F: Fn(InvokeContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        E: Into<LambdaError>,
    {
        Self::from_chain(name, Chain::new(invoke_fn(f)), options)
    }

    /// Creates a unit whose every attempt runs through `chain`.
    #[must_use]
    pub fn from_chain(name: impl Into<String>, chain: Chain<I, O>, options: LambdaOptions) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            chain,
            options: Arc::new(options),
            stats: StatsHandle::new(),
            created_at: SystemTime::now(),
        }
    }

    /// Creates a unit wrapping `f` in `middlewares`, first one outermost.
    #[must_use]
    pub fn with_middleware<E, F, Fut>(
        name: impl Into<String>,
        f: F,
        middlewares: Vec<Arc<dyn Middleware<I, O>>>,
        options: LambdaOptions,
    ) -> Self
    where
        F: Fn(InvokeContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        E: Into<LambdaError>,
    {
        Self::from_chain(name, Chain::new(invoke_fn(f)).extend(middlewares), options)
    }

    /// Same name, function and statistics with different options.
    #[must_use]
    pub fn with_options(&self, options: LambdaOptions) -> Self {
        Self {
            options: Arc::new(options),
            ..self.clone()
        }
    }

    /// Same unit with `middleware` appended innermost to its chain.
    #[must_use]
    pub fn layer<M>(&self, middleware: M) -> Self
    where
        M: Middleware<I, O>,
    {
        Self {
            chain: self.chain.layer(middleware),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn options(&self) -> &LambdaOptions {
        &self.options
    }

    /// Snapshot of the running statistics.
    #[must_use]
    pub fn metrics(&self) -> InvocationStats {
        self.stats.snapshot()
    }

    /// Handle to the statistics record shared by every derivation of this unit.
    #[must_use]
    pub fn stats_handle(&self) -> &StatsHandle {
        &self.stats
    }

    #[must_use]
    pub fn meta(&self) -> LambdaMeta {
        LambdaMeta {
            name: self.name.to_string(),
            input_type: type_name::<I>(),
            output_type: type_name::<O>(),
            component_type: self.options.component_type.clone(),
            registered_at: self.created_at,
        }
    }

    /// Invokes the unit and returns a populated result shell.
    ///
    /// A positive `timeout` option bounds the whole call, retries included.
    /// Failed attempts are retried `retries` times with linear backoff
    /// (`attempt * 100ms`); the last error is returned as-is. Once the context
    /// is done no further attempt starts and the context error is reported.
    pub async fn invoke(&self, ctx: InvokeContext, input: I) -> LambdaResult<O> {
        let start = Instant::now();
        let ctx = if self.options.timeout.is_zero() {
            ctx
        } else {
            ctx.with_timeout(self.options.timeout)
        };

        let span = tracing::debug_span!("invoke", lambda = %self.name);
        let outcome = self.run(&ctx, input).instrument(span).await;
        let duration = start.elapsed();

        if self.options.enable_metrics {
            self.stats.record(duration, outcome.is_ok());
            let label = if outcome.is_ok() { "ok" } else { "error" };
            metrics::counter!(
                "minilambda_invocations_total",
                "lambda" => self.name.to_string(),
                "outcome" => label
            )
            .increment(1);
            metrics::histogram!("minilambda_invocation_seconds", "lambda" => self.name.to_string())
                .record(duration.as_secs_f64());
        }

        LambdaResult::from_outcome(outcome, duration)
    }

    /// Like [`Lambda::invoke`] without the timing information.
    ///
    /// # Errors
    ///
    /// Returns the error of the final attempt, or the context error.
    pub async fn call(&self, ctx: InvokeContext, input: I) -> Result<O, LambdaError> {
        self.invoke(ctx, input).await.into_result()
    }

    async fn run(&self, ctx: &InvokeContext, input: I) -> Result<O, LambdaError> {
        let composed = self.chain.as_fn();
        let attempt = move |ctx: InvokeContext, input: I| -> BoxResultFuture<O> {
            let call = composed(ctx.clone(), input);
            async move {
                tokio::select! {
                    biased;
                    err = ctx.done() => Err(err),
                    result = call => result,
                }
            }
            .boxed()
        };

        match run_attempts(ctx, &input, self.options.retries, Backoff::unit_default(), attempt).await {
            Ok(output) => Ok(output),
            Err(RetryStop::Context(err) | RetryStop::Final(err)) => Err(err),
            Err(RetryStop::Exhausted { attempts, last }) => {
                if attempts > 1 {
                    tracing::debug!(attempts, error = %last, "retries exhausted");
                }
                Err(last)
            }
        }
    }

    /// The composed chain as a single callable, bypassing options and statistics.
    #[must_use]
    pub fn as_fn(&self) -> InvokeFn<I, O> {
        self.chain.as_fn()
    }
}

impl<I, O> Clone for Lambda<I, O> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            chain: self.chain.clone(),
            options: Arc::clone(&self.options),
            stats: self.stats.clone(),
            created_at: self.created_at,
        }
    }
}

impl<I, O> fmt::Debug for Lambda<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lambda")
            .field("name", &self.name)
            .field("middlewares", &self.chain.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<I, O> fmt::Display for Lambda<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lambda[{}]: {} -> {}", self.name, type_name::<I>(), type_name::<O>())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
