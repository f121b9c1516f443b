//! Name-based dispatch with call-time concurrency policy.
//!
//! An [`Invoker<I, O>`] resolves units in one type pair's [`Registry`] and
//! adds bounded parallelism, async dispatch, fan-out, pipelines, chains,
//! batches and invoker-level retry/timeout on top of [`Lambda::invoke`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures_util::future::join_all;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use minilambda_core::{InvokeContext, Lambda, LambdaError, LambdaResult};

use crate::config::InvokerConfig;
use crate::registry::{Registry, RegistrySet};

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Why [`Invoker::pipeline`] stopped early.
#[derive(Debug)]
pub enum PipelineError<O> {
    /// The unit failed on input `index`. `results` holds the successful
    /// prefix followed by the failing result.
    Failed {
        index: usize,
        results: Vec<LambdaResult<O>>,
    },
    /// Lookup failed or the context ended at input `index`; no partial
    /// results are kept.
    Aborted { index: usize, source: LambdaError },
}

impl<O> PipelineError<O> {
    /// Position of the input at which the pipeline stopped.
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::Failed { index, .. } | Self::Aborted { index, .. } => *index,
        }
    }

    /// The error that stopped the pipeline.
    #[must_use]
    pub fn error(&self) -> Option<&LambdaError> {
        match self {
            Self::Failed { results, .. } => results.last().and_then(LambdaResult::error),
            Self::Aborted { source, .. } => Some(source),
        }
    }

    /// Partial results of a failed pipeline; empty when aborted.
    #[must_use]
    pub fn into_results(self) -> Vec<LambdaResult<O>> {
        match self {
            Self::Failed { results, .. } => results,
            Self::Aborted { .. } => Vec::new(),
        }
    }
}

impl<O> fmt::Display for PipelineError<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { index, .. } => match self.error() {
                Some(err) => write!(f, "pipeline failed at step {index}: {err}"),
                None => write!(f, "pipeline failed at step {index}"),
            },
            Self::Aborted { index, source } => write!(f, "pipeline aborted at step {index}: {source}"),
        }
    }
}

impl<O: fmt::Debug> std::error::Error for PipelineError<O> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error().map(|err| err as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Invoker
// ---------------------------------------------------------------------------

/// Resolves units by name in one type pair and invokes them.
///
/// Cloning is cheap; clones share the registry and the execution slots.
pub struct Invoker<I, O> {
    registry: Arc<Registry<I, O>>,
    slots: Option<Arc<Semaphore>>,
    config: InvokerConfig,
}

impl<I, O> Invoker<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    /// An invoker over the `I -> O` registry of `registries`.
    #[must_use]
    pub fn new(registries: &RegistrySet) -> Self {
        Self::from_registry(registries.registry::<I, O>())
    }

    /// An invoker over the process-wide registries.
    #[must_use]
    pub fn global() -> Self {
        Self::new(RegistrySet::global())
    }

    #[must_use]
    pub fn from_registry(registry: Arc<Registry<I, O>>) -> Self {
        Self {
            registry,
            slots: None,
            config: InvokerConfig::default(),
        }
    }

    /// Applies `config`, including its concurrency limit.
    #[must_use]
    pub fn with_config(self, config: InvokerConfig) -> Self {
        let limit = config.max_concurrency;
        Self { config, ..self }.with_concurrency(limit)
    }

    /// Limits in-flight calls through this invoker to `limit`; `0` removes
    /// the limit.
    #[must_use]
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.config.max_concurrency = limit;
        self.slots = (limit > 0).then(|| Arc::new(Semaphore::new(limit)));
        self
    }

    #[must_use]
    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry<I, O>> {
        &self.registry
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Lambda<I, O>> {
        self.registry.get(name)
    }

    /// Invokes the unit registered under `name`.
    ///
    /// With a concurrency limit, waits for a free slot first; if `ctx` ends
    /// while waiting, the shell carries the context error and the unit never
    /// runs. An unknown name yields [`LambdaError::NotFound`].
    pub async fn invoke(&self, ctx: InvokeContext, name: &str, input: I) -> LambdaResult<O> {
        let start = Instant::now();
        match self.dispatch(ctx, name, input).await {
            Ok(result) => result,
            Err(err) => LambdaResult::failed(err, start.elapsed()),
        }
    }

    /// Lookup and slot errors come back as `Err`; anything the unit reports
    /// is inside the `Ok` shell.
    async fn dispatch(&self, ctx: InvokeContext, name: &str, input: I) -> Result<LambdaResult<O>, LambdaError> {
        let lambda = self.get(name).ok_or_else(|| LambdaError::NotFound {
            name: name.to_string(),
        })?;
        let _permit = self.acquire(&ctx).await?;
        Ok(lambda.invoke(ctx, input).await)
    }

    async fn acquire(&self, ctx: &InvokeContext) -> Result<Option<OwnedSemaphorePermit>, LambdaError> {
        let Some(slots) = &self.slots else {
            return Ok(None);
        };
        tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            permit = Arc::clone(slots).acquire_owned() => permit
                .map(Some)
                .map_err(|_| LambdaError::Cancelled),
        }
    }

    /// Starts the invocation on a spawned task. The receiver always gets a
    /// populated shell, lookup failures included.
    pub fn invoke_async(&self, ctx: InvokeContext, name: &str, input: I) -> oneshot::Receiver<LambdaResult<O>> {
        let (tx, rx) = oneshot::channel();
        let invoker = self.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            let result = invoker.invoke(ctx, &name, input).await;
            // The caller may have dropped the receiver.
            let _ = tx.send(result);
        });
        rx
    }

    /// Invokes every `(name, input)` request concurrently and waits for all
    /// of them. Each failure stays in its own entry.
    pub async fn invoke_multiple(&self, ctx: InvokeContext, requests: HashMap<String, I>) -> HashMap<String, LambdaResult<O>> {
        let calls = requests.into_iter().map(|(name, input)| {
            let ctx = ctx.clone();
            async move {
                let result = self.invoke(ctx, &name, input).await;
                (name, result)
            }
        });
        join_all(calls).await.into_iter().collect()
    }

    /// Invokes `name` once per input, in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Failed`] when the unit reports an error for some
    /// input; [`PipelineError::Aborted`] when the unit is missing or the
    /// context ends.
    pub async fn pipeline(
        &self,
        ctx: InvokeContext,
        name: &str,
        inputs: Vec<I>,
    ) -> Result<Vec<LambdaResult<O>>, PipelineError<O>> {
        let mut results = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.into_iter().enumerate() {
            let result = self
                .dispatch(ctx.clone(), name, input)
                .await
                .map_err(|source| PipelineError::Aborted { index, source })?;

            match result.error {
                None => results.push(result),
                Some(err) if err.is_context_error() => {
                    return Err(PipelineError::Aborted { index, source: err });
                }
                Some(_) => {
                    tracing::debug!(lambda = name, index, "pipeline step failed");
                    results.push(result);
                    return Err(PipelineError::Failed { index, results });
                }
            }
        }
        Ok(results)
    }

    /// Retries the whole invocation with a fixed `delay` between attempts.
    ///
    /// Lookup failures, context errors and other non-retryable errors are
    /// returned at once. After `max_retries + 1` failed attempts the shell
    /// carries [`LambdaError::RetryExhausted`] wrapping the last error.
    pub async fn retry(&self, ctx: InvokeContext, name: &str, input: I, max_retries: u32, delay: Duration) -> LambdaResult<O> {
        let start = Instant::now();
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                if let Err(err) = ctx.sleep(delay).await {
                    return LambdaResult::failed(err, start.elapsed());
                }
            }

            let result = match self.dispatch(ctx.clone(), name, input.clone()).await {
                Ok(result) => result,
                Err(err) => return LambdaResult::failed(err, start.elapsed()),
            };
            let err = match result.error {
                None => {
                    return LambdaResult {
                        duration: start.elapsed(),
                        timestamp: SystemTime::now(),
                        ..result
                    }
                }
                Some(err) => err,
            };
            if !err.is_retryable() {
                return LambdaResult::failed(err, start.elapsed());
            }

            attempt += 1;
            if attempt > max_retries {
                tracing::warn!(lambda = name, attempts = attempt, error = %err, "invoker retries exhausted");
                let err = LambdaError::RetryExhausted {
                    attempts: attempt,
                    source: Box::new(err),
                };
                return LambdaResult::failed(err, start.elapsed());
            }
            tracing::debug!(lambda = name, attempt, error = %err, "invocation failed, retrying");
        }
    }

    /// Invokes `name` under a context that expires after `timeout`.
    pub async fn timeout(&self, ctx: InvokeContext, name: &str, input: I, timeout: Duration) -> LambdaResult<O> {
        self.invoke(ctx.with_timeout(timeout), name, input).await
    }

    /// Invokes `name` for every input, `batch_size` inputs at a time.
    ///
    /// Batches run one after another and the inputs of a batch run
    /// concurrently. Results line up with `inputs`. A `batch_size` of `0`
    /// uses the configured default.
    pub async fn batch(&self, ctx: InvokeContext, name: &str, inputs: Vec<I>, batch_size: usize) -> Vec<LambdaResult<O>> {
        let size = match batch_size {
            0 => self.config.default_batch_size,
            n => n,
        };
        let size = if size == 0 { inputs.len().max(1) } else { size };

        let mut results = Vec::with_capacity(inputs.len());
        let mut pending = inputs.into_iter().peekable();
        while pending.peek().is_some() {
            let calls = pending
                .by_ref()
                .take(size)
                .map(|input| self.invoke(ctx.clone(), name, input));
            results.extend(join_all(calls).await);
        }
        results
    }
}

impl<T> Invoker<T, T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Feeds `input` through the named units in order, each output becoming
    /// the next input. The shell's duration is the sum of the step durations.
    ///
    /// An empty `names` yields [`LambdaError::EmptyChain`]; the first failing
    /// step ends the chain with its error.
    pub async fn chain<S>(&self, ctx: InvokeContext, names: &[S], input: T) -> LambdaResult<T>
    where
        S: AsRef<str>,
    {
        if names.is_empty() {
            return LambdaResult::failed(LambdaError::EmptyChain, Duration::ZERO);
        }

        let mut current = input;
        let mut total = Duration::ZERO;
        for (step, name) in names.iter().enumerate() {
            let name = name.as_ref();
            let result = self.invoke(ctx.clone(), name, current).await;
            total += result.duration;
            match result.into_result() {
                Ok(output) => current = output,
                Err(err) => {
                    tracing::debug!(lambda = name, step, error = %err, "chain step failed");
                    return LambdaResult::failed(err, total);
                }
            }
        }
        LambdaResult::from_outcome(Ok(current), total)
    }
}

impl<I, O> Clone for Invoker<I, O> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            slots: self.slots.clone(),
            config: self.config.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    use minilambda_core::LambdaOptions;

    use super::*;

    fn setup() -> (RegistrySet, Invoker<i32, i32>) {
        let set = RegistrySet::new();
        set.register_lambda(
            "math_double",
            |_ctx, x: i32| async move { Ok::<_, LambdaError>(x * 2) },
            LambdaOptions::default(),
        )
        .unwrap();
        set.register_lambda(
            "positive_only",
            |_ctx, x: i32| async move {
                anyhow::ensure!(x > 0, "{x} is not positive");
                Ok(x)
            },
            LambdaOptions::default(),
        )
        .unwrap();
        let invoker = Invoker::new(&set);
        (set, invoker)
    }

    #[tokio::test]
    async fn invoke_resolves_by_name() {
        let (_set, invoker) = setup();
        let result = invoker.invoke(InvokeContext::background(), "math_double", 21).await;
        assert_eq!(result.output(), Some(&42));
    }

    #[tokio::test]
    async fn unknown_name_is_not_found() {
        let (_set, invoker) = setup();
        let result = invoker.invoke(InvokeContext::background(), "nope", 1).await;
        assert!(matches!(result.error(), Some(LambdaError::NotFound { name }) if name == "nope"));
        assert!(result.output().is_none());
    }

    #[tokio::test]
    async fn async_dispatch_delivers_shell_even_when_missing() {
        let (_set, invoker) = setup();
        let ok = invoker.invoke_async(InvokeContext::background(), "math_double", 4);
        let missing = invoker.invoke_async(InvokeContext::background(), "nope", 4);

        assert_eq!(ok.await.unwrap().output(), Some(&8));
        let missing = missing.await.unwrap();
        assert!(matches!(missing.error(), Some(LambdaError::NotFound { .. })));
    }

    #[tokio::test]
    async fn pipeline_keeps_order() {
        let (_set, invoker) = setup();
        let results = invoker
            .pipeline(InvokeContext::background(), "math_double", vec![1, 2, 3, 4, 5])
            .await
            .unwrap();
        let outputs: Vec<i32> = results.into_iter().filter_map(|r| r.output).collect();
        assert_eq!(outputs, vec![2, 4, 6, 8, 10]);
    }

    #[tokio::test]
    async fn pipeline_stops_at_first_failure_with_prefix() {
        let (_set, invoker) = setup();
        let err = invoker
            .pipeline(InvokeContext::background(), "positive_only", vec![1, 2, -3, 4])
            .await
            .unwrap_err();
        assert_eq!(err.index(), 2);
        assert_eq!(err.to_string(), "pipeline failed at step 2: -3 is not positive");
        let results = err.into_results();
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].output(), Some(&2));
        assert!(!results[2].is_ok());
    }

    #[tokio::test]
    async fn pipeline_aborts_without_results_on_missing_unit() {
        let (_set, invoker) = setup();
        let err = invoker
            .pipeline(InvokeContext::background(), "nope", vec![1, 2])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Aborted { index: 0, source: LambdaError::NotFound { .. } }));
        assert!(err.into_results().is_empty());
    }

    #[tokio::test]
    async fn pipeline_aborts_on_cancelled_context() {
        let (_set, invoker) = setup();
        let ctx = InvokeContext::background();
        ctx.cancel();
        let err = invoker.pipeline(ctx, "math_double", vec![1]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Aborted { source: LambdaError::Cancelled, .. }));
    }

    #[tokio::test]
    async fn invoke_multiple_isolates_failures() {
        let (_set, invoker) = setup();
        let requests = HashMap::from([
            ("math_double".to_string(), 5),
            ("positive_only".to_string(), -1),
        ]);
        let results = invoker.invoke_multiple(InvokeContext::background(), requests).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results["math_double"].output(), Some(&10));
        assert!(results["positive_only"].error().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_limit_bounds_in_flight_calls() {
        let set = RegistrySet::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            set.register_lambda(
                "slow",
                move |_ctx, x: i32| {
                    let in_flight = in_flight.clone();
                    let peak = peak.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, LambdaError>(x)
                    }
                },
                LambdaOptions::default(),
            )
            .unwrap();
        }
        let invoker = Invoker::<i32, i32>::new(&set).with_concurrency(2);

        let results = invoker
            .batch(InvokeContext::background(), "slow", (0..8).collect(), 8)
            .await;
        assert!(results.iter().all(LambdaResult::is_ok));
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slot_wait_gives_up_when_context_expires() {
        let set = RegistrySet::new();
        set.register_lambda(
            "hold",
            |_ctx, x: i32| async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, LambdaError>(x)
            },
            LambdaOptions::default().with_timeout(Duration::ZERO),
        )
        .unwrap();
        let invoker = Invoker::<i32, i32>::new(&set).with_concurrency(1);

        let holder = invoker.invoke_async(InvokeContext::background(), "hold", 1);
        tokio::task::yield_now().await;

        let waiting = invoker
            .timeout(InvokeContext::background(), "hold", 2, Duration::from_millis(50))
            .await;
        assert!(matches!(waiting.error(), Some(LambdaError::DeadlineExceeded)));
        assert_eq!(holder.await.unwrap().output(), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_uses_fixed_delay_and_wraps_last_error() {
        let set = RegistrySet::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        set.register_lambda(
            "always_fails",
            move |_ctx, _x: i32| {
                let n = counted.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err::<i32, _>(anyhow::anyhow!("failure {n}")) }
            },
            LambdaOptions::default(),
        )
        .unwrap();
        let invoker = Invoker::<i32, i32>::new(&set);

        let start = Instant::now();
        let result = invoker
            .retry(InvokeContext::background(), "always_fails", 1, 2, Duration::from_millis(100))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert_eq!(
            result.error().map(ToString::to_string).as_deref(),
            Some("after 3 attempts: failure 3")
        );
    }

    #[tokio::test]
    async fn retry_does_not_retry_missing_unit() {
        let (_set, invoker) = setup();
        let result = invoker
            .retry(InvokeContext::background(), "nope", 1, 5, Duration::from_secs(1))
            .await;
        assert!(matches!(result.error(), Some(LambdaError::NotFound { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_stops_at_rate_limit_rejection() {
        use minilambda_core::middleware::{RateLimit, RateLimiter};

        let set = RegistrySet::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let unit = Lambda::new(
            "limited_failure",
            move |_ctx, _x: i32| {
                counted.fetch_add(1, Ordering::SeqCst);
                async move { Err::<i32, _>(anyhow::anyhow!("backend down")) }
            },
            LambdaOptions::default(),
        )
        .layer(RateLimit::new(Arc::new(RateLimiter::new(1, Duration::from_secs(10)))));
        set.registry::<i32, i32>().register(unit).unwrap();
        let invoker = Invoker::<i32, i32>::new(&set);

        let start = Instant::now();
        let result = invoker
            .retry(InvokeContext::background(), "limited_failure", 1, 3, Duration::from_millis(100))
            .await;
        assert!(matches!(result.error(), Some(LambdaError::RateLimited)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn unbounded_timeout_invokes_normally() {
        let (_set, invoker) = setup();
        let result = invoker
            .timeout(InvokeContext::background(), "math_double", 5, Duration::MAX)
            .await;
        assert_eq!(result.output(), Some(&10));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_and_returns_output() {
        let set = RegistrySet::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        set.register_lambda(
            "second_time_lucky",
            move |_ctx, x: i32| {
                let n = counted.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    anyhow::ensure!(n >= 2, "not yet");
                    Ok(x)
                }
            },
            LambdaOptions::default(),
        )
        .unwrap();
        let invoker = Invoker::<i32, i32>::new(&set);

        let result = invoker
            .retry(InvokeContext::background(), "second_time_lucky", 7, 3, Duration::from_millis(10))
            .await;
        assert_eq!(result.output(), Some(&7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn batch_covers_every_input_in_order() {
        let (_set, invoker) = setup();
        let results = invoker
            .batch(InvokeContext::background(), "positive_only", vec![1, -2, 3, 4, -5], 2)
            .await;
        assert_eq!(results.len(), 5);
        let flags: Vec<bool> = results.iter().map(LambdaResult::is_ok).collect();
        assert_eq!(flags, vec![true, false, true, true, false]);
        assert_eq!(results[3].output(), Some(&4));
    }

    #[tokio::test]
    async fn batch_size_zero_uses_config_default() {
        let (_set, invoker) = setup();
        let invoker = invoker.with_config(InvokerConfig {
            default_batch_size: 0,
            ..InvokerConfig::default()
        });
        let results = invoker
            .batch(InvokeContext::background(), "math_double", vec![1, 2, 3], 0)
            .await;
        let outputs: Vec<i32> = results.into_iter().filter_map(|r| r.output).collect();
        assert_eq!(outputs, vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn chain_threads_outputs_and_sums_durations() {
        let (_set, invoker) = setup();
        let result = invoker
            .chain(InvokeContext::background(), &["math_double", "positive_only", "math_double"], 3)
            .await;
        assert_eq!(result.output(), Some(&12));

        let failed = invoker
            .chain(InvokeContext::background(), &["math_double", "positive_only"], -1)
            .await;
        assert_eq!(failed.error().map(ToString::to_string).as_deref(), Some("-2 is not positive"));

        let empty: [&str; 0] = [];
        let result = invoker.chain(InvokeContext::background(), &empty, 1).await;
        assert!(matches!(result.error(), Some(LambdaError::EmptyChain)));
    }
}
