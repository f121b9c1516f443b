//! Circuit breaker with per-input failure counting.
//!
//! The breaker is Closed until some input accumulates `max_failures`
//! consecutive failures, which opens it for every input. Once `reset_timeout`
//! has passed since the last failure, a single trial call is let through
//! (HalfOpen): success closes the breaker, failure re-opens it.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use super::{Middleware, Next};
use crate::context::InvokeContext;
use crate::error::LambdaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState<I> {
    state: CircuitState,
    failures: HashMap<I, u32>,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

/// Shared breaker; layer it into a chain as `Arc<CircuitBreaker<I>>`.
#[derive(Debug)]
pub struct CircuitBreaker<I> {
    max_failures: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerState<I>>,
}

/// What the gate decided for one call.
#[derive(Debug, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

impl<I> CircuitBreaker<I>
where
    I: Hash + Eq,
{
    #[must_use]
    pub fn new(max_failures: u32, reset_timeout: Duration) -> Self {
        Self {
            max_failures: max_failures.max(1),
            reset_timeout,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: HashMap::new(),
                last_failure: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Current state, without promoting Open to HalfOpen.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Consecutive failures recorded for `input`.
    #[must_use]
    pub fn failures(&self, input: &I) -> u32 {
        self.inner.lock().failures.get(input).copied().unwrap_or(0)
    }

    fn admit(&self) -> Option<Admission> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Some(Admission::Normal),
            CircuitState::Open => {
                let cooled = inner
                    .last_failure
                    .is_none_or(|at| at.elapsed() >= self.reset_timeout);
                if cooled {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    tracing::debug!("circuit half-open, admitting trial call");
                    Some(Admission::Trial)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen if !inner.trial_in_flight => {
                inner.trial_in_flight = true;
                Some(Admission::Trial)
            }
            CircuitState::HalfOpen => None,
        }
    }

    fn record(&self, input: I, admission: &Admission, success: bool) {
        let mut inner = self.inner.lock();
        if *admission == Admission::Trial {
            inner.trial_in_flight = false;
        }
        if success {
            inner.failures.remove(&input);
            if inner.state == CircuitState::HalfOpen {
                inner.state = CircuitState::Closed;
                tracing::info!("circuit closed");
            }
            return;
        }

        inner.last_failure = Some(Instant::now());
        let count = inner.failures.entry(input).or_insert(0);
        *count += 1;
        let tripped = *count >= self.max_failures;
        if tripped || inner.state == CircuitState::HalfOpen {
            if inner.state != CircuitState::Open {
                tracing::warn!("circuit opened");
            }
            inner.state = CircuitState::Open;
        }
    }

    /// A trial call that never reported back counts as a failure.
    fn abandon_trial(&self) {
        let mut inner = self.inner.lock();
        if inner.trial_in_flight {
            inner.trial_in_flight = false;
            inner.state = CircuitState::Open;
            inner.last_failure = Some(Instant::now());
        }
    }
}

struct TrialGuard<'a, I: Hash + Eq> {
    breaker: &'a CircuitBreaker<I>,
    armed: bool,
}

impl<I: Hash + Eq> Drop for TrialGuard<'_, I> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.abandon_trial();
        }
    }
}

#[async_trait]
impl<I, O> Middleware<I, O> for Arc<CircuitBreaker<I>>
where
    I: Hash + Eq + Clone + Send + 'static,
    O: Send + 'static,
{
    async fn handle(&self, ctx: InvokeContext, input: I, next: Next<I, O>) -> Result<O, LambdaError> {
        let Some(admission) = self.admit() else {
            return Err(LambdaError::CircuitOpen);
        };
        let mut guard = TrialGuard {
            breaker: self.as_ref(),
            armed: admission == Admission::Trial,
        };

        let result = next.run(ctx, input.clone()).await;
        guard.armed = false;
        self.record(input, &admission, result.is_ok());
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
