//! Sliding-window rate limiting.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{Middleware, Next};
use crate::context::InvokeContext;
use crate::error::LambdaError;

/// Admits at most `max_requests` calls in any trailing `window`.
///
/// Share one limiter between chains with `Arc` to give them a common budget.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    /// Records and admits a call if the window has room.
    pub fn allow(&self) -> bool {
        let now = Instant::now();
        let mut admitted = self.admitted.lock();
        while admitted
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            admitted.pop_front();
        }
        if admitted.len() >= self.max_requests {
            return false;
        }
        admitted.push_back(now);
        true
    }

    /// Calls admitted within the current window.
    #[must_use]
    pub fn in_window(&self) -> usize {
        let now = Instant::now();
        self.admitted
            .lock()
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count()
    }
}

/// Rejects with [`LambdaError::RateLimited`] when the limiter is full; `next`
/// is not called.
#[derive(Debug, Clone)]
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
}

impl RateLimit {
    #[must_use]
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

#[async_trait]
impl<I, O> Middleware<I, O> for RateLimit
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn handle(&self, ctx: InvokeContext, input: I, next: Next<I, O>) -> Result<O, LambdaError> {
        if !self.limiter.allow() {
            tracing::debug!("rate limit exceeded");
            return Err(LambdaError::RateLimited);
        }
        next.run(ctx, input).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
