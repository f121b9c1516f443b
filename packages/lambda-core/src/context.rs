//! Call context threaded through every invocation.
//!
//! An [`InvokeContext`] carries a cancellation token and an optional deadline.
//! Every suspension point in the crate (retry backoff, concurrency slots,
//! timeout races) selects on [`InvokeContext::done`] so cancellation and
//! expiry propagate to the whole call tree.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::LambdaError;

/// Cancellation and deadline scope for one call tree.
///
/// Cloning is cheap and yields a handle to the *same* scope. Use
/// [`InvokeContext::child`] or [`InvokeContext::with_timeout`] to derive a
/// narrower scope that can be cancelled without affecting the parent.
#[derive(Debug, Clone)]
pub struct InvokeContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl InvokeContext {
    /// A root context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derives a child that is cancelled with the parent but can also be
    /// cancelled on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derives a child whose deadline is `now + timeout`, or the parent's
    /// deadline if that is earlier. A `timeout` too large to represent adds
    /// no deadline.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(),
        }
    }

    /// Derives a child with the given deadline, never extending the parent's.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancels this scope and every scope derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The deadline of this scope, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline. `None` when no deadline is set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Whether the scope has been cancelled or its deadline has passed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// The context error once the scope is done, `None` while it is live.
    ///
    /// Cancellation takes precedence over expiry when both hold.
    #[must_use]
    pub fn err(&self) -> Option<LambdaError> {
        if self.token.is_cancelled() {
            return Some(LambdaError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(LambdaError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves with the context error when the scope is cancelled or expires.
    ///
    /// Never resolves for a background context that nobody cancels.
    pub async fn done(&self) -> LambdaError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                () = self.token.cancelled() => LambdaError::Cancelled,
                () = tokio::time::sleep_until(deadline) => LambdaError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                LambdaError::Cancelled
            }
        }
    }

    /// Sleeps for `delay` unless the scope finishes first, in which case the
    /// context error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`LambdaError::Cancelled`] or [`LambdaError::DeadlineExceeded`]
    /// if the scope ends before the delay elapses.
    pub async fn sleep(&self, delay: Duration) -> Result<(), LambdaError> {
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

impl Default for InvokeContext {
    fn default() -> Self {
        Self::background()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
