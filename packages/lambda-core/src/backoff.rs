//! Delay policies used between retry attempts.
//!
//! Each retry layer in the crate uses a different shape:
//! - units wait `attempt × 100ms` ([`Backoff::unit_default`]);
//! - the `Retry` middleware doubles from 100ms up to 5s ([`Backoff::middleware_default`]);
//! - the invoker waits a caller-supplied fixed delay.
//!
//! The delay for an attempt is derived from the attempt number alone, never
//! from a previous delay.

use std::time::Duration;

/// Delay before retry `attempt` (1-based: attempt 1 is the first retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same delay before every retry.
    Fixed(Duration),
    /// `attempt × step`.
    Linear { step: Duration },
    /// `first × 2^(attempt-1)`, clamped to `max`.
    Exponential { first: Duration, max: Duration },
}

impl Backoff {
    #[must_use]
    pub fn unit_default() -> Self {
        Self::Linear {
            step: Duration::from_millis(100),
        }
    }

    #[must_use]
    pub fn middleware_default() -> Self {
        Self::Exponential {
            first: Duration::from_millis(100),
            max: Duration::from_secs(5),
        }
    }

    /// Delay to wait before the given retry. Attempt 0 (the first try) never waits.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        match *self {
            Self::Fixed(delay) => delay,
            Self::Linear { step } => step.saturating_mul(attempt),
            Self::Exponential { first, max } => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                first.saturating_mul(factor).min(max)
            }
        }
    }
}
