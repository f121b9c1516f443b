//! Error taxonomy shared by units, middleware, registries and invokers.

use std::time::Duration;

/// Errors produced anywhere along an invocation.
///
/// Rejections raised before the terminal function runs (`NotFound`,
/// `Validation`, `RateLimited`, `CircuitOpen`, context errors) never reach
/// business code. Business failures arrive as [`LambdaError::Function`].
#[derive(Debug, thiserror::Error)]
pub enum LambdaError {
    #[error("lambda '{name}' not found")]
    NotFound { name: String },
    #[error("lambda '{name}' already registered")]
    AlreadyRegistered { name: String },
    #[error("constructor for lambda '{name}' not found")]
    ConstructorNotFound { name: String },
    #[error("input validation failed: {0}")]
    Validation(#[source] anyhow::Error),
    #[error("input transformation failed: {0}")]
    InputTransform(#[source] anyhow::Error),
    #[error("output transformation failed: {0}")]
    OutputTransform(#[source] anyhow::Error),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<LambdaError>,
    },
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error("panic recovered: {message}\nstack: {backtrace}")]
    Panicked { message: String, backtrace: String },
    #[error("context cancelled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    #[error("no steps in chain")]
    EmptyChain,
    #[error(transparent)]
    Function(#[from] anyhow::Error),
}

impl LambdaError {
    /// Wraps any displayable business error.
    pub fn function(err: impl std::fmt::Display) -> Self {
        Self::Function(anyhow::anyhow!("{err}"))
    }

    /// `true` for errors raised by the call context itself.
    #[must_use]
    pub fn is_context_error(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Whether a retry loop may try again after this error.
    ///
    /// Rejections raised before the terminal function (context errors,
    /// lookup failures, validation, rate limiting, an open circuit) are
    /// final. Business errors, panics and timeouts may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Cancelled
                | Self::DeadlineExceeded
                | Self::NotFound { .. }
                | Self::AlreadyRegistered { .. }
                | Self::ConstructorNotFound { .. }
                | Self::Validation(_)
                | Self::RateLimited
                | Self::CircuitOpen
                | Self::EmptyChain
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = LambdaError::NotFound {
            name: "math_double".to_string(),
        };
        assert_eq!(err.to_string(), "lambda 'math_double' not found");

        let err = LambdaError::RetryExhausted {
            attempts: 3,
            source: Box::new(LambdaError::function("boom")),
        };
        assert_eq!(err.to_string(), "after 3 attempts: boom");

        let err = LambdaError::Timeout(Duration::from_millis(50));
        assert_eq!(err.to_string(), "timeout after 50ms");
    }

    #[test]
    fn function_error_is_transparent() {
        let err: LambdaError = anyhow::anyhow!("test error").into();
        assert_eq!(err.to_string(), "test error");
        assert!(err.is_retryable());
        assert!(!err.is_context_error());
    }

    #[test]
    fn classification() {
        assert!(LambdaError::Cancelled.is_context_error());
        assert!(LambdaError::DeadlineExceeded.is_context_error());
        assert!(!LambdaError::Cancelled.is_retryable());
        assert!(!LambdaError::Validation(anyhow::anyhow!("bad")).is_retryable());
        assert!(!LambdaError::RateLimited.is_retryable());
        assert!(!LambdaError::CircuitOpen.is_retryable());
        assert!(LambdaError::Timeout(Duration::from_secs(1)).is_retryable());
    }
}
