use std::time::{Duration, SystemTime};

use crate::error::LambdaError;

/// Outcome of one invocation.
///
/// Always fully populated: on failure `output` is `None`, `error` is set, and
/// `duration`/`timestamp` still describe the attempt.
#[derive(Debug)]
pub struct LambdaResult<O> {
    pub output: Option<O>,
    pub error: Option<LambdaError>,
    pub duration: Duration,
    /// Wall-clock time at which the invocation completed.
    pub timestamp: SystemTime,
}

impl<O> LambdaResult<O> {
    /// Builds a shell from an outcome and its elapsed time, stamped now.
    #[must_use]
    pub fn from_outcome(outcome: Result<O, LambdaError>, duration: Duration) -> Self {
        match outcome {
            Ok(output) => Self {
                output: Some(output),
                error: None,
                duration,
                timestamp: SystemTime::now(),
            },
            Err(err) => Self::failed(err, duration),
        }
    }

    /// A failure shell with no output, stamped now.
    #[must_use]
    pub fn failed(error: LambdaError, duration: Duration) -> Self {
        Self {
            output: None,
            error: Some(error),
            duration,
            timestamp: SystemTime::now(),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    #[must_use]
    pub fn output(&self) -> Option<&O> {
        self.output.as_ref()
    }

    #[must_use]
    pub fn error(&self) -> Option<&LambdaError> {
        self.error.as_ref()
    }

    /// Drops the timing information and returns the plain outcome.
    ///
    /// # Errors
    ///
    /// Returns the recorded error if the invocation failed.
    pub fn into_result(self) -> Result<O, LambdaError> {
        match (self.error, self.output) {
            (Some(err), _) => Err(err),
            (None, Some(output)) => Ok(output),
            // A success shell always carries output; treat a hand-built empty one as failed.
            (None, None) => Err(LambdaError::function("result has neither output nor error")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_shell() {
        let before = SystemTime::now();
        let res = LambdaResult::from_outcome(Ok(15), Duration::from_millis(3));
        assert!(res.timestamp >= before);
        assert!(res.is_ok());
        assert_eq!(res.output(), Some(&15));
        assert_eq!(res.into_result().unwrap(), 15);
    }

    #[test]
    fn failure_shell_keeps_timing() {
        let res: LambdaResult<i32> = LambdaResult::from_outcome(
            Err(LambdaError::RateLimited),
            Duration::from_millis(7),
        );
        assert!(!res.is_ok());
        assert!(res.output().is_none());
        assert_eq!(res.duration, Duration::from_millis(7));
        assert!(matches!(res.into_result(), Err(LambdaError::RateLimited)));
    }
}
