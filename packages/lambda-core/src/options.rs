use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-unit configuration.
///
/// Build with struct-update syntax over [`LambdaOptions::default`] or with the
/// chainable `with_*` setters; both produce the same plain value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LambdaOptions {
    /// Deadline applied to each call. `Duration::ZERO` disables it.
    pub timeout: Duration,
    /// Whether invocations update the unit's statistics.
    pub enable_metrics: bool,
    /// Suggested concurrency limit for invokers serving this unit.
    pub concurrency: usize,
    /// Additional attempts after the first failure.
    pub retries: u32,
    /// Whether component callbacks are enabled. Informational only.
    pub enable_callback: bool,
    /// Free-form tag describing the implementing component.
    pub component_type: String,
}

impl Default for LambdaOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            enable_metrics: true,
            concurrency: 10,
            retries: 0,
            enable_callback: false,
            component_type: "Lambda".to_string(),
        }
    }
}

impl LambdaOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub fn with_callback(mut self, enable: bool) -> Self {
        self.enable_callback = enable;
        self
    }

    #[must_use]
    pub fn with_component_type(mut self, component_type: impl Into<String>) -> Self {
        self.component_type = component_type.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = LambdaOptions::default();
        assert_eq!(opts.timeout, Duration::from_secs(30));
        assert!(opts.enable_metrics);
        assert_eq!(opts.concurrency, 10);
        assert_eq!(opts.retries, 0);
        assert!(!opts.enable_callback);
        assert_eq!(opts.component_type, "Lambda");
    }

    #[test]
    fn setters_and_struct_update_agree() {
        let chained = LambdaOptions::default()
            .with_timeout(Duration::from_secs(1))
            .with_retries(2)
            .with_component_type("TestProcessor");
        let updated = LambdaOptions {
            timeout: Duration::from_secs(1),
            retries: 2,
            component_type: "TestProcessor".to_string(),
            ..LambdaOptions::default()
        };
        assert_eq!(chained, updated);
    }

    #[test]
    fn partial_document_fills_defaults() {
        let opts: LambdaOptions =
            serde_json::from_str(r#"{"retries": 3, "component_type": "Processor"}"#).unwrap();
        assert_eq!(opts.retries, 3);
        assert_eq!(opts.component_type, "Processor");
        assert_eq!(opts.timeout, Duration::from_secs(30));
        assert_eq!(opts.concurrency, 10);
    }
}
