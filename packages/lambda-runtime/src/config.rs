use serde::{Deserialize, Serialize};

/// Invoker-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokerConfig {
    /// Execution slots shared by every call through one invoker. `0` means
    /// unbounded.
    pub max_concurrency: usize,
    /// Batch size used by `Invoker::batch` when the caller passes `0`.
    /// `0` here means a single batch holding every input.
    pub default_batch_size: usize,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 0,
            default_batch_size: 16,
        }
    }
}
