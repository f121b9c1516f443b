//! Deferred registration closures run once at startup.

use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::registry::RegistrySet;

type Registration = Box<dyn FnOnce(&RegistrySet) -> anyhow::Result<()> + Send>;

/// An append-only list of registration closures.
///
/// Closures may be added at any time; [`Bootstrap::run_all`] drains the list
/// and runs each one exactly once, in the order they were added. Closures
/// added afterwards wait for the next `run_all`.
#[derive(Default)]
pub struct Bootstrap {
    pending: Mutex<Vec<Registration>>,
}

impl Bootstrap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide list, paired with [`RegistrySet::global`].
    #[must_use]
    pub fn global() -> &'static Bootstrap {
        static GLOBAL: OnceLock<Bootstrap> = OnceLock::new();
        GLOBAL.get_or_init(Bootstrap::new)
    }

    pub fn add<F>(&self, registration: F)
    where
        F: FnOnce(&RegistrySet) -> anyhow::Result<()> + Send + 'static,
    {
        self.pending.lock().push(Box::new(registration));
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Runs every pending closure against `registries`.
    ///
    /// A failing closure does not stop the rest. Failures are logged and
    /// returned in run order.
    pub fn run_all(&self, registries: &RegistrySet) -> Vec<anyhow::Error> {
        let pending = std::mem::take(&mut *self.pending.lock());
        let total = pending.len();
        let failures: Vec<anyhow::Error> = pending
            .into_iter()
            .enumerate()
            .filter_map(|(index, registration)| {
                registration(registries)
                    .inspect_err(|err| tracing::warn!(index, error = %err, "bootstrap registration failed"))
                    .err()
            })
            .collect();
        tracing::info!(total, failed = failures.len(), "bootstrap complete");
        failures
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use minilambda_core::{InvokeContext, LambdaError, LambdaOptions};

    use super::*;

    #[tokio::test]
    async fn runs_in_order_once() {
        let order: Arc<Mutex<Vec<u32>>> = Arc::default();
        let bootstrap = Bootstrap::new();
        for i in 0..3 {
            let order = order.clone();
            bootstrap.add(move |_set| {
                order.lock().push(i);
                Ok(())
            });
        }
        assert_eq!(bootstrap.pending(), 3);

        let set = RegistrySet::new();
        assert!(bootstrap.run_all(&set).is_empty());
        assert!(bootstrap.run_all(&set).is_empty());
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert_eq!(bootstrap.pending(), 0);
    }

    #[tokio::test]
    async fn failures_do_not_stop_later_registrations() {
        let bootstrap = Bootstrap::new();
        let register = |set: &RegistrySet| -> anyhow::Result<()> {
            set.register_lambda(
                "math_double",
                |_ctx, x: i32| async move { Ok::<_, LambdaError>(x * 2) },
                LambdaOptions::default(),
            )?;
            Ok(())
        };
        bootstrap.add(register);
        bootstrap.add(register);
        bootstrap.add(|set| {
            set.register_lambda(
                "math_square",
                |_ctx, x: i32| async move { Ok::<_, LambdaError>(x * x) },
                LambdaOptions::default(),
            )?;
            Ok(())
        });

        let set = RegistrySet::new();
        let failures = bootstrap.run_all(&set);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].to_string(), "lambda 'math_double' already registered");

        let square = set.get::<i32, i32>("math_square").unwrap();
        assert_eq!(square.call(InvokeContext::background(), 7).await.unwrap(), 49);
    }
}
