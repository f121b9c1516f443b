//! Chain composition: wraps a terminal function in an ordered list of middleware.

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;

use super::{invoke_fn, BoxResultFuture, InvokeFn, Middleware, Next};
use crate::context::InvokeContext;
use crate::error::LambdaError;

/// An ordered list of middleware around one terminal function.
///
/// Middleware at index 0 runs first on the way in and last on the way out.
/// The terminal function runs only if every middleware on the path calls
/// `next`. A chain is immutable: [`Chain::layer`] returns a new chain and the
/// original keeps its behavior.
pub struct Chain<I, O> {
    middlewares: Vec<Arc<dyn Middleware<I, O>>>,
    terminal: InvokeFn<I, O>,
    /// `middlewares` folded around `terminal`, built once per chain.
    composed: InvokeFn<I, O>,
}

impl<I, O> Chain<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// A chain with no middleware around `terminal`.
    #[must_use]
    pub fn new(terminal: InvokeFn<I, O>) -> Self {
        Self::with_middlewares(terminal, Vec::new())
    }

    /// A chain around an async function.
    #[must_use]
    pub fn from_fn<E, F, Fut>(f: F) -> Self
    where
        F: Fn(InvokeContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        E: Into<LambdaError>,
    {
        Self::new(invoke_fn(f))
    }

    fn with_middlewares(terminal: InvokeFn<I, O>, middlewares: Vec<Arc<dyn Middleware<I, O>>>) -> Self {
        let composed = compose(&terminal, &middlewares);
        Self {
            middlewares,
            terminal,
            composed,
        }
    }

    /// Returns a new chain with `middleware` appended innermost.
    #[must_use]
    pub fn layer<M>(&self, middleware: M) -> Self
    where
        M: Middleware<I, O>,
    {
        self.layer_arc(Arc::new(middleware))
    }

    /// Like [`Chain::layer`] for an already shared middleware instance.
    #[must_use]
    pub fn layer_arc(&self, middleware: Arc<dyn Middleware<I, O>>) -> Self {
        self.extend(std::iter::once(middleware))
    }

    /// Returns a new chain with every middleware of `iter` appended, in order.
    #[must_use]
    pub fn extend<T>(&self, iter: T) -> Self
    where
        T: IntoIterator<Item = Arc<dyn Middleware<I, O>>>,
    {
        let mut middlewares = self.middlewares.clone();
        middlewares.extend(iter);
        Self::with_middlewares(Arc::clone(&self.terminal), middlewares)
    }

    /// Runs the chain.
    ///
    /// # Errors
    ///
    /// Returns whatever error the first failing stage produced.
    pub async fn execute(&self, ctx: InvokeContext, input: I) -> Result<O, LambdaError> {
        (self.composed)(ctx, input).await
    }

    /// The chain as a single callable.
    #[must_use]
    pub fn as_fn(&self) -> InvokeFn<I, O> {
        Arc::clone(&self.composed)
    }
}

impl<I, O> Chain<I, O> {
    /// Number of middleware stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

impl<I, O> Clone for Chain<I, O> {
    fn clone(&self) -> Self {
        Self {
            middlewares: self.middlewares.clone(),
            terminal: Arc::clone(&self.terminal),
            composed: Arc::clone(&self.composed),
        }
    }
}

/// Folds right to left: the terminal function is innermost and each
/// middleware wraps everything registered after it.
fn compose<I, O>(terminal: &InvokeFn<I, O>, middlewares: &[Arc<dyn Middleware<I, O>>]) -> InvokeFn<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    middlewares
        .iter()
        .rev()
        .fold(Arc::clone(terminal), |inner, middleware| {
            let middleware = Arc::clone(middleware);
            let next = Next::new(inner);
            let wrapped: InvokeFn<I, O> = Arc::new(move |ctx: InvokeContext, input: I| -> BoxResultFuture<O> {
                let middleware = Arc::clone(&middleware);
                let next = next.clone();
                async move { middleware.handle(ctx, input, next).await }.boxed()
            });
            wrapped
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
