//! Output caching middleware.
//!
//! [`CacheOutput`] is storage-agnostic: it takes a get/set pair. [`MemoryCache`]
//! is a bounded in-memory store (backed by `quick_cache`) that supplies one.

use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Middleware, Next};
use crate::context::InvokeContext;
use crate::error::LambdaError;

type Getter<I, O> = Arc<dyn Fn(&I) -> Option<O> + Send + Sync>;
type Setter<I, O> = Arc<dyn Fn(I, O) + Send + Sync>;

/// Returns a cached output for the input when present; otherwise runs the
/// rest of the chain and stores successful outputs. Failures are not cached.
pub struct CacheOutput<I, O> {
    get: Getter<I, O>,
    set: Setter<I, O>,
}

impl<I, O> CacheOutput<I, O> {
    pub fn new<G, S>(get: G, set: S) -> Self
    where
        G: Fn(&I) -> Option<O> + Send + Sync + 'static,
        S: Fn(I, O) + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            set: Arc::new(set),
        }
    }
}

#[async_trait]
impl<I, O> Middleware<I, O> for CacheOutput<I, O>
where
    I: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    async fn handle(&self, ctx: InvokeContext, input: I, next: Next<I, O>) -> Result<O, LambdaError> {
        if let Some(cached) = (self.get)(&input) {
            tracing::trace!("cache hit");
            return Ok(cached);
        }
        let output = next.run(ctx, input.clone()).await?;
        (self.set)(input, output.clone());
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// MemoryCache
// ---------------------------------------------------------------------------

/// Bounded in-memory output cache.
pub struct MemoryCache<I, O> {
    inner: Arc<quick_cache::sync::Cache<I, O>>,
}

impl<I, O> MemoryCache<I, O>
where
    I: Eq + Hash + Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    /// Creates a cache holding at most roughly `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(quick_cache::sync::Cache::new(capacity)),
        }
    }

    #[must_use]
    pub fn get(&self, input: &I) -> Option<O> {
        self.inner.get(input)
    }

    pub fn insert(&self, input: I, output: O) {
        self.inner.insert(input, output);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// A [`CacheOutput`] middleware reading from and writing to this cache.
    #[must_use]
    pub fn middleware(&self) -> CacheOutput<I, O> {
        let reader = Arc::clone(&self.inner);
        let writer = Arc::clone(&self.inner);
        CacheOutput::new(
            move |input: &I| reader.get(input),
            move |input: I, output: O| writer.insert(input, output),
        )
    }
}

impl<I, O> Clone for MemoryCache<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
