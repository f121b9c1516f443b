//! `tower::Service` adapters.
//!
//! A [`Chain`] or [`Lambda`] can sit at the bottom of a
//! `tower::ServiceBuilder` stack. Each call runs under a fresh
//! [`InvokeContext::background`] scope; wrap the service in tower's own
//! timeout or load-shed layers to bound it from the outside.

use std::task::{Context, Poll};

use futures_util::FutureExt;
use tower::Service;

use crate::context::InvokeContext;
use crate::error::LambdaError;
use crate::lambda::Lambda;
use crate::middleware::{BoxResultFuture, Chain};

impl<I, O> Service<I> for Chain<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    type Response = O;
    type Error = LambdaError;
    type Future = BoxResultFuture<O>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, input: I) -> Self::Future {
        (self.as_fn())(InvokeContext::background(), input)
    }
}

impl<I, O> Service<I> for Lambda<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    type Response = O;
    type Error = LambdaError;
    type Future = BoxResultFuture<O>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    /// Goes through [`Lambda::invoke`], so options and statistics apply.
    fn call(&mut self, input: I) -> Self::Future {
        let unit = self.clone();
        async move { unit.call(InvokeContext::background(), input).await }.boxed()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
