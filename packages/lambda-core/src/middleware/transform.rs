//! Input and output mapping middleware.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Middleware, Next};
use crate::context::InvokeContext;
use crate::error::LambdaError;

/// Maps the input before the rest of the chain runs. A mapping error
/// short-circuits with [`LambdaError::InputTransform`].
pub struct TransformInput<I> {
    transform: Arc<dyn Fn(I) -> anyhow::Result<I> + Send + Sync>,
}

impl<I> TransformInput<I> {
    pub fn new<F>(transform: F) -> Self
    where
        F: Fn(I) -> anyhow::Result<I> + Send + Sync + 'static,
    {
        Self {
            transform: Arc::new(transform),
        }
    }
}

#[async_trait]
impl<I, O> Middleware<I, O> for TransformInput<I>
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn handle(&self, ctx: InvokeContext, input: I, next: Next<I, O>) -> Result<O, LambdaError> {
        let mapped = (self.transform)(input).map_err(LambdaError::InputTransform)?;
        next.run(ctx, mapped).await
    }
}

/// Maps a successful output. Errors from the rest of the chain pass through
/// unmapped; a mapping error replaces the output with
/// [`LambdaError::OutputTransform`].
pub struct TransformOutput<O> {
    transform: Arc<dyn Fn(O) -> anyhow::Result<O> + Send + Sync>,
}

impl<O> TransformOutput<O> {
    pub fn new<F>(transform: F) -> Self
    where
        F: Fn(O) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        Self {
            transform: Arc::new(transform),
        }
    }
}

#[async_trait]
impl<I, O> Middleware<I, O> for TransformOutput<O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn handle(&self, ctx: InvokeContext, input: I, next: Next<I, O>) -> Result<O, LambdaError> {
        let output = next.run(ctx, input).await?;
        (self.transform)(output).map_err(LambdaError::OutputTransform)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::middleware::Chain;

    fn reverse() -> Chain<String, String> {
        Chain::from_fn(|_ctx, s: String| async move {
            Ok::<_, LambdaError>(s.chars().rev().collect::<String>())
        })
    }

    #[tokio::test]
    async fn maps_input_and_output() {
        let chain = reverse()
            .layer(TransformInput::new(|s: String| Ok(s.trim().to_string())))
            .layer(TransformOutput::new(|s: String| Ok(s.to_uppercase())));

        let out = chain
            .execute(InvokeContext::background(), "  abc ".to_string())
            .await
            .unwrap();
        assert_eq!(out, "CBA");
    }

    #[tokio::test]
    async fn input_error_short_circuits() {
        let calls = std::sync::Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let chain = Chain::from_fn(move |_ctx, x: i32| {
            counted.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, LambdaError>(x) }
        })
        .layer(TransformInput::new(|x: i32| {
            u8::try_from(x).map(i32::from).map_err(anyhow::Error::from)
        }));

        let err = chain.execute(InvokeContext::background(), 1000).await.unwrap_err();
        assert!(matches!(err, LambdaError::InputTransform(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn output_error_discards_output() {
        let chain = reverse().layer(TransformOutput::new(|s: String| {
            if s.is_empty() {
                anyhow::bail!("empty output");
            }
            Ok(s)
        }));

        let err = chain
            .execute(InvokeContext::background(), String::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "output transformation failed: empty output");
    }

    #[tokio::test]
    async fn upstream_error_skips_output_transform() {
        let mapped = std::sync::Arc::new(AtomicU32::new(0));
        let counted = mapped.clone();
        let chain = Chain::from_fn(|_ctx, _x: i32| async move { Err::<i32, _>(anyhow::anyhow!("down")) })
            .layer(TransformOutput::new(move |x: i32| {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(x)
            }));

        let err = chain.execute(InvokeContext::background(), 1).await.unwrap_err();
        assert_eq!(err.to_string(), "down");
        assert_eq!(mapped.load(Ordering::SeqCst), 0);
    }
}
