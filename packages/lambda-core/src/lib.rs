//! `minilambda` core: units, call context, middleware chain and built-in middleware.

pub mod backoff;
pub mod context;
pub mod error;
pub mod lambda;
pub mod middleware;
pub mod options;
pub mod result;
pub mod service;
pub mod stats;

pub use backoff::Backoff;
pub use context::InvokeContext;
pub use error::LambdaError;
pub use lambda::{Lambda, LambdaMeta};
pub use middleware::{from_fn, invoke_fn, BoxResultFuture, Chain, InvokeFn, Middleware, Next};
pub use options::LambdaOptions;
pub use result::LambdaResult;
pub use stats::{InvocationStats, StatsHandle};
