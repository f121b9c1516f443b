//! `minilambda` runtime: typed registries, the invoker and startup registration.
//!
//! Re-exports the core crate, so `minilambda::Lambda`, `minilambda::middleware`
//! and friends are available from here.

pub mod bootstrap;
pub mod config;
pub mod invoker;
pub mod registry;

pub use bootstrap::Bootstrap;
pub use config::InvokerConfig;
pub use invoker::{Invoker, PipelineError};
pub use registry::{Registry, RegistrySet};

pub use minilambda_core::*;

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
