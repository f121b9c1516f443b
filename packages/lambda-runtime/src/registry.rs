//! Named units per input/output type pair.
//!
//! A [`Registry<I, O>`] holds the units of one type pair behind one
//! read/write lock. A [`RegistrySet`] maps each `(TypeId<I>, TypeId<O>)` pair
//! to its own registry, so the same name can be used under different type
//! pairs and contention on one pair never blocks another.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

use dashmap::DashMap;
use parking_lot::RwLock;

use minilambda_core::{InvokeContext, Lambda, LambdaError, LambdaMeta, LambdaOptions};

type Constructor<I, O> = Arc<dyn Fn() -> Lambda<I, O> + Send + Sync>;

struct Entries<I, O> {
    lambdas: HashMap<String, Lambda<I, O>>,
    constructors: HashMap<String, Constructor<I, O>>,
    meta: HashMap<String, LambdaMeta>,
}

impl<I, O> Default for Entries<I, O> {
    fn default() -> Self {
        Self {
            lambdas: HashMap::new(),
            constructors: HashMap::new(),
            meta: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Units taking `I` and producing `O`, keyed by name.
pub struct Registry<I, O> {
    entries: RwLock<Entries<I, O>>,
}

impl<I, O> Registry<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
        }
    }

    /// Adds a unit under its own name and records its metadata.
    ///
    /// # Errors
    ///
    /// Returns [`LambdaError::AlreadyRegistered`] if a unit with that name
    /// exists; the registry is left unchanged.
    pub fn register(&self, lambda: Lambda<I, O>) -> Result<(), LambdaError> {
        let mut entries = self.entries.write();
        let name = lambda.name().to_string();
        if entries.lambdas.contains_key(&name) {
            return Err(LambdaError::AlreadyRegistered { name });
        }
        let meta = LambdaMeta {
            registered_at: SystemTime::now(),
            ..lambda.meta()
        };
        entries.meta.insert(name.clone(), meta);
        entries.lambdas.insert(name.clone(), lambda);
        tracing::debug!(lambda = %name, "registered");
        Ok(())
    }

    /// Stores a factory to be materialized by [`Registry::build`].
    ///
    /// Replaces any factory previously stored under `name`.
    pub fn register_with_constructor<F>(&self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Lambda<I, O> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(lambda = %name, "constructor registered");
        self.entries
            .write()
            .constructors
            .insert(name, Arc::new(constructor));
    }

    /// The unit registered under `name`. Never runs a constructor.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Lambda<I, O>> {
        self.entries.read().lambdas.get(name).cloned()
    }

    /// Runs the factory stored under `name`, registers the unit it produced
    /// and returns it.
    ///
    /// The factory runs without the registry lock held.
    ///
    /// # Errors
    ///
    /// [`LambdaError::ConstructorNotFound`] without a factory, or
    /// [`LambdaError::AlreadyRegistered`] if the built unit's name is taken.
    pub fn build(&self, name: &str) -> Result<Lambda<I, O>, LambdaError> {
        let constructor = self
            .entries
            .read()
            .constructors
            .get(name)
            .cloned()
            .ok_or_else(|| LambdaError::ConstructorNotFound {
                name: name.to_string(),
            })?;

        let lambda = constructor();
        self.register(lambda.clone())?;
        Ok(lambda)
    }

    /// Registered names plus factory names not yet built. Unordered.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let entries = self.entries.read();
        entries
            .lambdas
            .keys()
            .chain(
                entries
                    .constructors
                    .keys()
                    .filter(|name| !entries.lambdas.contains_key(*name)),
            )
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn meta(&self, name: &str) -> Option<LambdaMeta> {
        self.entries.read().meta.get(name).cloned()
    }

    /// Metadata of every registered unit, keyed by name.
    #[must_use]
    pub fn all_meta(&self) -> HashMap<String, LambdaMeta> {
        self.entries.read().meta.clone()
    }

    /// Number of distinct names, as returned by [`Registry::list`].
    #[must_use]
    pub fn count(&self) -> usize {
        let entries = self.entries.read();
        entries.lambdas.len()
            + entries
                .constructors
                .keys()
                .filter(|name| !entries.lambdas.contains_key(*name))
                .count()
    }

    /// Removes the unit registered under `name`, or failing that the factory.
    /// Returns whether anything was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let mut entries = self.entries.write();
        if entries.lambdas.remove(name).is_some() {
            entries.meta.remove(name);
            tracing::debug!(lambda = %name, "unregistered");
            return true;
        }
        entries.constructors.remove(name).is_some()
    }

    pub fn clear(&self) {
        *self.entries.write() = Entries::default();
    }
}

impl<I, O> Default for Registry<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// RegistrySet
// ---------------------------------------------------------------------------

type PairKey = (TypeId, TypeId);

/// One [`Registry`] per input/output type pair, created on first use.
///
/// Pass a `RegistrySet` explicitly to invokers and bootstrap code, or use the
/// process-wide [`RegistrySet::global`] instance.
#[derive(Default)]
pub struct RegistrySet {
    registries: DashMap<PairKey, Arc<dyn Any + Send + Sync>>,
}

impl RegistrySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide set. Created on first call and never dropped.
    #[must_use]
    pub fn global() -> &'static RegistrySet {
        static GLOBAL: OnceLock<RegistrySet> = OnceLock::new();
        GLOBAL.get_or_init(RegistrySet::new)
    }

    /// The registry for `I -> O`, created empty if absent.
    #[must_use]
    pub fn registry<I, O>(&self) -> Arc<Registry<I, O>>
    where
        I: Clone + Send + Sync + 'static,
        O: Send + 'static,
    {
        let key = (TypeId::of::<I>(), TypeId::of::<O>());
        let erased = self
            .registries
            .entry(key)
            .or_insert_with(|| Arc::new(Registry::<I, O>::new()) as Arc<dyn Any + Send + Sync>)
            .value()
            .clone();
        match erased.downcast::<Registry<I, O>>() {
            Ok(registry) => registry,
            // Keyed by the same TypeIds it was created with; a mismatch would
            // mean a corrupted map. Fall back to a detached registry.
            Err(_) => {
                tracing::error!(
                    input = std::any::type_name::<I>(),
                    output = std::any::type_name::<O>(),
                    "registry type mismatch"
                );
                Arc::new(Registry::new())
            }
        }
    }

    /// Number of type pairs with a registry.
    #[must_use]
    pub fn type_pairs(&self) -> usize {
        self.registries.len()
    }

    /// Builds a unit from `f` and registers it under `I -> O`.
    ///
    /// # Errors
    ///
    /// Returns [`LambdaError::AlreadyRegistered`] on a name collision within
    /// the type pair.
    pub fn register_lambda<I, O, E, F, Fut>(
        &self,
        name: impl Into<String>,
        f: F,
        options: LambdaOptions,
    ) -> Result<(), LambdaError>
    where
        I: Clone + Send + Sync + 'static,
        O: Send + 'static,
        F: Fn(InvokeContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        E: Into<LambdaError>,
    {
        self.registry::<I, O>().register(Lambda::new(name, f, options))
    }

    /// Looks up a unit under `I -> O`.
    #[must_use]
    pub fn get<I, O>(&self, name: &str) -> Option<Lambda<I, O>>
    where
        I: Clone + Send + Sync + 'static,
        O: Send + 'static,
    {
        self.registry::<I, O>().get(name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
