//! The process-wide module registry.
//!
//! Populated once, at program start, by modules self-registering through
//! [`register_module!`] (built on `inventory::submit!`, the same mechanism the
//! older `Registrator`/`inventory::collect!` pair used). There is no
//! dependency graph here and nothing is topologically sorted: modules
//! reference each other by service name through [`crate::AppContext`], and the
//! load order is whatever the caller passes to
//! [`crate::LifecycleCoordinator::load`].

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::contracts::ModuleInstance;

/// A namespaced module identifier, e.g. `"store.sqlite"`.
pub type ModuleId = String;

/// Factory producing a fresh module instance. Must not perform side effects;
/// real work happens in `Configure`/`Provision`.
pub type ModuleFactory = fn() -> Box<dyn ModuleInstance>;

#[derive(Clone)]
pub struct ModuleDescriptor {
    pub id: ModuleId,
    pub factory: ModuleFactory,
}

impl std::fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDescriptor").field("id", &self.id).finish()
    }
}

/// The function type submitted by `register_module!` via `inventory::submit!`.
pub struct Registrator(pub fn() -> (&'static str, ModuleFactory));

inventory::collect!(Registrator);

/// Declares a module and arranges for it to be added to the global
/// [`Registry`] the first time [`Registry::discover`] runs.
#[macro_export]
macro_rules! register_module {
    ($id:expr, $ty:ty) => {
        $crate::inventory::submit! {
            $crate::registry::Registrator(|| {
                ($id, (|| -> Box<dyn $crate::ModuleInstance> { Box::<$ty>::default() }) as $crate::registry::ModuleFactory)
            })
        }
    };
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("module id must not be empty")]
    EmptyId,
    #[error("module '{0}' is registered more than once")]
    DuplicateModule(ModuleId),
    #[error("unknown module '{0}'")]
    UnknownModule(ModuleId),
}

#[derive(Default)]
pub struct Registry {
    modules: RwLock<BTreeMap<ModuleId, ModuleDescriptor>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from every module collected via [`register_module!`].
    pub fn discover() -> Result<Self, RegistryError> {
        let registry = Self::new();
        for r in inventory::iter::<Registrator> {
            let (id, factory) = r.0();
            registry.register(ModuleDescriptor {
                id: id.to_string(),
                factory,
            })?;
        }
        Ok(registry)
    }

    pub fn register(&self, descriptor: ModuleDescriptor) -> Result<(), RegistryError> {
        if descriptor.id.is_empty() {
            return Err(RegistryError::EmptyId);
        }
        let mut modules = self.modules.write();
        if modules.contains_key(&descriptor.id) {
            return Err(RegistryError::DuplicateModule(descriptor.id));
        }
        modules.insert(descriptor.id.clone(), descriptor);
        Ok(())
    }

    pub fn lookup(&self, id: &str) -> Option<ModuleDescriptor> {
        self.modules.read().get(id).cloned()
    }

    /// All descriptors, sorted ascending by id.
    pub fn all(&self) -> Vec<ModuleDescriptor> {
        self.modules.read().values().cloned().collect()
    }

    /// Descriptors whose id starts with `ns.`, sorted ascending by id.
    pub fn by_namespace(&self, ns: &str) -> Vec<ModuleDescriptor> {
        let prefix = format!("{ns}.");
        self.modules
            .read()
            .values()
            .filter(|d| d.id.starts_with(&prefix))
            .cloned()
            .collect()
    }

    pub fn instantiate(&self, id: &str) -> Result<Box<dyn ModuleInstance>, RegistryError> {
        let descriptor = self
            .lookup(id)
            .ok_or_else(|| RegistryError::UnknownModule(id.to_string()))?;
        Ok((descriptor.factory)())
    }
}

/// Convenience wrapper so callers can share one registry across threads.
pub type SharedRegistry = Arc<Registry>;
