//! The scoped context handed to every module.
//!
//! Copy-on-derive, immutable after construction, cheap to clone (everything
//! large sits behind an `Arc`). `for_module` and `with_module_configs` never
//! mutate the receiver — they return a derived copy.
//!
//! The service registry is a string-name-keyed map from service name
//! (`memory.history`, `provider.chain`, ...) to `Arc<dyn Any + Send + Sync>`,
//! downcasting to the caller's requested type at `service::<T>()`.

use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::Span;

use crate::contracts::ModuleInstance;
use crate::registry::{ModuleId, RegistryError, SharedRegistry};

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("service '{0}' is not registered")]
    ServiceNotFound(String),
    #[error("service '{0}' was registered with a different type")]
    ServiceTypeMismatch(String),
    #[error("failed to deserialize configuration for module '{0}': {1}")]
    ConfigInvalid(ModuleId, serde_json::Error),
    #[error("module '{id}' failed to configure")]
    ConfigureFailed {
        id: ModuleId,
        #[source]
        source: anyhow::Error,
    },
    #[error("module '{id}' failed to provision")]
    ProvisionFailed {
        id: ModuleId,
        #[source]
        source: anyhow::Error,
    },
    #[error("module '{id}' failed to validate")]
    ValidateFailed {
        id: ModuleId,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

type ServiceMap = HashMap<String, Arc<dyn Any + Send + Sync>>;

#[derive(Clone)]
pub struct AppContext {
    /// The context's original logger, kept unscoped so repeated `for_module`
    /// calls down a chain of derived contexts do not accumulate fields.
    root_span: Span,
    span: Span,
    data_dir: Arc<PathBuf>,
    workspace: Arc<PathBuf>,
    module_configs: Arc<HashMap<ModuleId, serde_json::Value>>,
    services: Arc<RwLock<ServiceMap>>,
    registry: SharedRegistry,
}

impl AppContext {
    pub fn new(logger: Span, data_dir: impl Into<PathBuf>, workspace: impl Into<PathBuf>, registry: SharedRegistry) -> Self {
        Self {
            root_span: logger.clone(),
            span: logger,
            data_dir: Arc::new(data_dir.into()),
            workspace: Arc::new(workspace.into()),
            module_configs: Arc::new(HashMap::new()),
            services: Arc::new(RwLock::new(HashMap::new())),
            registry,
        }
    }

    pub fn logger(&self) -> &Span {
        &self.span
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Returns a derived context carrying the given per-module raw config map.
    pub fn with_module_configs(&self, module_configs: HashMap<ModuleId, serde_json::Value>) -> Self {
        Self {
            module_configs: Arc::new(module_configs),
            ..self.clone()
        }
    }

    /// Returns a context scoped to `id`: its logger gains a `module` field
    /// derived from the root logger, never from the caller's current scope.
    pub fn for_module(&self, id: &str) -> Self {
        let span = tracing::info_span!(parent: &self.root_span, "module", module = %id);
        Self {
            span,
            ..self.clone()
        }
    }

    /// Deserializes this context's configuration for `id` into `T`, falling
    /// back to `T::default()` if no raw config was provided for that id.
    pub fn config_for<T: DeserializeOwned + Default>(&self, id: &str) -> Result<T, ContextError> {
        match self.module_configs.get(id) {
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|e| ContextError::ConfigInvalid(id.to_string(), e)),
            None => Ok(T::default()),
        }
    }

    pub fn raw_config_for(&self, id: &str) -> Option<&serde_json::Value> {
        self.module_configs.get(id)
    }

    pub fn register_service<T: Any + Send + Sync>(&self, name: impl Into<String>, value: Arc<T>) {
        self.services.write().insert(name.into(), value);
    }

    pub fn service<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, ContextError> {
        let guard = self.services.read();
        let boxed = guard
            .get(name)
            .ok_or_else(|| ContextError::ServiceNotFound(name.to_string()))?;
        boxed
            .clone()
            .downcast::<T>()
            .map_err(|_| ContextError::ServiceTypeMismatch(name.to_string()))
    }

    pub fn try_service<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.service::<T>(name).ok()
    }

    /// Runs the Configure -> Provision -> Validate sequence on a fresh
    /// instance of `id`, returning the built instance on success.
    pub async fn load_module(&self, id: &str) -> Result<Box<dyn ModuleInstance>, ContextError> {
        let instance = self.registry.instantiate(id)?;

        if let Some(configurable) = instance.as_configurable() {
            if let Some(raw) = self.raw_config_for(id) {
                configurable
                    .configure(raw)
                    .map_err(|source| ContextError::ConfigureFailed { id: id.to_string(), source })?;
            }
        }

        if let Some(provisioner) = instance.as_provisioner() {
            let scoped = self.for_module(id);
            provisioner
                .provision(&scoped)
                .await
                .map_err(|source| ContextError::ProvisionFailed { id: id.to_string(), source })?;
        }

        if let Some(validator) = instance.as_validator() {
            validator
                .validate()
                .map_err(|source| ContextError::ValidateFailed { id: id.to_string(), source })?;
        }

        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use std::sync::Arc as StdArc;

    fn ctx() -> AppContext {
        AppContext::new(
            tracing::Span::none(),
            PathBuf::from("/tmp/data"),
            PathBuf::from("/tmp/workspace"),
            StdArc::new(Registry::new()),
        )
    }

    #[test]
    fn service_round_trip() {
        let c = ctx();
        c.register_service("memory.history", StdArc::new(42u32));
        let value = c.service::<u32>("memory.history").unwrap();
        assert_eq!(*value, 42);
    }

    #[test]
    fn missing_service_errors() {
        let c = ctx();
        let err = c.service::<u32>("missing").unwrap_err();
        assert!(matches!(err, ContextError::ServiceNotFound(_)));
    }

    #[test]
    fn type_mismatch_errors() {
        let c = ctx();
        c.register_service("x", StdArc::new(42u32));
        let err = c.service::<String>("x").unwrap_err();
        assert!(matches!(err, ContextError::ServiceTypeMismatch(_)));
    }

    #[test]
    fn with_module_configs_does_not_mutate_receiver() {
        let c = ctx();
        let mut configs = HashMap::new();
        configs.insert("a.one".to_string(), serde_json::json!({"x": 1}));
        let derived = c.with_module_configs(configs);
        assert!(c.raw_config_for("a.one").is_none());
        assert!(derived.raw_config_for("a.one").is_some());
    }

    #[test]
    fn for_module_scopes_from_root_not_current_scope() {
        let c = ctx();
        let once = c.for_module("a.one");
        let twice = once.for_module("b.two");
        // Both derive from the same root; neither panics nor accumulates -
        // this is a smoke test that scoping twice is safe and cheap.
        let _ = (once.logger(), twice.logger());
    }
}
