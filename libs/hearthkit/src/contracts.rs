//! Module capability traits.
//!
//! A module is anything implementing [`ModuleInstance`]. Capabilities are
//! optional facets detected at runtime through the `as_*` accessors, mirroring
//! how a system module announces itself in the older generation of this
//! kernel (`Module::as_system_module() -> Option<&dyn SystemModule>`):
//! default to `None`, override to opt in.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// Base trait every module implements.
pub trait ModuleInstance: Send + Sync {
    fn as_any(&self) -> &dyn std::any::Any;

    fn as_configurable(&self) -> Option<&dyn Configurable> {
        None
    }
    fn as_provisioner(&self) -> Option<&dyn Provisioner> {
        None
    }
    fn as_validator(&self) -> Option<&dyn Validator> {
        None
    }
    fn as_starter(&self) -> Option<&dyn Starter> {
        None
    }
    fn as_stopper(&self) -> Option<&dyn Stopper> {
        None
    }
    fn as_reloader(&self) -> Option<&dyn Reloader> {
        None
    }
}

/// Deserializes the module's own raw config node. Runs first in `load_module`.
pub trait Configurable: Send + Sync {
    fn configure(&self, raw: &serde_json::Value) -> anyhow::Result<()>;
}

/// Acquires resources and publishes services into the context. Runs after Configure.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, ctx: &AppContext) -> anyhow::Result<()>;
}

/// Checks invariants that can only be verified once configured and provisioned.
pub trait Validator: Send + Sync {
    fn validate(&self) -> anyhow::Result<()>;
}

/// Starts background work. Invoked in load order once all modules are loaded.
#[async_trait]
pub trait Starter: Send + Sync {
    async fn start(&self, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// Stops background work. Invoked in reverse start order, best-effort.
#[async_trait]
pub trait Stopper: Send + Sync {
    async fn stop(&self, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// Re-applies a freshly validated configuration without a restart.
#[async_trait]
pub trait Reloader: Send + Sync {
    async fn reload(&self, ctx: &AppContext) -> anyhow::Result<()>;
}
