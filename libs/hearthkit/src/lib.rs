//! # Hearthkit - module kernel
//!
//! The runtime skeleton that boots a set of independently developed modules,
//! wires them together through a typed service registry, drives them through
//! a strict lifecycle, and keeps provider endpoints healthy under failure.
//!
//! ## Capability detection
//!
//! Modules implement [`ModuleInstance`] and optionally satisfy any of six
//! capabilities (`Configurable`, `Provisioner`, `Validator`, `Starter`,
//! `Stopper`, `Reloader`) by overriding the matching `as_*` accessor. There is
//! no class hierarchy: a module that only needs to start a background task
//! overrides `as_starter` and leaves the rest at their `None` default.
//!
//! ## Basic module example
//!
//! ```rust,ignore
//! use hearthkit::{register_module, ModuleDescriptor, ModuleInstance};
//!
//! #[derive(Default)]
//! pub struct PingModule;
//!
//! impl ModuleInstance for PingModule {
//!     fn as_any(&self) -> &dyn std::any::Any {
//!         self
//!     }
//! }
//!
//! register_module!("demo.ping", PingModule);
//! ```

pub use anyhow::Result;
pub use async_trait::async_trait;
pub use inventory;

pub mod contracts;
pub use contracts::{
    Configurable, ModuleInstance, Provisioner, Reloader, Starter, Stopper, Validator,
};

pub mod registry;
pub use registry::{ModuleDescriptor, ModuleId, Registry, RegistryError, Registrator};

pub mod context;
pub use context::{AppContext, ContextError};

pub mod runtime;
pub use runtime::lifecycle::{LifecycleCoordinator, LifecycleError};

pub mod chain;
pub use chain::{AuthProfile, Chain, ChainError, ChainEntry, HealthState, HealthTracker, Role};

pub mod config;
pub use config::{Config, ConfigPipeline, ConfigPipelineError};

pub mod reload;
pub use reload::{ReloadHandler, Watcher, WatcherEvent};
