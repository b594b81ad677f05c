//! Consumes watcher events and drives a config reload through the
//! lifecycle coordinator.

use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigPipeline, ConfigPipelineError};
use crate::context::AppContext;
use crate::registry::Registry;
use crate::runtime::lifecycle::{LifecycleCoordinator, LifecycleError};

use super::watcher::WatcherEvent;

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error(transparent)]
    Config(#[from] ConfigPipelineError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Bridges a [`Watcher`](super::watcher::Watcher) event stream to a running
/// [`LifecycleCoordinator`]: on every event it reloads, re-validates and
/// re-derives the context, then asks the coordinator to re-apply it to every
/// module that implements `Reloader`.
pub struct ReloadHandler {
    path: PathBuf,
    registry: std::sync::Arc<Registry>,
}

impl ReloadHandler {
    pub fn new(path: impl Into<PathBuf>, registry: std::sync::Arc<Registry>) -> Self {
        Self {
            path: path.into(),
            registry,
        }
    }

    /// Drains `events` until `cancel` fires, reloading `coordinator` on each
    /// one. A failed reload is logged and does not stop the loop - a bad edit
    /// to the config file should not kill a running process.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<WatcherEvent>,
        coordinator: &mut LifecycleCoordinator,
        base_ctx: &AppContext,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => {
                    match event {
                        Some(WatcherEvent::Modified { path }) => {
                            tracing::info!(path = %path.display(), "config changed, reloading");
                            if let Err(err) = self.reload_once(coordinator, base_ctx).await {
                                tracing::warn!(error = %err, "config reload failed, keeping previous configuration");
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    }

    pub async fn reload_once(&self, coordinator: &mut LifecycleCoordinator, base_ctx: &AppContext) -> Result<(), ReloadError> {
        let (config, _order) = ConfigPipeline::load_and_resolve(&self.path, &self.registry)?;
        let ctx = base_ctx.with_module_configs(config.modules);
        coordinator.reload(&ctx).await?;
        Ok(())
    }
}
