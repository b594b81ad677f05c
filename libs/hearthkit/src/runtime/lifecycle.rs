//! Phase-based module lifecycle, grounded on the older `HostRuntime`'s
//! `run_init_phase`/`run_start_phase`/`run_stop_phase` sequencing, trimmed of
//! the DB/REST/gRPC phases that have no place in this kernel, and extended
//! with rollback on both Load and Start failure (the older runtime only
//! rolled back on the stop phase).

use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::context::{AppContext, ContextError};
use crate::contracts::ModuleInstance;
use crate::registry::ModuleId;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Load(#[from] ContextError),
    #[error("module '{id}' failed to start")]
    StartFailed {
        id: ModuleId,
        #[source]
        source: anyhow::Error,
    },
    #[error("reload failed for module(s): {}", .0.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>().join(", "))]
    ReloadFailed(Vec<(ModuleId, anyhow::Error)>),
}

struct LoadedEntry {
    id: ModuleId,
    instance: Box<dyn ModuleInstance>,
    started: bool,
}

/// Owns the ordered list of loaded module instances and drives them through
/// Load -> Start -> Stop, with compensating rollback on failure.
pub struct LifecycleCoordinator {
    ctx: AppContext,
    loaded: Vec<LoadedEntry>,
}

impl LifecycleCoordinator {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx,
            loaded: Vec::new(),
        }
    }

    pub fn loaded_ids(&self) -> Vec<ModuleId> {
        self.loaded.iter().map(|e| e.id.clone()).collect()
    }

    /// Loads modules in the given order. On failure, already-loaded modules
    /// are rolled back (stopped, best-effort, reverse order) before the
    /// error is returned.
    pub async fn load(&mut self, ids: &[ModuleId]) -> Result<(), LifecycleError> {
        for id in ids {
            match self.ctx.load_module(id).await {
                Ok(instance) => self.loaded.push(LoadedEntry {
                    id: id.clone(),
                    instance,
                    started: false,
                }),
                Err(err) => {
                    let range = 0..self.loaded.len();
                    self.stop_range(range, &CancellationToken::new(), true).await;
                    self.loaded.clear();
                    return Err(LifecycleError::Load(err));
                }
            }
        }
        Ok(())
    }

    /// Starts loaded modules in load order. On failure at index k, modules
    /// `[0, k)` are stopped in reverse order before the error is returned.
    pub async fn start(&mut self, cancel: &CancellationToken) -> Result<(), LifecycleError> {
        for idx in 0..self.loaded.len() {
            let result = {
                let entry = &self.loaded[idx];
                match entry.instance.as_starter() {
                    Some(starter) => Some(starter.start(cancel.clone()).await),
                    None => None,
                }
            };

            match result {
                Some(Err(source)) => {
                    let id = self.loaded[idx].id.clone();
                    self.stop_range(0..idx, cancel, false).await;
                    return Err(LifecycleError::StartFailed { id, source });
                }
                _ => self.loaded[idx].started = true,
            }
        }
        Ok(())
    }

    /// Stops all loaded modules in reverse order. Idempotent: only modules
    /// whose `started` flag is set are visited. Every error is logged, never
    /// propagated, because shutdown must be best-effort.
    pub async fn stop(&mut self, cancel: &CancellationToken) {
        let range = 0..self.loaded.len();
        self.stop_range(range, cancel, false).await;
    }

    /// Stops every entry in `range`, in reverse order. `ignore_started`
    /// bypasses the `started` guard: Load-failure rollback must invoke Stop
    /// on modules that were loaded but never reached Start, while an
    /// ordinary Start-failure or shutdown stop only touches modules that
    /// actually started.
    async fn stop_range(&mut self, range: std::ops::Range<usize>, cancel: &CancellationToken, ignore_started: bool) {
        for idx in range.rev() {
            let entry = &mut self.loaded[idx];
            if !ignore_started && !entry.started {
                continue;
            }
            if let Some(stopper) = entry.instance.as_stopper() {
                match timeout(SHUTDOWN_TIMEOUT, stopper.stop(cancel.clone())).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        tracing::warn!(module = %entry.id, error = %err, "failed to stop module");
                    }
                    Err(_) => {
                        tracing::warn!(module = %entry.id, "timed out stopping module");
                    }
                }
            }
            entry.started = false;
        }
    }

    /// Re-applies configuration to every loaded module implementing Reload.
    /// `ctx` must carry the freshly validated module-config map.
    pub async fn reload(&mut self, ctx: &AppContext) -> Result<(), LifecycleError> {
        let mut errors = Vec::new();
        for entry in &self.loaded {
            if let Some(reloader) = entry.instance.as_reloader() {
                let scoped = ctx.for_module(&entry.id);
                if let Err(source) = reloader.reload(&scoped).await {
                    errors.push((entry.id.clone(), source));
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::ReloadFailed(errors))
        }
    }

    /// Starts all modules, then waits for `cancel` to fire, then stops all
    /// modules. The caller is responsible for wiring `cancel` to a signal
    /// trap (see `hearthkit_bootstrap::signals`).
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), LifecycleError> {
        self.start(&cancel).await?;
        cancel.cancelled().await;
        tracing::info!("shutdown requested, stopping modules");
        self.stop(&cancel).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{Starter, Stopper};
    use crate::registry::{ModuleDescriptor, Registry};
    use async_trait::async_trait;
    use std::sync::Arc;

    static LOG: parking_lot::Mutex<Vec<String>> = parking_lot::Mutex::new(Vec::new());

    struct LoggingModule {
        name: &'static str,
        fail_start: bool,
    }

    impl ModuleInstance for LoggingModule {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_starter(&self) -> Option<&dyn Starter> {
            Some(self)
        }
        fn as_stopper(&self) -> Option<&dyn Stopper> {
            Some(self)
        }
    }

    #[async_trait]
    impl Starter for LoggingModule {
        async fn start(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
            if self.fail_start {
                anyhow::bail!("boom");
            }
            LOG.lock().push(format!("start {}", self.name));
            Ok(())
        }
    }

    #[async_trait]
    impl Stopper for LoggingModule {
        async fn stop(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
            LOG.lock().push(format!("stop {}", self.name));
            Ok(())
        }
    }

    fn registry_of(ids: &[(&'static str, bool)]) -> Registry {
        let registry = Registry::new();
        for (id, fail_start) in ids {
            let factory: fn() -> Box<dyn ModuleInstance> = match *id {
                "a.one" => || Box::new(LoggingModule { name: "a.one", fail_start: false }),
                "b.two" => || Box::new(LoggingModule { name: "b.two", fail_start: false }),
                "c.three" if !fail_start => || Box::new(LoggingModule { name: "c.three", fail_start: false }),
                "c.three" => || Box::new(LoggingModule { name: "c.three", fail_start: true }),
                _ => unreachable!(),
            };
            registry.register(ModuleDescriptor { id: id.to_string(), factory }).unwrap();
        }
        registry
    }

    fn ctx_with(registry: Registry) -> AppContext {
        AppContext::new(
            tracing::Span::none(),
            std::env::temp_dir(),
            std::env::temp_dir(),
            Arc::new(registry),
        )
    }

    #[tokio::test]
    async fn s1_ordered_boot_and_reverse_shutdown() {
        LOG.lock().clear();
        let ctx = ctx_with(registry_of(&[("a.one", false), ("b.two", false), ("c.three", false)]));
        let mut coordinator = LifecycleCoordinator::new(ctx);
        let cancel = CancellationToken::new();

        coordinator
            .load(&["a.one".to_string(), "b.two".to_string(), "c.three".to_string()])
            .await
            .unwrap();
        coordinator.start(&cancel).await.unwrap();
        coordinator.stop(&cancel).await;

        assert_eq!(
            *LOG.lock(),
            vec![
                "start a.one", "start b.two", "start c.three",
                "stop c.three", "stop b.two", "stop a.one",
            ]
        );
    }

    #[tokio::test]
    async fn s2_start_failure_rolls_back_in_reverse() {
        LOG.lock().clear();
        let ctx = ctx_with(registry_of(&[("a.one", false), ("b.two", false), ("c.three", true)]));
        let mut coordinator = LifecycleCoordinator::new(ctx);
        let cancel = CancellationToken::new();

        coordinator
            .load(&["a.one".to_string(), "b.two".to_string(), "c.three".to_string()])
            .await
            .unwrap();
        let err = coordinator.start(&cancel).await.unwrap_err();
        assert!(matches!(err, LifecycleError::StartFailed { ref id, .. } if id == "c.three"));

        assert_eq!(
            *LOG.lock(),
            vec!["start a.one", "start b.two", "stop b.two", "stop a.one"]
        );
    }

    #[tokio::test]
    async fn load_failure_rolls_back_without_leaving_loaded_modules() {
        LOG.lock().clear();
        let registry = Registry::new();
        registry
            .register(ModuleDescriptor {
                id: "a.one".to_string(),
                factory: || Box::new(LoggingModule { name: "a.one", fail_start: false }),
            })
            .unwrap();
        let ctx = AppContext::new(
            tracing::Span::none(),
            std::env::temp_dir(),
            std::env::temp_dir(),
            Arc::new(registry),
        );
        let mut coordinator = LifecycleCoordinator::new(ctx);
        let err = coordinator
            .load(&["a.one".to_string(), "missing".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Load(_)));
        assert!(coordinator.loaded.is_empty());
        assert_eq!(*LOG.lock(), vec!["stop a.one".to_string()]);
    }
}
