use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use hearthkit::{AppContext, Configurable, ModuleInstance, Provisioner, Starter, Stopper};
use parking_lot::Mutex;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::StoreConfig;
use crate::store::{SqliteFactStore, SqliteHistoryStore, MIGRATIONS};

/// The `store.sqlite` module: owns one SQLite pool and publishes
/// `memory.history` and `memory.store` services from it.
#[derive(Default)]
pub struct StoreModule {
    config: Mutex<StoreConfig>,
    pool: Mutex<Option<SqlitePool>>,
}

impl ModuleInstance for StoreModule {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_configurable(&self) -> Option<&dyn Configurable> {
        Some(self)
    }
    fn as_provisioner(&self) -> Option<&dyn Provisioner> {
        Some(self)
    }
    fn as_starter(&self) -> Option<&dyn Starter> {
        Some(self)
    }
    fn as_stopper(&self) -> Option<&dyn Stopper> {
        Some(self)
    }
}

impl Configurable for StoreModule {
    fn configure(&self, raw: &serde_json::Value) -> anyhow::Result<()> {
        let parsed: StoreConfig = serde_json::from_value(raw.clone())?;
        *self.config.lock() = parsed;
        Ok(())
    }
}

#[async_trait]
impl Provisioner for StoreModule {
    async fn provision(&self, ctx: &AppContext) -> anyhow::Result<()> {
        let config = self.config.lock().clone();
        let db_path = resolve_db_path(ctx.data_dir(), &config.path);
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let connect_opts = SqliteConnectOptions::new().filename(&db_path).create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;
        sqlx::raw_sql(MIGRATIONS).execute(&pool).await?;

        ctx.register_service("memory.history", Arc::new(SqliteHistoryStore::new(pool.clone())));
        ctx.register_service("memory.store", Arc::new(SqliteFactStore::new(pool.clone())));
        *self.pool.lock() = Some(pool);

        tracing::info!(path = %db_path.display(), "store.sqlite provisioned");
        Ok(())
    }
}

#[async_trait]
impl Starter for StoreModule {
    async fn start(&self, _cancel: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        tracing::debug!("store.sqlite started");
        Ok(())
    }
}

#[async_trait]
impl Stopper for StoreModule {
    async fn stop(&self, _cancel: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        if let Some(pool) = self.pool.lock().take() {
            pool.close().await;
        }
        Ok(())
    }
}

fn resolve_db_path(data_dir: &std::path::Path, configured_path: &str) -> PathBuf {
    let configured = PathBuf::from(configured_path);
    if configured.is_absolute() {
        configured
    } else {
        data_dir.join("store.sqlite").join(configured)
    }
}

hearthkit::register_module!("store.sqlite", StoreModule);

#[cfg(test)]
mod tests {
    use super::*;
    use hearthkit::Registry;
    use std::sync::Arc as StdArc;

    fn ctx(data_dir: PathBuf) -> AppContext {
        AppContext::new(tracing::Span::none(), data_dir, PathBuf::from("/tmp"), StdArc::new(Registry::new()))
    }

    #[test]
    fn resolve_db_path_joins_relative_paths_under_the_module_namespace() {
        let data_dir = PathBuf::from("/var/hearthkit/data");
        assert_eq!(
            resolve_db_path(&data_dir, "agent.db"),
            PathBuf::from("/var/hearthkit/data/store.sqlite/agent.db"),
        );
    }

    #[test]
    fn resolve_db_path_keeps_absolute_paths_unchanged() {
        let data_dir = PathBuf::from("/var/hearthkit/data");
        assert_eq!(resolve_db_path(&data_dir, "/mnt/external.db"), PathBuf::from("/mnt/external.db"));
    }

    #[tokio::test]
    async fn s8_provision_registers_both_services_and_they_interoperate() {
        let dir = tempfile::tempdir().unwrap();
        let module = StoreModule::default();
        module.configure(&serde_json::json!({"path": "agent.db"})).unwrap();

        let ctx = ctx(dir.path().to_path_buf());
        module.provision(&ctx).await.unwrap();

        let history = ctx.service::<SqliteHistoryStore>("memory.history").unwrap();
        let facts = ctx.service::<SqliteFactStore>("memory.store").unwrap();

        use crate::store::{FactStore, HistoryStore};
        history.append("s1", "user", "hi").await.unwrap();
        facts.put("greeting", serde_json::json!("hi")).await.unwrap();

        assert_eq!(history.recent("s1", 10).await.unwrap().len(), 1);
        assert_eq!(facts.get("greeting").await.unwrap(), Some(serde_json::json!("hi")));

        module.stop(tokio_util::sync::CancellationToken::new()).await.unwrap();
    }
}
