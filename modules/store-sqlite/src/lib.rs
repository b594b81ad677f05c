//! SQLite-backed implementation of the kernel's memory services: a
//! per-session message history and a flat fact store.

mod config;
mod module;
mod store;

pub use config::StoreConfig;
pub use module::StoreModule;
pub use store::{FactStore, HistoryMessage, HistoryStore, SqliteFactStore, SqliteHistoryStore};
