//! Polling-based config hot reload: a [`Watcher`] emits debounced change
//! events, a [`ReloadHandler`] consumes them and drives a
//! [`LifecycleCoordinator`](crate::runtime::lifecycle::LifecycleCoordinator).

mod handler;
mod watcher;

pub use handler::{ReloadError, ReloadHandler};
pub use watcher::{Watcher, WatcherEvent};
