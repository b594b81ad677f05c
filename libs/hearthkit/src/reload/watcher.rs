//! Polls a config file's modification time and emits a debounced event
//! whenever it changes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub enum WatcherEvent {
    Modified { path: PathBuf },
}

pub struct Watcher {
    path: PathBuf,
    poll_interval: Duration,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    events: Mutex<Option<mpsc::Receiver<WatcherEvent>>>,
}

impl Watcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
            events: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Spawns the poll loop. Effective only on the first call; later calls
    /// are no-ops, matching an idempotent start.
    ///
    /// The event channel has capacity 1: if the consumer hasn't drained the
    /// last event yet, a further modification simply doesn't enqueue a
    /// duplicate - this is the debounce.
    pub fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return;
        }

        let (tx, rx) = mpsc::channel(1);
        let path = self.path.clone();
        let poll_interval = self.poll_interval;
        let cancel = self.cancel.clone();

        let join = tokio::spawn(async move {
            let mut last_modified = modified_at(&path).await;
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let current = modified_at(&path).await;
                        if current != last_modified {
                            last_modified = current;
                            if tx.try_send(WatcherEvent::Modified { path: path.clone() }).is_err() {
                                tracing::debug!(path = %path.display(), "reload event dropped, previous one still pending");
                            }
                        }
                    }
                }
            }
        });

        *handle = Some(join);
        *self.events.lock() = Some(rx);
    }

    /// Hands over the receiver of debounced events. Call once, after `start`.
    pub fn events(&self) -> mpsc::Receiver<WatcherEvent> {
        self.events
            .lock()
            .take()
            .expect("Watcher::events called before start, or called more than once")
    }

    /// Idempotent, and safe to call before `start`. Signals the poller to
    /// stop and waits for it to exit before returning.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn modified_at(path: &Path) -> Option<std::time::SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}
