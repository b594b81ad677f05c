//! The failover router over a fixed set of provider endpoints.
//!
//! Candidate iteration (skip unhealthy, preserve construction order, direct
//! matches before fallbacks) is the same shape as a round-robin service
//! picker, adapted from load balancing into health-gated failover.

pub mod auth;
pub mod health;

pub use auth::AuthProfile;
pub use health::{HealthConfig, HealthState, HealthTracker};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub type Role = String;

#[derive(Debug, Error, Clone)]
pub enum EndpointError {
    #[error("request rejected: {0}")]
    NonRetryable(String),
    #[error("rate limited")]
    RateLimited,
    #[error("provider unavailable: {0}")]
    Retryable(String),
}

impl EndpointError {
    fn is_retryable(&self) -> bool {
        matches!(self, EndpointError::RateLimited | EndpointError::Retryable(_))
    }
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("no provider configured for role '{role}'")]
    NoProvider { role: Role },
    #[error("all providers exhausted for role '{role}'")]
    AllProvidersExhausted {
        role: Role,
        #[source]
        last_error: EndpointError,
    },
    #[error(transparent)]
    Provider(#[from] EndpointError),
    #[error("request cancelled")]
    Cancelled,
}

/// A concrete provider backend. `Req`/`Resp`/`Chunk` are opaque to the chain;
/// a real agent module supplies its own request/response types.
#[async_trait]
pub trait ProviderEndpoint<Req, Resp, Chunk>: Send + Sync
where
    Req: Clone + Send + Sync,
    Resp: Send,
    Chunk: Send + 'static,
{
    async fn complete(&self, request: Req) -> Result<Resp, EndpointError>;
    async fn stream(&self, request: Req) -> Result<mpsc::Receiver<Result<Chunk, EndpointError>>, EndpointError>;
    async fn health_check(&self) -> Result<(), EndpointError> {
        Ok(())
    }
}

pub struct ChainEntry<Req, Resp, Chunk> {
    pub name: String,
    pub role: Role,
    pub is_fallback: bool,
    /// Roles this entry covers when acting as a fallback; empty means "any".
    pub fallback_roles: Vec<Role>,
    pub endpoint: Arc<dyn ProviderEndpoint<Req, Resp, Chunk>>,
    pub auth: Option<AuthProfile>,
    pub health: HealthTracker,
}

impl<Req, Resp, Chunk> ChainEntry<Req, Resp, Chunk> {
    fn matches_fallback(&self, role: &str) -> bool {
        self.is_fallback && (self.fallback_roles.is_empty() || self.fallback_roles.iter().any(|r| r == role))
    }
}

struct Prober {
    handle: JoinHandle<()>,
}

pub struct Chain<Req, Resp, Chunk> {
    entries: Vec<ChainEntry<Req, Resp, Chunk>>,
    prober: SyncMutex<Option<Prober>>,
}

impl<Req, Resp, Chunk> Chain<Req, Resp, Chunk>
where
    Req: Clone + Send + Sync + 'static,
    Resp: Send + 'static,
    Chunk: Send + 'static,
{
    pub fn new(entries: Vec<ChainEntry<Req, Resp, Chunk>>) -> Self {
        Self {
            entries,
            prober: SyncMutex::new(None),
        }
    }

    /// Direct matches first (construction order), then fallback entries that
    /// declare coverage for `role` (construction order). Returns indices into
    /// `self.entries` rather than references so callers can move the index
    /// into a spawned task without borrowing the chain.
    fn candidates_for(&self, role: &str) -> Vec<usize> {
        let mut direct = Vec::new();
        let mut fallback = Vec::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            if entry.role == role {
                direct.push(idx);
            } else if entry.matches_fallback(role) {
                fallback.push(idx);
            }
        }
        direct.extend(fallback);
        direct
    }

    pub fn health_report(&self) -> Vec<(String, HealthState)> {
        self.entries.iter().map(|e| (e.name.clone(), e.health.state())).collect()
    }

    pub async fn complete(&self, role: &str, request: Req, cancel: &CancellationToken) -> Result<Resp, ChainError> {
        let candidates = self.candidates_for(role);
        if candidates.is_empty() {
            return Err(ChainError::NoProvider { role: role.to_string() });
        }

        let mut last_error: Option<EndpointError> = None;
        for idx in candidates {
            let entry = &self.entries[idx];
            if cancel.is_cancelled() {
                return Err(ChainError::Cancelled);
            }
            if !entry.health.is_available() {
                continue;
            }
            match entry.endpoint.complete(request.clone()).await {
                Ok(response) => {
                    entry.health.record_success();
                    return Ok(response);
                }
                Err(err) => {
                    if !err.is_retryable() {
                        return Err(ChainError::Provider(err));
                    }
                    if matches!(err, EndpointError::RateLimited) {
                        if let Some(auth) = &entry.auth {
                            auth.rotate();
                        }
                    }
                    entry.health.record_failure();
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(last_error) => Err(ChainError::AllProvidersExhausted { role: role.to_string(), last_error }),
            None => Err(ChainError::NoProvider { role: role.to_string() }),
        }
    }

    /// Establishes a stream against the first available, willing candidate,
    /// then relays chunks to the caller. A retryable error observed mid-stream
    /// or a clean close finalizes the health verdict for that candidate;
    /// a non-retryable error is forwarded but does not affect health.
    ///
    /// Takes `self` as an `Arc` because the forwarding task that relays
    /// chunks outlives this call and needs its own handle on the chain (and
    /// therefore on the candidate's `HealthTracker`) to record the eventual
    /// verdict.
    pub async fn stream(
        self: &Arc<Self>,
        role: &str,
        request: Req,
        cancel: &CancellationToken,
    ) -> Result<mpsc::Receiver<Result<Chunk, EndpointError>>, ChainError> {
        let candidates = self.candidates_for(role);
        if candidates.is_empty() {
            return Err(ChainError::NoProvider { role: role.to_string() });
        }

        let mut last_error: Option<EndpointError> = None;
        for idx in candidates {
            let entry = &self.entries[idx];
            if cancel.is_cancelled() {
                return Err(ChainError::Cancelled);
            }
            if !entry.health.is_available() {
                continue;
            }
            match entry.endpoint.stream(request.clone()).await {
                Ok(mut inner) => {
                    let (tx, rx) = mpsc::channel(32);
                    let chain = Arc::clone(self);
                    tokio::spawn(async move {
                        let health = &chain.entries[idx].health;
                        let mut saw_retryable = false;
                        while let Some(item) = inner.recv().await {
                            let forward_ok = item.is_ok();
                            if let Err(err) = &item {
                                if err.is_retryable() {
                                    saw_retryable = true;
                                }
                            }
                            if tx.send(item).await.is_err() {
                                return;
                            }
                            if !forward_ok && saw_retryable {
                                health.record_failure();
                                return;
                            }
                        }
                        if saw_retryable {
                            health.record_failure();
                        } else {
                            health.record_success();
                        }
                    });
                    return Ok(rx);
                }
                Err(err) => {
                    if !err.is_retryable() {
                        return Err(ChainError::Provider(err));
                    }
                    if matches!(err, EndpointError::RateLimited) {
                        if let Some(auth) = &entry.auth {
                            auth.rotate();
                        }
                    }
                    entry.health.record_failure();
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(last_error) => Err(ChainError::AllProvidersExhausted { role: role.to_string(), last_error }),
            None => Err(ChainError::NoProvider { role: role.to_string() }),
        }
    }

    /// Starts the background prober: a single task ticking at the minimum
    /// configured `check_interval` across all entries, probing any entry
    /// whose tracker reports it should be probed.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) {
        let interval = self
            .entries
            .iter()
            .map(|e| e.health.check_interval())
            .min()
            .unwrap_or(Duration::from_secs(10));

        let chain = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                for entry in &chain.entries {
                    if !entry.health.should_probe() {
                        continue;
                    }
                    match entry.endpoint.health_check().await {
                        Ok(()) => entry.health.record_success(),
                        Err(_) => entry.health.record_failure(),
                    }
                }
            }
        });
        *self.prober.lock() = Some(Prober { handle });
    }

    pub fn stop(&self) {
        if let Some(prober) = self.prober.lock().take() {
            prober.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedEndpoint {
        outcomes: Vec<Result<String, EndpointError>>,
        calls: AtomicUsize,
    }

    impl ScriptedEndpoint {
        fn new(outcomes: Vec<Result<String, EndpointError>>) -> Self {
            Self { outcomes, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl ProviderEndpoint<String, String, String> for ScriptedEndpoint {
        async fn complete(&self, _request: String) -> Result<String, EndpointError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .get(idx)
                .cloned()
                .unwrap_or_else(|| Err(EndpointError::Retryable("exhausted script".into())))
        }

        async fn stream(&self, _request: String) -> Result<mpsc::Receiver<Result<String, EndpointError>>, EndpointError> {
            unimplemented!("not exercised in these tests")
        }
    }

    fn entry(name: &str, role: &str, outcomes: Vec<Result<String, EndpointError>>) -> ChainEntry<String, String, String> {
        ChainEntry {
            name: name.to_string(),
            role: role.to_string(),
            is_fallback: false,
            fallback_roles: Vec::new(),
            endpoint: Arc::new(ScriptedEndpoint::new(outcomes)),
            auth: None,
            health: HealthTracker::new(HealthConfig::default()),
        }
    }

    #[tokio::test]
    async fn s3_failover_on_retryable_error() {
        let p1 = entry("p1", "primary", vec![Err(EndpointError::Retryable("down".into()))]);
        let p2 = entry("p2", "primary", vec![Ok("from p2".into())]);
        let chain = Chain::new(vec![p1, p2]);
        let cancel = CancellationToken::new();

        let response = chain.complete("primary", "hi".into(), &cancel).await.unwrap();
        assert_eq!(response, "from p2");

        let report: std::collections::HashMap<_, _> = chain.health_report().into_iter().collect();
        assert_eq!(report["p1"], HealthState::Healthy); // one failure, below max_failures=3
    }

    #[tokio::test]
    async fn s4_rate_limit_triggers_key_rotation() {
        let mut p1 = entry("p1", "primary", vec![Err(EndpointError::RateLimited)]);
        p1.auth = Some(AuthProfile::new(vec!["k1".into(), "k2".into()]));
        let p2 = entry("p2", "primary", vec![Ok("ok".into())]);
        let chain = Chain::new(vec![p1, p2]);
        let cancel = CancellationToken::new();

        chain.complete("primary", "hi".into(), &cancel).await.unwrap();
        assert_eq!(chain.entries[0].auth.as_ref().unwrap().current(), "k2");
    }

    #[tokio::test]
    async fn direct_matches_precede_fallbacks_in_construction_order() {
        let fallback = {
            let mut e = entry("fb", "fallback", vec![Ok("fb".into())]);
            e.is_fallback = true;
            e
        };
        let direct = entry("direct", "primary", vec![Ok("direct".into())]);
        let chain = Chain::new(vec![fallback, direct]);
        let candidates = chain.candidates_for("primary");
        // direct ("direct", idx 1) must be attempted before the fallback (idx 0).
        assert_eq!(candidates, vec![1, 0]);
    }

    #[tokio::test]
    async fn all_unavailable_candidates_yield_no_provider() {
        let mut p1 = entry("p1", "primary", vec![]);
        for _ in 0..3 {
            p1.health.record_failure();
        }
        assert_eq!(p1.health.state(), HealthState::Cooldown);
        // Force unavailability without waiting out the backoff window.
        for _ in 0..60 {
            p1.health.record_failure();
        }
        let chain = Chain::new(vec![p1]);
        let cancel = CancellationToken::new();
        let err = chain.complete("primary", "hi".into(), &cancel).await.unwrap_err();
        assert!(matches!(err, ChainError::NoProvider { .. }));
    }
}
