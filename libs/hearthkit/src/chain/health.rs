//! Per-endpoint availability state machine.
//!
//! A state machine driven by success/failure with exponential back-off and a
//! revive transition, consulted synchronously before every chain attempt.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Cooldown,
    Dead,
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub max_failures: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub check_interval: Duration,
    /// Consecutive failures recorded while back-off is already pinned at
    /// `max_backoff` before the entry is declared Dead.
    pub dead_after_pinned_failures: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            check_interval: Duration::from_secs(10),
            dead_after_pinned_failures: 5,
        }
    }
}

struct Inner {
    state: HealthState,
    consecutive_failures: u32,
    backoff: Duration,
    pinned_failures: u32,
    last_failure: Option<Instant>,
}

pub struct HealthTracker {
    config: HealthConfig,
    inner: Mutex<Inner>,
    on_change: Option<Box<dyn Fn(HealthState, HealthState) + Send + Sync>>,
}

impl HealthTracker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: HealthState::Healthy,
                consecutive_failures: 0,
                backoff: config.initial_backoff,
                pinned_failures: 0,
                last_failure: None,
            }),
            config,
            on_change: None,
        }
    }

    pub fn with_callback(
        config: HealthConfig,
        on_change: impl Fn(HealthState, HealthState) + Send + Sync + 'static,
    ) -> Self {
        let mut tracker = Self::new(config);
        tracker.on_change = Some(Box::new(on_change));
        tracker
    }

    pub fn state(&self) -> HealthState {
        self.inner.lock().state
    }

    pub fn check_interval(&self) -> Duration {
        self.config.check_interval
    }

    pub fn record_success(&self) {
        let from = {
            let mut inner = self.inner.lock();
            let from = inner.state;
            inner.state = HealthState::Healthy;
            inner.consecutive_failures = 0;
            inner.backoff = self.config.initial_backoff;
            inner.pinned_failures = 0;
            inner.last_failure = None;
            from
        };
        if from != HealthState::Healthy {
            self.emit(from, HealthState::Healthy);
        }
    }

    pub fn record_failure(&self) {
        let (from, to) = {
            let mut inner = self.inner.lock();
            let from = inner.state;
            inner.last_failure = Some(Instant::now());
            match from {
                HealthState::Healthy => {
                    inner.consecutive_failures += 1;
                    if inner.consecutive_failures >= self.config.max_failures {
                        inner.state = HealthState::Cooldown;
                        inner.backoff = self.config.initial_backoff;
                    }
                }
                HealthState::Cooldown => {
                    if inner.backoff >= self.config.max_backoff {
                        inner.pinned_failures += 1;
                        if inner.pinned_failures >= self.config.dead_after_pinned_failures {
                            inner.state = HealthState::Dead;
                        }
                    } else {
                        inner.backoff = (inner.backoff * 2).min(self.config.max_backoff);
                        inner.pinned_failures = 0;
                    }
                }
                HealthState::Dead => {}
            }
            (from, inner.state)
        };
        if from != to {
            self.emit(from, to);
        }
    }

    /// True while the caller may route traffic here: Healthy always, Dead
    /// never, Cooldown once the back-off window since the last failure has
    /// elapsed (so probing can resume without diverting steady-state load).
    pub fn is_available(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            HealthState::Healthy => true,
            HealthState::Dead => false,
            HealthState::Cooldown => inner
                .last_failure
                .map(|t| t.elapsed() >= inner.backoff)
                .unwrap_or(true),
        }
    }

    /// True when the background prober should attempt a health check here.
    pub fn should_probe(&self) -> bool {
        let inner = self.inner.lock();
        matches!(inner.state, HealthState::Cooldown | HealthState::Dead)
            && inner
                .last_failure
                .map(|t| t.elapsed() >= inner.backoff)
                .unwrap_or(true)
    }

    fn emit(&self, from: HealthState, to: HealthState) {
        if let Some(cb) = &self.on_change {
            cb(from, to);
        }
    }
}
