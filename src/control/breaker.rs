// Per-chain circuit breakers
//
// Closed -> open after `failure_threshold` failures inside the monitoring
// window; open -> half-open once the recovery timeout has passed since the
// last state change; half-open -> closed after `success_threshold`
// consecutive successes, or straight back to open on any failure. Half-open
// admits one trial call at a time.
//
// Numan Thabit 2025 Nov

use crate::config::BreakerConfig;
use crate::metrics::BREAKER_TRANSITIONS;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerState {
    pub key: String,
    pub state: CircuitState,
    pub failure_count: usize,
    pub consecutive_successes: u32,
    #[serde(skip)]
    pub last_state_change: Instant,
}

#[derive(Clone)]
pub struct CircuitBreakers {
    inner: Arc<Mutex<HashMap<String, Breaker>>>,
    settings: BreakerConfig,
}

struct Breaker {
    state: CircuitState,
    failures: VecDeque<Instant>,
    consecutive_successes: u32,
    last_state_change: Instant,
    /// Start of the outstanding half-open trial call
    trial_started: Option<Instant>,
}

impl Breaker {
    fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            consecutive_successes: 0,
            last_state_change: now,
            trial_started: None,
        }
    }

    fn transition(&mut self, key: &str, next: CircuitState, now: Instant) {
        self.state = next;
        self.last_state_change = now;
        self.consecutive_successes = 0;
        self.trial_started = None;
        BREAKER_TRANSITIONS
            .with_label_values(&[key, &next.to_string()])
            .inc();
    }
}

impl Default for CircuitBreakers {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

impl CircuitBreakers {
    pub fn new(settings: BreakerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            settings,
        }
    }

    /// False while open. An open breaker past its recovery timeout moves to
    /// half-open here and lets the caller through as the trial call. While one
    /// is outstanding other callers are refused; the trial slot is released by
    /// the next recorded outcome, or after one recovery timeout if the caller
    /// never reports.
    pub async fn can_execute(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(b) = inner.get_mut(key) else {
            return true;
        };
        let now = Instant::now();
        let recovery = self.settings.recovery_timeout();
        match b.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => match b.trial_started {
                Some(at) if now.duration_since(at) < recovery => false,
                _ => {
                    b.trial_started = Some(now);
                    true
                }
            },
            CircuitState::Open => {
                if now.duration_since(b.last_state_change) >= recovery {
                    b.transition(key, CircuitState::HalfOpen, now);
                    b.trial_started = Some(now);
                    info!(key = %key, "circuit half-open, allowing a trial call");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// True only while open. Unlike `can_execute` this never claims the
    /// half-open trial slot, so work already admitted can ask whether to go on.
    pub async fn is_open(&self, key: &str) -> bool {
        self.state(key).await == CircuitState::Open
    }

    pub async fn record_success(&self, key: &str) {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let b = inner
            .entry(key.to_string())
            .or_insert_with(|| Breaker::new(now));
        match b.state {
            CircuitState::Closed => b.failures.clear(),
            CircuitState::HalfOpen => {
                b.trial_started = None;
                b.consecutive_successes += 1;
                if b.consecutive_successes >= self.settings.success_threshold {
                    b.failures.clear();
                    b.transition(key, CircuitState::Closed, now);
                    info!(key = %key, "circuit closed");
                }
            }
            // a late success from a call admitted before the trip
            CircuitState::Open => {}
        }
    }

    pub async fn record_failure(&self, key: &str) {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let window = self.settings.monitoring_window();
        let b = inner
            .entry(key.to_string())
            .or_insert_with(|| Breaker::new(now));
        b.failures.push_back(now);
        while let Some(front) = b.failures.front() {
            if now.duration_since(*front) > window {
                b.failures.pop_front();
            } else {
                break;
            }
        }
        match b.state {
            CircuitState::HalfOpen => {
                b.transition(key, CircuitState::Open, now);
                warn!(key = %key, "trial call failed, circuit reopened");
            }
            CircuitState::Closed => {
                if b.failures.len() >= self.settings.failure_threshold as usize {
                    b.transition(key, CircuitState::Open, now);
                    warn!(
                        key = %key,
                        failures = b.failures.len(),
                        window_secs = window.as_secs(),
                        "circuit opened"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    pub async fn state(&self, key: &str) -> CircuitState {
        self.inner
            .lock()
            .await
            .get(key)
            .map(|b| b.state)
            .unwrap_or(CircuitState::Closed)
    }

    pub async fn snapshot(&self, key: &str) -> Option<CircuitBreakerState> {
        self.inner.lock().await.get(key).map(|b| CircuitBreakerState {
            key: key.to_string(),
            state: b.state,
            failure_count: b.failures.len(),
            consecutive_successes: b.consecutive_successes,
            last_state_change: b.last_state_change,
        })
    }

    pub async fn snapshots(&self) -> Vec<CircuitBreakerState> {
        let inner = self.inner.lock().await;
        let mut out: Vec<_> = inner
            .iter()
            .map(|(key, b)| CircuitBreakerState {
                key: key.clone(),
                state: b.state,
                failure_count: b.failures.len(),
                consecutive_successes: b.consecutive_successes,
                last_state_change: b.last_state_change,
            })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const KEY: &str = "chain:polygon";

    async fn trip(cb: &CircuitBreakers) {
        for _ in 0..5 {
            cb.record_failure(KEY).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_lifecycle() {
        let cb = CircuitBreakers::default();
        for _ in 0..4 {
            cb.record_failure(KEY).await;
        }
        assert!(cb.can_execute(KEY).await, "four failures stay closed");
        cb.record_failure(KEY).await;
        assert!(!cb.can_execute(KEY).await);
        assert_eq!(cb.state(KEY).await, CircuitState::Open);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!cb.can_execute(KEY).await, "still inside recovery timeout");

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cb.can_execute(KEY).await);
        assert_eq!(cb.state(KEY).await, CircuitState::HalfOpen);

        cb.record_success(KEY).await;
        cb.record_success(KEY).await;
        assert_eq!(cb.state(KEY).await, CircuitState::HalfOpen);
        cb.record_success(KEY).await;
        assert_eq!(cb.state(KEY).await, CircuitState::Closed);
        assert_eq!(cb.snapshot(KEY).await.unwrap().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens() {
        let cb = CircuitBreakers::default();
        trip(&cb).await;
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cb.can_execute(KEY).await);
        cb.record_success(KEY).await;
        cb.record_failure(KEY).await;
        assert_eq!(cb.state(KEY).await, CircuitState::Open);
        // recovery timer restarts from the reopen
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!cb.can_execute(KEY).await);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_one_trial_at_a_time() {
        let cb = CircuitBreakers::default();
        trip(&cb).await;
        tokio::time::advance(Duration::from_secs(60)).await;

        assert!(cb.can_execute(KEY).await, "first caller gets the trial slot");
        assert!(!cb.can_execute(KEY).await, "second caller waits on the trial call");
        assert!(!cb.is_open(KEY).await);

        cb.record_success(KEY).await;
        assert!(cb.can_execute(KEY).await, "next trial call after a success");
        assert!(!cb.can_execute(KEY).await);

        // a caller that never reports frees the slot after the recovery timeout
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cb.can_execute(KEY).await);
        assert_eq!(cb.state(KEY).await, CircuitState::HalfOpen);
        assert_eq!(cb.snapshot(KEY).await.unwrap().consecutive_successes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_failures_are_pruned() {
        let cb = CircuitBreakers::default();
        for _ in 0..4 {
            cb.record_failure(KEY).await;
        }
        tokio::time::advance(Duration::from_secs(301)).await;
        cb.record_failure(KEY).await;
        assert_eq!(cb.state(KEY).await, CircuitState::Closed);
        assert_eq!(cb.snapshot(KEY).await.unwrap().failure_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let cb = CircuitBreakers::default();
        trip(&cb).await;
        assert!(!cb.can_execute(KEY).await);
        assert!(cb.can_execute("chain:base").await);
        let all = cb.snapshots().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].state, CircuitState::Open);
    }
}
