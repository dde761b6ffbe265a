// Route admission control
//
// Routes start no faster than the configured rate, spaced evenly by a shared
// tokio interval, and no more than `max_inflight` execute at once. A queue
// timeout turns saturation into a retryable RATE_LIMITED error so the caller
// can back off with the route still pending.
//
// Numan Thabit 2025 Nov

use crate::errors::{ErrorCode, ExecError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::warn;

const DEFAULT_ROUTES_PER_SEC: u32 = 200;

#[derive(Clone)]
pub struct AdmissionControl {
    inflight: Arc<Semaphore>,
    max_inflight: usize,
    /// Created on first use so construction needs no runtime
    pacing: Arc<Mutex<Option<Interval>>>,
    spacing: Duration,
    queue_timeout: Option<Duration>,
}

impl AdmissionControl {
    pub fn new(max_inflight: usize, rate_per_sec: Option<u32>) -> Self {
        let max_inflight = max_inflight.max(1);
        let rate = rate_per_sec.unwrap_or(DEFAULT_ROUTES_PER_SEC).max(1);
        Self {
            inflight: Arc::new(Semaphore::new(max_inflight)),
            max_inflight,
            pacing: Arc::new(Mutex::new(None)),
            spacing: Duration::from_secs(1) / rate,
            queue_timeout: None,
        }
    }

    /// Give up waiting for admission after `wait`.
    pub fn with_queue_timeout(mut self, wait: Duration) -> Self {
        self.queue_timeout = Some(wait);
        self
    }

    pub fn available(&self) -> usize {
        self.inflight.available_permits()
    }

    /// Wait for the next rate slot, then for an in-flight slot.
    pub async fn acquire(&self) -> Result<AdmissionPermit, ExecError> {
        let Some(wait) = self.queue_timeout else {
            return self.admit().await;
        };
        match tokio::time::timeout(wait, self.admit()).await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(
                    max_inflight = self.max_inflight,
                    waited_ms = wait.as_millis() as u64,
                    "route admission saturated"
                );
                Err(ExecError::coded(
                    ErrorCode::RateLimited,
                    format!(
                        "route admission saturated: {} routes in flight, waited {}ms",
                        self.max_inflight,
                        wait.as_millis()
                    ),
                ))
            }
        }
    }

    async fn admit(&self) -> Result<AdmissionPermit, ExecError> {
        {
            let mut pacing = self.pacing.lock().await;
            let ticker = pacing.get_or_insert_with(|| {
                let mut ticker = interval(self.spacing);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker
            });
            ticker.tick().await;
        }
        let permit = self
            .inflight
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ExecError::Transport("admission control closed".into()))?;
        Ok(AdmissionPermit { _permit: permit })
    }
}

/// Holds one in-flight slot until dropped.
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}
