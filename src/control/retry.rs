// Retry manager
//
// Exponential backoff with jitter around fallible operations, gated by the
// per-chain circuit breakers, plus the route-level retry decision used by the
// executor once a step has failed.
//
// Numan Thabit 2025 Nov

use crate::config::RetryConfig;
use crate::control::breaker::CircuitBreakers;
use crate::errors::{self, ExecError};
use crate::metrics::RETRY_ATTEMPTS;
use crate::router::routes::Route;
use crate::storage::{ExecutionStore, PaymentIntentStatus, RetryLog};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// One retry decision, as written to the audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct RetryAttempt {
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    pub error: String,
    pub delay_ms: u64,
    pub will_retry: bool,
}

pub struct RetryManager {
    config: RetryConfig,
    breakers: CircuitBreakers,
    store: Arc<dyn ExecutionStore>,
}

impl RetryManager {
    pub fn new(config: RetryConfig, breakers: CircuitBreakers, store: Arc<dyn ExecutionStore>) -> Self {
        Self {
            config,
            breakers,
            store,
        }
    }

    pub fn breakers(&self) -> &CircuitBreakers {
        &self.breakers
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// `min(initial * multiplier^attempt, max)` scaled by a uniform factor
    /// in `1 ± jitter`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let cfg = &self.config;
        let exp = cfg.backoff_multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let base = (cfg.initial_delay_ms as f64 * exp).min(cfg.max_delay_ms as f64);
        let jitter = (cfg.jitter_percent / 100.0).clamp(0.0, 1.0);
        let factor = if jitter > 0.0 {
            rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter)
        } else {
            1.0
        };
        let ms = (base * factor).max(0.0);
        Duration::from_millis(ms.round() as u64)
    }

    pub fn is_retryable(&self, err: &ExecError) -> bool {
        errors::is_retryable(err)
    }

    /// Run `op` up to `max_retries + 1` times under the breaker for `key`.
    /// Transient failures sleep and retry; permanent failures and exhaustion
    /// count against the breaker and are returned as-is.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        name: &str,
        key: &str,
        mut op: F,
    ) -> Result<T, ExecError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ExecError>>,
    {
        let mut attempt = 0u32;
        loop {
            // the first attempt claims admission; later ones only need the
            // circuit to have stayed shut
            let admitted = if attempt == 0 {
                self.breakers.can_execute(key).await
            } else {
                !self.breakers.is_open(key).await
            };
            if !admitted {
                warn!(operation = name, key = %key, "circuit open, failing fast");
                return Err(ExecError::CircuitOpen {
                    key: key.to_string(),
                });
            }
            let err = match op(attempt).await {
                Ok(value) => {
                    self.breakers.record_success(key).await;
                    return Ok(value);
                }
                Err(err) => err,
            };
            if err.is_circuit_open() {
                return Err(err);
            }
            if !self.is_retryable(&err) {
                warn!(operation = name, key = %key, error = %err, "non-retryable failure");
                self.breakers.record_failure(key).await;
                return Err(err);
            }
            if attempt >= self.config.max_retries {
                error!(
                    operation = name,
                    key = %key,
                    attempts = attempt + 1,
                    error = %err,
                    "retries exhausted"
                );
                self.breakers.record_failure(key).await;
                return Err(err);
            }
            let delay = self.calculate_delay(attempt);
            warn!(
                operation = name,
                key = %key,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            );
            RETRY_ATTEMPTS.with_label_values(&[name]).inc();
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Route-level retry decision after a step failure. `Ok(delay)` means the
    /// caller should wait `delay` and resume the route; `Err` means the route
    /// and its payment intent have been marked failed.
    pub async fn retry(
        &self,
        route: &mut Route,
        payment_intent_id: &str,
        error: ExecError,
        attempt: u32,
    ) -> Result<Duration, ExecError> {
        let retryable = self.is_retryable(&error);
        let will_retry = retryable && attempt < self.config.max_retries;
        let delay = if will_retry {
            self.calculate_delay(attempt)
        } else {
            Duration::ZERO
        };
        let log = RetryLog {
            route_id: route.id.clone(),
            payment_intent_id: payment_intent_id.to_string(),
            attempt: RetryAttempt {
                attempt,
                timestamp: Utc::now(),
                error: error.to_string(),
                delay_ms: delay.as_millis() as u64,
                will_retry,
            },
        };
        if let Err(err) = self.store.record_retry(log).await {
            warn!(route_id = %route.id, error = %err, "persist retry log failed");
        }

        let key = route.circuit_key();
        if will_retry {
            let open = match &key {
                Some(key) => self.breakers.is_open(key).await,
                None => false,
            };
            if !open {
                RETRY_ATTEMPTS.with_label_values(&["route"]).inc();
                warn!(
                    route_id = %route.id,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "route step failed, resuming after delay"
                );
                return Ok(delay);
            }
            let key = key.unwrap_or_default();
            let reason = format!("circuit open for {key}: chain temporarily unavailable ({error})");
            self.fail_route(route, payment_intent_id, &reason).await;
            return Err(ExecError::CircuitOpen { key });
        }

        let reason = if retryable {
            format!("retries exhausted after {} attempts: {error}", attempt + 1)
        } else {
            error.to_string()
        };
        if let Some(key) = &key {
            self.breakers.record_failure(key).await;
        }
        self.fail_route(route, payment_intent_id, &reason).await;
        Err(error)
    }

    /// Mark both the route and its payment intent failed with `reason`.
    pub async fn fail_route(&self, route: &mut Route, payment_intent_id: &str, reason: &str) {
        if let Err(err) = route.fail(reason) {
            warn!(route_id = %route.id, error = %err, "route already terminal");
        }
        error!(route_id = %route.id, payment_intent_id = %payment_intent_id, reason = %reason, "route failed");
        if let Err(err) = self.store.save_route(route).await {
            warn!(route_id = %route.id, error = %err, "persist failed route");
        }
        if let Err(err) = self
            .store
            .set_payment_intent_status(payment_intent_id, PaymentIntentStatus::Failed, Some(reason))
            .await
        {
            warn!(payment_intent_id = %payment_intent_id, error = %err, "persist payment intent failure");
        }
    }
}
