// Control plane: admission control, circuit breakers and retry policy
//
// Routes are admitted through a concurrency / rate gate, every fallible
// operation runs under the retry manager, and failures feed per-chain breakers.
//
// Numan Thabit 2025 Nov

pub mod admission;
pub mod breaker;
pub mod retry;

pub use admission::{AdmissionControl, AdmissionPermit};
pub use breaker::{CircuitBreakerState, CircuitBreakers, CircuitState};
pub use retry::{RetryAttempt, RetryManager};
