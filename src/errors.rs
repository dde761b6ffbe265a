// Error types and error classification module
// This file defines the execution error type and the retryable / non-retryable
// taxonomy used by the retry manager and circuit breakers
//
// Numan Thabit 2025 Nov

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Stable error codes. The first seven are permanent failures, the rest are
/// transient and eligible for backoff retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InsufficientBalance,
    ApprovalRequired,
    InvalidSignature,
    ContractError,
    SlippageExceeded,
    DeadlineExceeded,
    InvalidRoute,
    NetworkError,
    Timeout,
    RateLimited,
    GasEstimationFailed,
    NonceTooLow,
    ReplacementUnderpriced,
    InsufficientFundsForGas,
    RpcError,
    ConnectionReset,
    ConnectionRefused,
    ConnectionTimedOut,
}

impl ErrorCode {
    pub const NON_RETRYABLE: [ErrorCode; 7] = [
        ErrorCode::InsufficientBalance,
        ErrorCode::ApprovalRequired,
        ErrorCode::InvalidSignature,
        ErrorCode::ContractError,
        ErrorCode::SlippageExceeded,
        ErrorCode::DeadlineExceeded,
        ErrorCode::InvalidRoute,
    ];

    pub const RETRYABLE: [ErrorCode; 11] = [
        ErrorCode::NetworkError,
        ErrorCode::Timeout,
        ErrorCode::RateLimited,
        ErrorCode::GasEstimationFailed,
        ErrorCode::NonceTooLow,
        ErrorCode::ReplacementUnderpriced,
        ErrorCode::InsufficientFundsForGas,
        ErrorCode::RpcError,
        ErrorCode::ConnectionReset,
        ErrorCode::ConnectionRefused,
        ErrorCode::ConnectionTimedOut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ErrorCode::ApprovalRequired => "APPROVAL_REQUIRED",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::ContractError => "CONTRACT_ERROR",
            ErrorCode::SlippageExceeded => "SLIPPAGE_EXCEEDED",
            ErrorCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ErrorCode::InvalidRoute => "INVALID_ROUTE",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::GasEstimationFailed => "GAS_ESTIMATION_FAILED",
            ErrorCode::NonceTooLow => "NONCE_TOO_LOW",
            ErrorCode::ReplacementUnderpriced => "REPLACEMENT_UNDERPRICED",
            ErrorCode::InsufficientFundsForGas => "INSUFFICIENT_FUNDS_FOR_GAS",
            ErrorCode::RpcError => "RPC_ERROR",
            ErrorCode::ConnectionReset => "ECONNRESET",
            ErrorCode::ConnectionRefused => "ECONNREFUSED",
            ErrorCode::ConnectionTimedOut => "ETIMEDOUT",
        }
    }

    pub fn is_retryable(&self) -> bool {
        !Self::NON_RETRYABLE.contains(self)
    }

    /// Lower-case message fragments that identify each code in free-form
    /// RPC / provider error text.
    fn patterns(&self) -> &'static [&'static str] {
        match self {
            ErrorCode::InsufficientBalance => &[
                "insufficient balance",
                "transfer amount exceeds balance",
                "insufficient_balance",
            ],
            ErrorCode::ApprovalRequired => &[
                "approval required",
                "insufficient allowance",
                "transfer amount exceeds allowance",
                "approval_required",
            ],
            ErrorCode::InvalidSignature => &["invalid signature", "invalid_signature"],
            ErrorCode::ContractError => &["execution reverted", "revert", "contract_error"],
            ErrorCode::SlippageExceeded => &[
                "slippage",
                "too little received",
                "insufficient output amount",
                "return amount is not enough",
            ],
            ErrorCode::DeadlineExceeded => &["deadline", "transaction too old", "expired"],
            ErrorCode::InvalidRoute => &["invalid route", "no route", "invalid_route"],
            ErrorCode::ConnectionReset => &["econnreset", "connection reset"],
            ErrorCode::ConnectionRefused => &["econnrefused", "connection refused"],
            ErrorCode::ConnectionTimedOut => &["etimedout"],
            ErrorCode::NetworkError => &["network error", "network_error", "network"],
            ErrorCode::Timeout => &["timeout", "timed out"],
            ErrorCode::RateLimited => &["rate limit", "rate_limited", "too many requests", "429"],
            ErrorCode::GasEstimationFailed => &[
                "gas estimation",
                "gas_estimation_failed",
                "cannot estimate gas",
            ],
            ErrorCode::NonceTooLow => &["nonce too low", "nonce_too_low"],
            ErrorCode::ReplacementUnderpriced => &["underpriced"],
            ErrorCode::InsufficientFundsForGas => &[
                "insufficient funds for gas",
                "insufficient_funds_for_gas",
            ],
            ErrorCode::RpcError => &["rpc error", "rpc_error"],
        }
    }

    /// Detect a code from message text. Permanent codes are matched before
    /// transient ones; within the transient set the connection-level codes
    /// come first so `ETIMEDOUT` is not reported as a plain timeout.
    pub fn detect(message: &str) -> Option<ErrorCode> {
        let lower = message.to_ascii_lowercase();
        const TRANSIENT_ORDER: [ErrorCode; 11] = [
            ErrorCode::ConnectionReset,
            ErrorCode::ConnectionRefused,
            ErrorCode::ConnectionTimedOut,
            ErrorCode::InsufficientFundsForGas,
            ErrorCode::NonceTooLow,
            ErrorCode::ReplacementUnderpriced,
            ErrorCode::RateLimited,
            ErrorCode::GasEstimationFailed,
            ErrorCode::RpcError,
            ErrorCode::Timeout,
            ErrorCode::NetworkError,
        ];
        ErrorCode::NON_RETRYABLE
            .iter()
            .chain(TRANSIENT_ORDER.iter())
            .find(|code| code.patterns().iter().any(|p| lower.contains(p)))
            .copied()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum ExecError {
    #[error("{code}: {message}")]
    Coded { code: ErrorCode, message: String },
    #[error("circuit open for {key}: chain temporarily unavailable")]
    CircuitOpen { key: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider {provider} error: {message}")]
    Provider { provider: String, message: String },
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("signing error: {0}")]
    Signing(String),
    #[error("build tx error: {0}")]
    BuildTx(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl ExecError {
    pub fn coded(code: ErrorCode, message: impl Into<String>) -> Self {
        ExecError::Coded {
            code,
            message: message.into(),
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ExecError::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn invalid_route(message: impl Into<String>) -> Self {
        Self::coded(ErrorCode::InvalidRoute, message)
    }

    /// Explicit code if present, otherwise detected from the message text.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ExecError::Coded { code, .. } => Some(*code),
            ExecError::CircuitOpen { .. } => None,
            other => ErrorCode::detect(&other.to_string()),
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ExecError::CircuitOpen { .. })
    }

    /// Map a reqwest failure onto the transient taxonomy.
    pub fn from_http(service: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExecError::coded(ErrorCode::Timeout, format!("{service}: {err}"))
        } else if err.is_connect() {
            ExecError::coded(ErrorCode::NetworkError, format!("{service}: {err}"))
        } else if err.status().map(|s| s.as_u16()) == Some(429) {
            ExecError::coded(ErrorCode::RateLimited, format!("{service}: {err}"))
        } else {
            ExecError::Transport(format!("{service}: {err}"))
        }
    }
}

/// Unknown errors default to retryable; an open circuit is never retried
/// in place.
pub fn is_retryable(err: &ExecError) -> bool {
    if err.is_circuit_open() {
        return false;
    }
    match err.code() {
        Some(code) => code.is_retryable(),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_retryable_codes_never_retry() {
        for code in ErrorCode::NON_RETRYABLE {
            let err = ExecError::coded(code, "boom");
            assert!(!is_retryable(&err), "{code} must not be retryable");
            // the code name alone in free text is enough
            let text = ExecError::Rpc(format!("upstream said {}", code.as_str()));
            assert!(!is_retryable(&text), "{code} text must not be retryable");
        }
    }

    #[test]
    fn retryable_codes_retry() {
        for code in ErrorCode::RETRYABLE {
            assert!(is_retryable(&ExecError::coded(code, "x")), "{code}");
        }
    }

    #[test]
    fn detects_codes_from_node_messages() {
        assert_eq!(
            ErrorCode::detect("insufficient funds for gas * price + value"),
            Some(ErrorCode::InsufficientFundsForGas)
        );
        assert_eq!(ErrorCode::detect("nonce too low: next nonce 7"), Some(ErrorCode::NonceTooLow));
        assert_eq!(
            ErrorCode::detect("replacement transaction underpriced"),
            Some(ErrorCode::ReplacementUnderpriced)
        );
        assert_eq!(
            ErrorCode::detect("execution reverted: UniswapV2: INSUFFICIENT_OUTPUT_AMOUNT"),
            Some(ErrorCode::ContractError)
        );
        assert_eq!(ErrorCode::detect("connect ETIMEDOUT 10.0.0.1:443"), Some(ErrorCode::ConnectionTimedOut));
        assert_eq!(ErrorCode::detect("HTTP 429 Too Many Requests"), Some(ErrorCode::RateLimited));
        assert_eq!(ErrorCode::detect("something odd happened"), None);
    }

    #[test]
    fn unknown_errors_fail_open() {
        let err = ExecError::Transport("weird upstream hiccup".into());
        assert_eq!(err.code(), None);
        assert!(is_retryable(&err));
    }

    #[test]
    fn circuit_open_is_labeled_and_not_retried() {
        let err = ExecError::CircuitOpen {
            key: "chain:ethereum".into(),
        };
        assert!(err.is_circuit_open());
        assert!(!is_retryable(&err));
        assert!(err.to_string().contains("chain:ethereum"));
    }
}
