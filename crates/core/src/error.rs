//! The closed set of error kinds the core emits (§7).

use thiserror::Error;

use crate::health::FailureKind;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors the core surfaces to callers. Wire-layer translation to HTTP status
/// codes lives in the `server` crate, not here.
#[derive(Debug, Error)]
pub enum Error {
    /// Requested model id not registered. Fails the request immediately; no fallback slot consumed.
    #[error("Unknown model: {0}")]
    InvalidModel(String),

    /// Dangling fallback, duplicate id, or a provider that rejects its own model.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The CLI executor killed the child for exceeding `timeoutMs`.
    #[error("Provider command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Non-zero exit from the provider command, or one killed by a signal the
    /// executor never sent (OOM-killed, segfault).
    #[error("Provider command exited with status {exit_code:?} (signal {signal:?}): {detail}")]
    ProviderExit { exit_code: Option<i32>, signal: Option<i32>, detail: String },

    /// The OS refused to start the child process.
    #[error("Failed to spawn provider command: {0}")]
    SpawnError(String),

    /// `json_contract` mode could not extract a JSON object from stdout.
    #[error("Failed to parse provider output as JSON contract: {0}")]
    ParseError(String),

    /// An upstream failure inferred from provider stderr/stdout via the classifier.
    #[error("{message}")]
    Upstream { kind: FailureKind, message: String },

    /// Every model in the fallback chain failed.
    #[error("Model execution failed after fallback chain: {chain}. Last error: {last_error}")]
    ChainExhausted { chain: String, last_error: String },
}

impl Error {
    /// The classifier kind this error would produce if fed through [`crate::health::classify`],
    /// used by the dispatcher to avoid re-stringifying already-classified errors.
    pub fn known_kind(&self) -> Option<FailureKind> {
        match self {
            Error::InvalidModel(_) => Some(FailureKind::InvalidModel),
            Error::ConfigError(_) => Some(FailureKind::Config),
            Error::Timeout { .. } => Some(FailureKind::Timeout),
            Error::ProviderExit { .. } => Some(FailureKind::ProviderExit),
            Error::Upstream { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
