//! # Queue Error Types
//!
//! Error taxonomy for the queue subsystem.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Queue Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Contract      │  │   Transport     │  │     Engine              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidAmount  │  │  Transport      │  │  Configuration          │ │
//! │  │  InvalidState   │  │  AuthFailure    │  │  RefreshFailed          │ │
//! │  │  NotFound       │  │                 │  │  Storage                │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Contract errors always propagate to the caller of the mutating
//! operation. Transport/engine errors are caught at the engine boundary,
//! classified, and either trigger the simulator fallback (auth failures)
//! or are recorded while the last good snapshot stays visible.

use thiserror::Error;

/// Result type alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue error type covering contract, transport, and engine failures.
///
/// ## Design Principles
/// - Contract violations carry the offending value for debugging
/// - Auth failures are a distinct variant so the fallback policy can
///   match on them without string inspection at the call site
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum QueueError {
    // =========================================================================
    // Contract Errors
    // =========================================================================
    /// Top-up amount must be strictly positive.
    #[error("Invalid top-up amount: {amount_cents} cents")]
    InvalidAmount { amount_cents: i64 },

    /// A state-machine precondition was violated (e.g. updating a
    /// submitted order, deciding a non-pending approval).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The backend rejected the session (401/403 or equivalent).
    #[error("Authorization failed: {0}")]
    AuthFailure(String),

    /// Any other backend/transport failure.
    #[error("Transport error: {0}")]
    Transport(String),

    // =========================================================================
    // Engine Errors
    // =========================================================================
    /// Fatal configuration problem, construction-time only.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A background refresh cycle failed (non-fatal; stale data stays
    /// visible).
    #[error("Refresh failed: {0}")]
    RefreshFailed(String),

    /// The key-value storage primitive failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A persisted or wire document could not be (de)serialized.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }
}

// =============================================================================
// Error Classification (for the fallback policy)
// =============================================================================

/// Message fragments that mark a backend failure as an authorization
/// problem. Matched case-insensitively against the error text.
const AUTH_FAILURE_PATTERNS: &[&str] = &[
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "invalid token",
    "token expired",
    "not authenticated",
];

/// Returns true if an error message reads like an authorization failure.
pub fn looks_like_auth_failure(message: &str) -> bool {
    let lowered = message.to_lowercase();
    AUTH_FAILURE_PATTERNS.iter().any(|p| lowered.contains(p))
}

impl QueueError {
    /// Returns true if this error should be treated as an authorization
    /// failure by the fallback policy.
    ///
    /// Besides the dedicated variant, transport errors are sniffed by
    /// message text: real backends do not always surface a clean status
    /// code through every layer.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            QueueError::AuthFailure(_) => true,
            QueueError::Transport(msg) | QueueError::RefreshFailed(msg) => {
                looks_like_auth_failure(msg)
            }
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(self, QueueError::Configuration(_))
    }

    /// Returns true if this error violated a contract precondition
    /// (caller error rather than infrastructure failure).
    pub fn is_contract_error(&self) -> bool {
        matches!(
            self,
            QueueError::InvalidAmount { .. }
                | QueueError::InvalidState(_)
                | QueueError::NotFound { .. }
        )
    }
}
