//! Error types for the decision engine
//!
//! Hard risk-limit violations are intentionally NOT errors: the risk gateway
//! reports them as structured blockers so callers always get a "not approved,
//! here is why" answer. Errors here cover configuration, collaborator
//! transport, and proposal state-machine violations only.

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, GuardError>;

/// Decision-engine errors
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stale or unknown proposal id
    #[error("Proposal not found: {0}")]
    ProposalNotFound(String),

    /// Illegal state transition, e.g. executing an already-executed proposal
    #[error("Proposal conflict: {0}")]
    ProposalConflict(String),

    #[error("Sender not whitelisted: {0}")]
    NotWhitelisted(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for GuardError {
    fn from(err: config::ConfigError) -> Self {
        GuardError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for GuardError {
    fn from(err: serde_json::Error) -> Self {
        GuardError::Internal(err.to_string())
    }
}
