//! CartClaw error type.

use thiserror::Error;

/// Errors surfaced by CartClaw components.
#[derive(Debug, Error)]
pub enum ClawError {
    /// Configuration load/parse/save failures.
    #[error("Config error: {0}")]
    Config(String),

    /// Contact or sequence store failures.
    #[error("Store error: {0}")]
    Store(String),

    /// Outbound delivery failures (SMTP, SMS REST).
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Caller handed us something unusable (bad email, bad phone, bad step).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ClawError>;
