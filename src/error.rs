//! Error types for Turnstile.

use thiserror::Error;

/// Main error type for Turnstile operations.
///
/// Being over a limit is not an error; it is reported through
/// [`Decision::is_limited`](crate::ratelimit::Decision::is_limited).
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A category name that is not recognised or has no policy
    #[error("Unknown rate limit category: {0}")]
    UnknownCategory(String),

    /// A policy with a zero limit or zero window
    #[error("Invalid policy for {category}: {reason}")]
    InvalidPolicy { category: String, reason: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for TurnstileError {
    fn from(err: config::ConfigError) -> Self {
        TurnstileError::Config(err.to_string())
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
