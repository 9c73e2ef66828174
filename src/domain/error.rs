// ============================================================
// Layer 3 — Error Types
// ============================================================
// Typed errors raised by the numerical core (gather, model
// forward, LARS). The application and CLI layers wrap these
// in anyhow::Error with `?`.
//
// None of these are retried: a failed step surfaces to the
// training loop unchanged.

use thiserror::Error;

/// Result alias used by the gather, model and optimizer code.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed construction arguments or mismatched tensor shapes.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An update path that is deliberately not implemented.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// An exclusion pattern that failed to compile.
    #[error("Invalid exclusion pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source:  regex::Error,
    },
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}
