//! Sentry client errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SentryError {
    /// DSN could not be parsed
    #[error("Invalid DSN: {0}")]
    InvalidDsn(String),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}
