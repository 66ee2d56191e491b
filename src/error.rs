//! Unified error types for Wayfinder

use thiserror::Error;

/// Unified Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Wayfinder
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transient driver/protocol failure
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A cached handle no longer refers to a live UI node
    #[error("Stale handle: {0}")]
    StaleHandle(String),

    /// Element never found, or not unique, after exhausting retries
    #[error("Element resolution failed: {0}")]
    Resolution(String),

    /// A page's own validators never settled
    #[error("Page arrival failed: {0}")]
    ArrivalTimeout(String),

    /// Destination page never confirmed within the transition budget
    #[error("Page transition failed: {0}")]
    TransitionTimeout(String),

    /// A write never converged on the intended value
    #[error("Write verification failed: {0}")]
    WriteVerification(String),

    /// Configuration error; a programming mistake, never retried
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Error::Protocol(msg.into())
    }

    /// Create a new stale handle error
    pub fn stale_handle<S: Into<String>>(msg: S) -> Self {
        Error::StaleHandle(msg.into())
    }

    /// Create a new resolution error
    pub fn resolution<S: Into<String>>(msg: S) -> Self {
        Error::Resolution(msg.into())
    }

    /// Create a new arrival timeout error
    pub fn arrival_timeout<S: Into<String>>(msg: S) -> Self {
        Error::ArrivalTimeout(msg.into())
    }

    /// Create a new transition timeout error
    pub fn transition_timeout<S: Into<String>>(msg: S) -> Self {
        Error::TransitionTimeout(msg.into())
    }

    /// Create a new write verification error
    pub fn write_verification<S: Into<String>>(msg: S) -> Self {
        Error::WriteVerification(msg.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// True if this error reports a handle detached from the live document
    pub fn is_stale(&self) -> bool {
        matches!(self, Error::StaleHandle(_))
    }

    /// True if the condition is environmental and worth a bounded retry
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::StaleHandle(_) | Error::Protocol(_))
    }
}
