//! Error types for regiongate.

use thiserror::Error;

/// Result type alias for regiongate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in regiongate operations.
#[derive(Error, Debug)]
pub enum Error {
    // Registry errors
    #[error("Region already registered: {0}")]
    DuplicateRegion(String),

    #[error("Region not found: {0}")]
    RegionNotFound(String),

    #[error("Deployment not found: {0}")]
    DeploymentNotFound(String),

    #[error("Deployment already recorded: {0}")]
    DuplicateDeployment(String),

    #[error("Deployment references unknown region: {0}")]
    InvalidRegion(String),

    #[error("Invalid status transition for deployment {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Collaborator errors
    #[error("External lookup failed: {0}")]
    ExternalLookup(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    // Gating errors
    #[error("Rate limit exceeded for {0}")]
    RateLimitExceeded(String),

    #[error("Circuit open for {0}")]
    CircuitOpen(String),

    // Health monitoring errors
    #[error("Health monitor is already running")]
    MonitorAlreadyRunning,

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error came from an external collaborator.
    pub fn is_external(&self) -> bool {
        matches!(self, Error::ExternalLookup(_) | Error::Timeout(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Error::Timeout(err.to_string())
    }
}
