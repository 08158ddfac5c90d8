//! Error types for probe construction and key reads.

use thiserror::Error;

/// Result type alias for configuration-service reads.
pub type ReadResult<T> = Result<T, ReadError>;

/// Setup-time failures. Raised before any check runs.
///
/// `MissingArgument` is the invalid-argument case for an argument that was
/// never supplied; [`is_invalid_argument`](Self::is_invalid_argument) covers
/// both.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionError {
    /// An argument was supplied but failed validation.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// A required argument (endpoint, credential) was not supplied.
    #[error("missing required argument `{0}`")]
    MissingArgument(&'static str),

    /// The TLS client configuration could not be built.
    #[error("tls configuration error: {0}")]
    Tls(String),
}

impl ConstructionError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    /// Whether this error rejects a caller-supplied (or missing) argument.
    pub fn is_invalid_argument(&self) -> bool {
        self.argument().is_some()
    }

    /// Name of the offending argument, if the error concerns one.
    pub fn argument(&self) -> Option<&'static str> {
        match self {
            Self::InvalidArgument { name, .. } | Self::MissingArgument(name) => Some(*name),
            Self::Tls(_) => None,
        }
    }
}

/// Failures surfaced while reading a single configuration key.
///
/// Carried inside an unhealthy [`HealthCheckResult`](crate::HealthCheckResult),
/// so it is `Clone` and comparable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("credential error: {0}")]
    Credential(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("tls handshake failed: {0}")]
    Tls(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("configuration key not found: {key}")]
    NotFound { key: String },

    #[error("request rejected with status {status}")]
    Unauthorized { status: u16 },

    #[error("unexpected status {status} reading key {key}")]
    Status { key: String, status: u16 },

    #[error("failed to decode setting: {0}")]
    Decode(String),
}

/// Raised when the caller cancels a check that is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("health check cancelled")]
pub struct Cancelled;
