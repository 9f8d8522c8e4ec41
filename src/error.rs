//! Error types for the consolidation hook.
//!
//! Each variant carries a stable [`ErrorKind`] code used in structured log
//! fields and in host bridge outcome envelopes. A disabled config or a
//! missing previous session are normal outcomes, not errors, and are
//! modelled by [`TriggerOutcome`](crate::hook::TriggerOutcome) instead.

use serde::{Deserialize, Serialize};

/// Stable error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The gateway call exceeded its bound.
    DispatchTimeout,
    /// The gateway was unreachable or returned an error.
    DispatchTransport,
    /// Job store read/write failure.
    Persistence,
    /// Configuration could not be read or parsed.
    Config,
    /// Other I/O failure.
    Io,
}

impl ErrorKind {
    /// Render the kind as its stable code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DispatchTimeout => "DISPATCH_TIMEOUT",
            Self::DispatchTransport => "DISPATCH_TRANSPORT",
            Self::Persistence => "PERSISTENCE",
            Self::Config => "CONFIG",
            Self::Io => "IO",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for consolidation dispatch.
#[derive(Debug, thiserror::Error)]
pub enum ConsolidationError {
    /// Direct gateway call did not answer within its bound.
    #[error("dispatch timed out: {0}")]
    DispatchTimeout(String),

    /// Gateway unreachable or rejected the call.
    #[error("dispatch transport error: {0}")]
    DispatchTransport(String),

    /// Job store read/write/serialization failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConsolidationError {
    /// Returns the stable category for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DispatchTimeout(_) => ErrorKind::DispatchTimeout,
            Self::DispatchTransport(_) => ErrorKind::DispatchTransport,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ConsolidationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            ConsolidationError::DispatchTimeout("x".into()).kind(),
            ErrorKind::DispatchTimeout
        );
        assert_eq!(
            ConsolidationError::Persistence("x".into()).kind(),
            ErrorKind::Persistence
        );
        let io = std::io::Error::other("disk");
        assert_eq!(ConsolidationError::from(io).kind(), ErrorKind::Io);
    }

    #[test]
    fn kind_serializes_as_code() {
        let json = serde_json::to_string(&ErrorKind::DispatchTransport).expect("serialize");
        assert_eq!(json, "\"DISPATCH_TRANSPORT\"");
        assert_eq!(ErrorKind::DispatchTransport.to_string(), "DISPATCH_TRANSPORT");
    }

    #[test]
    fn display_includes_message() {
        let err = ConsolidationError::Persistence("cannot write store".into());
        assert_eq!(err.to_string(), "persistence error: cannot write store");
    }
}
