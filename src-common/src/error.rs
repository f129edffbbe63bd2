//! Error types for bridge and picker operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// An error reported by the platform (picker or event loop), carried unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformError {
    /// Error domain, e.g. `SCStreamErrorDomain` on macOS
    pub domain: String,
    /// Domain-specific error code
    pub code: i64,
    /// Human-readable description as reported by the platform
    pub message: String,
}

impl PlatformError {
    pub fn new(domain: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.message, self.domain, self.code)
    }
}

impl std::error::Error for PlatformError {}

/// Error type for bridged operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The user dismissed the picker
    #[error("Cancelled")]
    Cancelled,
    /// The picker or the event loop reported an error
    #[error("Platform error: {0}")]
    PlatformFailure(PlatformError),
    /// The loop stopped before a result was recorded
    #[error("Event loop stopped without a recorded result")]
    MissingResult,
    /// Another presentation is already waiting on the picker
    #[error("Picker is already presenting")]
    PickerBusy,
    /// Waiting for the loop from the loop thread would never return
    #[error("Cannot block the event loop thread waiting for its own task")]
    Reentrant,
    /// The loop can only be started from its owning thread
    #[error("Event loop must be started from its owning thread")]
    WrongThread,
    /// The producer panicked while running on the loop
    #[error("Producer panicked: {0}")]
    ProducerPanicked(String),
}

impl BridgeError {
    /// Whether this error means the user backed out rather than something failing.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BridgeError::Cancelled)
    }
}

impl From<PlatformError> for BridgeError {
    fn from(err: PlatformError) -> Self {
        BridgeError::PlatformFailure(err)
    }
}

impl From<BridgeError> for String {
    fn from(err: BridgeError) -> Self {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_message() {
        // Callers match on the kind, but the text is what ends up in logs
        assert_eq!(BridgeError::Cancelled.to_string(), "Cancelled");
        assert!(BridgeError::Cancelled.is_cancelled());
        assert!(!BridgeError::MissingResult.is_cancelled());
    }

    #[test]
    fn test_platform_error_is_forwarded_unchanged() {
        let underlying = PlatformError::new("SCStreamErrorDomain", -3801, "User declined TCC");
        let err: BridgeError = underlying.clone().into();
        assert_eq!(err, BridgeError::PlatformFailure(underlying));
        assert_eq!(
            err.to_string(),
            "Platform error: User declined TCC (SCStreamErrorDomain -3801)"
        );
    }
}
