//! Exit codes for the CLI.
//!
//! These codes enable scripting integration by providing structured
//! feedback about operation results.

use scbridge_common::BridgeError;

/// Exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Operation completed successfully
    Success = 0,
    /// General/unspecified error
    GeneralError = 1,
    /// Invalid command-line arguments
    InvalidArguments = 2,
    /// User dismissed the picker
    UserCancelled = 8,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl From<&BridgeError> for ExitCode {
    fn from(err: &BridgeError) -> Self {
        match err {
            BridgeError::Cancelled => ExitCode::UserCancelled,
            _ => ExitCode::GeneralError,
        }
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitCode::Success => write!(f, "success"),
            ExitCode::GeneralError => write!(f, "general error"),
            ExitCode::InvalidArguments => write!(f, "invalid arguments"),
            ExitCode::UserCancelled => write!(f, "user cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scbridge_common::PlatformError;

    #[test]
    fn test_bridge_errors_map_to_exit_codes() {
        assert_eq!(ExitCode::from(&BridgeError::Cancelled), ExitCode::UserCancelled);
        assert_eq!(ExitCode::UserCancelled.as_i32(), 8);
        let failure = BridgeError::PlatformFailure(PlatformError::new("d", 1, "m"));
        assert_eq!(ExitCode::from(&failure), ExitCode::GeneralError);
        assert_eq!(ExitCode::from(&BridgeError::WrongThread), ExitCode::GeneralError);
    }
}
