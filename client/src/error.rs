use shared::{AmountValidationError, TransitionError};
use thiserror::Error;

/// Everything that can go wrong between a view action and the spreadsheet API.
///
/// Display strings are shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// Network unreachable, DNS failure, timeout
    #[error("Could not reach the savings server: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status
    #[error("Server error {status}: {body}")]
    Status { status: u16, body: String },

    /// A well-formed envelope with `success: false`
    #[error("{0}")]
    Application(String),

    /// The body was not an envelope at all
    #[error("Unexpected response from the savings server: {0}")]
    Decode(String),

    #[error("The savings API URL is not configured")]
    NotConfigured,

    #[error("Only administrators can do this")]
    Forbidden,

    #[error("This student account is not linked to a student record")]
    MissingStudentId,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Transaction '{0}' was not found")]
    UnknownTransaction(String),

    #[error("Transaction '{0}' is already being processed")]
    InFlight(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Session storage error: {0}")]
    Session(String),
}

impl ClientError {
    /// Message used when the server rejects a request without saying why
    pub const DEFAULT_REJECTION: &'static str = "The server rejected the request";

    pub fn application(message: Option<String>) -> Self {
        ClientError::Application(
            message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| Self::DEFAULT_REJECTION.to_string()),
        )
    }

    /// True for failures of the remote boundary itself rather than of local rules
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_)
                | ClientError::Status { .. }
                | ClientError::Application(_)
                | ClientError::Decode(_)
        )
    }
}

impl From<AmountValidationError> for ClientError {
    fn from(error: AmountValidationError) -> Self {
        ClientError::InvalidInput(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_error_falls_back_to_default_message() {
        assert_eq!(
            ClientError::application(None).to_string(),
            "The server rejected the request"
        );
        assert_eq!(
            ClientError::application(Some(" ".to_string())).to_string(),
            "The server rejected the request"
        );
        assert_eq!(
            ClientError::application(Some("Saldo tidak cukup".to_string())).to_string(),
            "Saldo tidak cukup"
        );
    }

    #[test]
    fn test_remote_classification() {
        assert!(ClientError::Transport("refused".into()).is_remote());
        assert!(ClientError::Status { status: 500, body: String::new() }.is_remote());
        assert!(!ClientError::Forbidden.is_remote());
        assert!(!ClientError::from(AmountValidationError::NotPositive).is_remote());
    }
}
