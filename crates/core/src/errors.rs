use thiserror::Error;

/// Failures a command handler reports back to the sender instead of propagating.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("sender is not authorized to {action}")]
    Unauthorized { action: String },
    #[error("platform credentials were rejected: {0}")]
    Auth(String),
    #[error("platform returned status {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("delivered to {successes} recipient(s), failed for {failures}")]
    PartialFailure { successes: usize, failures: usize },
    #[error("recipient listing failed after {successes} deliveries and {failures} failures: {reason}")]
    ListingInterrupted { successes: usize, failures: usize, reason: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn unauthorized(action: impl Into<String>) -> Self {
        Self::Unauthorized { action: action.into() }
    }

    /// Stable label used as the `error_class` log field.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "unauthorized",
            Self::Auth(_) => "auth",
            Self::Upstream { .. } => "upstream",
            Self::PartialFailure { .. } => "partial_failure",
            Self::ListingInterrupted { .. } => "listing_interrupted",
            Self::InvalidInput(_) => "invalid_input",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Text sent to the person whose command failed.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized { action } => {
                format!("Error: You are not authorized to {action}.")
            }
            Self::Auth(_) => {
                "The bot could not authenticate with the platform. An administrator needs to renew its credentials.".to_owned()
            }
            Self::Upstream { status, message } => {
                format!("The platform rejected the request (status {status}): {message}")
            }
            Self::PartialFailure { successes, failures } => format!(
                "Delivered to {successes} recipient(s); delivery failed for {failures}."
            ),
            Self::ListingInterrupted { successes, failures, reason } => format!(
                "Stopped before reaching everyone ({reason}). Delivered to {successes} recipient(s); delivery failed for {failures}. Those already reached should not be sent this again."
            ),
            Self::InvalidInput(message) => format!("Invalid input: {message}"),
            Self::Configuration(message) => {
                format!("This command is not configured on this bot: {message}")
            }
        }
    }
}
