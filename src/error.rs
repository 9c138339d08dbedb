//! Error types shared by every astropost command.

/// Errors surfaced to the command line. None of them are retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Credentials are missing or invalid, or the user denied consent.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A referenced message id does not resolve.
    #[error("Message not found: {0}")]
    NotFound(String),

    /// The Gmail API could not be reached or answered with a failure status.
    #[error("Gmail API request failed ({}): {message}", status_label(.status))]
    Transport { status: Option<u16>, message: String },

    /// Caller input was rejected before any network call.
    #[error("Invalid input: {0}")]
    Validation(String),
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "no response".to_string(),
    }
}

impl Error {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Transport {
            status,
            message: message.into(),
        }
    }

    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Validation(_) => 2,
            Error::Authentication(_) => 3,
            Error::NotFound(_) => 4,
            Error::Transport { .. } => 5,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::transport(err.status().map(|s| s.as_u16()), err.to_string())
    }
}

/// Result type for astropost operations.
pub type Result<T> = std::result::Result<T, Error>;
