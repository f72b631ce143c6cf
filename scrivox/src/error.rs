use std::fmt;

use crate::speech::controller::PlaybackState;

pub type Result<T> = std::result::Result<T, Error>;

/// Playback operations that are guarded by the controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Pause,
    Resume,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operation::Pause => f.write_str("pause"),
            Operation::Resume => f.write_str("resume"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// There is no usable text to read or export.
    #[error("No text available to read.")]
    NoText,

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: Operation,
        state: PlaybackState,
    },

    /// The OCR collaborator failed. The payload is the diagnostic detail, not
    /// what the user should see; see [`Error::user_message`].
    #[error("OCR processing failed: {0}")]
    UpstreamFailure(String),

    #[error("speech engine error: {0}")]
    Engine(String),

    #[error("invalid speech rate {0}: must be a positive number")]
    InvalidRate(f32),

    #[error("unsupported language code '{0}' (expected one of en, es, fr, de, it)")]
    UnsupportedLanguage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Error::UpstreamFailure(_) => {
                "An error occurred during the OCR process. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Upstream failures are transient from the user's point of view.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::UpstreamFailure(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::UpstreamFailure(err.to_string())
    }
}
