//! Error types for the analysis pipeline.

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;

/// Machine-distinguishable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Local input problem, never reached the network
    Validation,
    /// A request is already in flight
    Busy,
    /// The client is not configured to reach the service
    Configuration,
    /// Network failure, non-2xx status, or timeout
    Transport,
    /// The service answered with something that cannot be interpreted
    MalformedResponse,
    /// The request was aborted before it completed
    Cancelled,
}

impl ErrorKind {
    /// Get the display name for this kind.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Busy => "busy",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Transport => "transport",
            ErrorKind::MalformedResponse => "malformed-response",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

/// Errors produced while validating, submitting, or decoding an analysis.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// No file to analyze
    #[error("No image has been selected for analysis")]
    MissingInput,

    /// The candidate file is not an image
    #[error("'{file_name}' is not an image (declared type: {media_type})")]
    UnsupportedMediaType {
        /// Name of the rejected file
        file_name: String,
        /// Media type the file declared, or "unknown"
        media_type: String,
    },

    /// A side input failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Submit attempted while another request is pending
    #[error("An analysis is already in progress")]
    Busy,

    /// Required configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The request failed on the way to or from the service
    #[error("Analysis request failed: {message}")]
    Transport {
        /// HTTP status, when the service answered at all
        status: Option<u16>,
        /// Message extracted from the response or the transport
        message: String,
    },

    /// The service response could not be parsed
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The service returned a mask that is not a valid matrix
    #[error(transparent)]
    MalformedMatrix(#[from] mela_raster::RasterError),

    /// The request was aborted
    #[error("Analysis was cancelled")]
    Cancelled,
}

impl AnalysisError {
    /// Create a transport error with an optional status.
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingInput | Self::UnsupportedMediaType { .. } | Self::InvalidInput(_) => {
                ErrorKind::Validation
            }
            Self::Busy => ErrorKind::Busy,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::MalformedResponse(_) | Self::MalformedMatrix(_) => ErrorKind::MalformedResponse,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether this error was raised locally without contacting the service.
    pub fn is_local(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::Busy | ErrorKind::Configuration
        )
    }

    /// Single message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::MalformedMatrix(err) => format!("Malformed response: {}", err),
            other => other.to_string(),
        }
    }

    /// Whether re-invoking submit may succeed without changing the input.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Cancelled)
    }

    /// Kind and message together, for callers that only see serialized data.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind().name(),
            message: self.user_message(),
        }
    }
}

/// Serializable form of an [`AnalysisError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    /// [`ErrorKind::name`] of the error
    pub kind: &'static str,
    pub message: String,
}

impl From<ConfigError> for AnalysisError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

/// Result type alias for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;
