//! Error types for the try-on client

use thiserror::Error;

/// Result type alias using the client Error
pub type Result<T> = std::result::Result<T, Error>;

/// Message shown when a request fails without a usable backend detail
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// Message shown when submit is attempted with an empty slot
pub const MISSING_IMAGES_MESSAGE: &str = "both images required";

/// Client error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Preview {0} was already released")]
    PreviewReleased(u64),
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

/// Coarse classification of a failed generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    Network,
    Backend,
}

/// Why a generation ended in the `Failed` phase
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TryOnFailure {
    #[error("both images required")]
    MissingImages,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend returned status {status}")]
    Backend { status: u16, detail: Option<String> },

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),
}

impl TryOnFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            TryOnFailure::MissingImages => FailureKind::Validation,
            TryOnFailure::Network(_) => FailureKind::Network,
            TryOnFailure::Backend { .. } | TryOnFailure::MalformedResponse(_) => {
                FailureKind::Backend
            }
        }
    }

    /// Text stored as the session's error message.
    ///
    /// A backend detail is surfaced verbatim; everything else apart from
    /// validation collapses to the generic message.
    pub fn user_message(&self) -> String {
        match self {
            TryOnFailure::MissingImages => MISSING_IMAGES_MESSAGE.to_string(),
            TryOnFailure::Backend {
                detail: Some(detail),
                ..
            } if !detail.is_empty() => detail.clone(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_detail_is_verbatim() {
        let failure = TryOnFailure::Backend {
            status: 500,
            detail: Some("model overloaded".to_string()),
        };
        assert_eq!(failure.user_message(), "model overloaded");
        assert_eq!(failure.kind(), FailureKind::Backend);
    }

    #[test]
    fn test_fallback_messages() {
        let empty = TryOnFailure::Backend {
            status: 502,
            detail: Some(String::new()),
        };
        assert_eq!(empty.user_message(), GENERIC_FAILURE_MESSAGE);

        let network = TryOnFailure::Network("connection refused".to_string());
        assert_eq!(network.user_message(), GENERIC_FAILURE_MESSAGE);
        assert_eq!(network.kind(), FailureKind::Network);

        assert_eq!(TryOnFailure::MissingImages.user_message(), "both images required");
        assert_eq!(TryOnFailure::MissingImages.kind(), FailureKind::Validation);
    }
}
