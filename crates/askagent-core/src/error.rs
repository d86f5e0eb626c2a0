use std::path::PathBuf;

use thiserror::Error;

/// Core error type for askagent.
#[derive(Debug, Error)]
pub enum AskAgentError {
    #[error("question must not be empty")]
    EmptyQuestion,
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AskAgentError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }
}

/// Failure of the single-shot call to the language-model backend.
///
/// Never retried: the controller turns it into a terminal, user-visible answer.
#[derive(Debug, Clone, Error)]
pub enum ModelInvocationError {
    #[error("model request failed: {0}")]
    Request(String),
    #[error("malformed model response: {0}")]
    MalformedResponse(String),
}

impl ModelInvocationError {
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request(message.into())
    }
}

/// Failure reported by a search backend. Absorbed by the search adapter.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search provider http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("search transport error: {0}")]
    Transport(String),
    #[error("malformed search response: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_error_display_is_distinguishable() {
        let err = ModelInvocationError::request("rate limited");
        assert_eq!(err.to_string(), "model request failed: rate limited");

        let err = ModelInvocationError::MalformedResponse("no choices".into());
        assert!(err.to_string().starts_with("malformed model response"));
    }

    #[test]
    fn config_io_keeps_path() {
        let err = AskAgentError::config_io(
            PathBuf::from("askagent.toml"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("askagent.toml"));
    }
}
