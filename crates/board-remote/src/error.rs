//! Error types for board-remote

use thiserror::Error;

/// Errors from the source-control and build-server clients
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Non-success HTTP status
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    /// Connection, TLS or timeout failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body did not match the expected shape
    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// Response decoded but is semantically unusable
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Client could not be built from its configuration
    #[error("Remote client not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Transport(err.to_string())
    }
}

/// Result type for remote calls
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_display_names_status_and_url() {
        let err = RemoteError::Http {
            status: 404,
            url: "https://scm/rest/api/latest/projects".to_string(),
            body: "not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "HTTP 404 from https://scm/rest/api/latest/projects: not found"
        );
    }
}
