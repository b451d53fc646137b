use serde::Deserialize;
use thiserror::Error;

/// Message used when the identity provider gives no reason for a failure
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred!";

#[derive(Error, Debug)]
pub enum ApiError {
    /// Rejection reported by the identity provider, message passed through verbatim
    #[error("{0}")]
    Provider(String),

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl ApiError {
    /// Build an error from a failed response body of the form
    /// `{ "error": { "message": "..." } }`.
    pub fn from_body(body: &str) -> Self {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .ok()
            .and_then(|envelope| envelope.error)
            .and_then(|error| error.message)
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string());
        ApiError::Provider(message)
    }
}
