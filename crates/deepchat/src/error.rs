use std::string::FromUtf8Error;

use thiserror::Error;

/// Error types that can occur when interacting with model providers.
#[derive(Error, Debug)]
pub enum LLMError {
    /// A wrapper for a generic, user-created error message.
    #[error("Generic Error: {0}")]
    GenericError(String),

    /// A wrapper for provider-specific error messages.
    #[error("LLM Provider Error: {0}")]
    ProviderError(String),

    /// A wrapper for authentication/authorization errors.
    #[error("Auth Error: {0}")]
    AuthError(String),

    /// No backend has credentials configured.
    #[error("Missing API configuration: {0}")]
    MissingConfiguration(String),

    /// Errors related to malformed requests.
    #[error("Invalid Request: {0}")]
    InvalidRequest(String),

    /// Errors related to malformed response bodies.
    #[error("Response Format Error: {message}. Raw response: '{raw_response}'")]
    ResponseFormatError {
        message: String,
        raw_response: String,
    },

    #[error("HTTP Error: {0}")]
    HttpError(String),

    #[error("Not Implemented: {0}")]
    NotImplemented(String),

    /// Handles JSON serialization and deserialization errors.
    #[error("JSON Error")]
    JsonError(#[from] serde_json::Error),

    /// Handles errors from parsing URLs.
    #[error("Invalid URL")]
    InvalidUrl(#[from] url::ParseError),

    /// Handles standard I/O errors.
    #[error("I/O Error")]
    IoError(#[from] std::io::Error),
}

impl From<reqwest::Error> for LLMError {
    fn from(err: reqwest::Error) -> Self {
        LLMError::HttpError(err.to_string())
    }
}

impl From<http::Error> for LLMError {
    fn from(err: http::Error) -> Self {
        LLMError::HttpError(err.to_string())
    }
}

impl From<FromUtf8Error> for LLMError {
    fn from(value: FromUtf8Error) -> Self {
        LLMError::GenericError(format!("Error decoding string: {:#}", value))
    }
}

/// Maps a non-success provider status to the matching [`LLMError`].
///
/// Returns `Ok(())` for 2xx responses so callers can `?` it before parsing.
pub fn check_status(status: http::StatusCode, body: &[u8]) -> Result<(), LLMError> {
    if status.is_success() {
        return Ok(());
    }
    let text = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.pointer("/error/message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
    Err(match status.as_u16() {
        401 | 403 => LLMError::AuthError(text),
        400 | 404 | 422 => LLMError::InvalidRequest(text),
        429 => LLMError::ProviderError(format!("rate limited: {text}")),
        _ => LLMError::ProviderError(format!("HTTP {}: {}", status.as_u16(), text)),
    })
}
