//! Error types for the Yandex Cloud REST client.

use thiserror::Error;

use crate::credentials::CredentialError;

/// Errors raised by the Yandex Cloud REST client.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum YandexApiError {
    /// Raised when the request never produced an HTTP response.
    #[error("request to {url} failed after {attempts} attempt(s): {message}")]
    Transport {
        /// Requested URL.
        url: String,
        /// Underlying error message.
        message: String,
        /// Attempts made, including retries.
        attempts: u32,
    },
    /// Raised when the API answers with a non-success status.
    #[error("{url} returned HTTP {status} (code {code}) after {attempts} attempt(s): {message}")]
    Api {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Provider error code, `0` when the body carries none.
        code: i32,
        /// Provider error message or raw body.
        message: String,
        /// Attempts made, including retries.
        attempts: u32,
    },
    /// Raised when a success response cannot be decoded.
    #[error("failed to decode response from {url}: {message}")]
    Decode {
        /// Requested URL.
        url: String,
        /// Decoder message.
        message: String,
    },
    /// Raised when no usable credential is available.
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    /// Raised when the endpoint override is not a valid URL.
    #[error("invalid API endpoint `{endpoint}`: {message}")]
    InvalidEndpoint {
        /// Endpoint as configured.
        endpoint: String,
        /// Parser message.
        message: String,
    },
}

impl YandexApiError {
    /// Returns the HTTP status for API errors.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
