//! Infrastructure-level errors: raw failures of the HTTP boundary
//!
//! These are never shown to users directly; the normalizer in
//! [`crate::application::error`] classifies them first.

use thiserror::Error;

/// A failed call to the platform API, as observed on the wire.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request never produced a response (DNS, TLS, connection reset, timeout).
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// Non-2xx response carrying a decodable error body.
    #[error("{message} (HTTP {status}, code {code})")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Non-2xx response whose body is not an error document.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// 2xx response whose body does not match the expected payload.
    #[error("cannot decode response (HTTP {status}): {source}")]
    Malformed {
        status: u16,
        #[source]
        source: serde_json::Error,
    },

    /// Request URL could not be built from the configured base URL.
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
}

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Client construction failures: raised before any network traffic.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("no access token configured: set PSDB_ACCESS_TOKEN or add `access_token` to the global config file")]
    MissingToken,

    #[error("access token contains characters that cannot be sent in a header")]
    InvalidToken,

    #[error("invalid API URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("cannot build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
