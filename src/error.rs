//! Error types for Tidemark
//!
//! This module defines the error hierarchy for the entire engine.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! Classification matters more than formatting here: the retry policy
//! decides by error *type* (never by message text) whether an operation
//! is worth another attempt, so every variant carries enough structure
//! for `is_retryable` to answer without string matching.

use thiserror::Error;

/// The main error type for Tidemark
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Authentication / Setup Errors
    // ============================================================================
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    // ============================================================================
    // Transport Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // Provider Errors
    // ============================================================================
    /// A structured error returned in the provider's response body.
    ///
    /// `code`/`subcode` identify the condition; `transient` is the
    /// provider's own hint that a retry may succeed.
    #[error("API error {code}{}: {message}", .subcode.map(|s| format!("/{s}")).unwrap_or_default())]
    Api {
        code: i64,
        subcode: Option<i64>,
        message: String,
        transient: bool,
    },

    /// Retryable failures kept failing until the attempt budget ran out.
    #[error("Retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    // ============================================================================
    // Data Processing Errors
    // ============================================================================
    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    // ============================================================================
    // State Errors
    // ============================================================================
    #[error("State error: {message}")]
    State { message: String },

    // ============================================================================
    // Stream Errors
    // ============================================================================
    #[error("Stream '{stream}' not found")]
    StreamNotFound { stream: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a provider API error
    pub fn api(code: i64, subcode: Option<i64>, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            subcode,
            message: message.into(),
            transient: false,
        }
    }

    /// Create a transient provider API error
    pub fn api_transient(code: i64, subcode: Option<i64>, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            subcode,
            message: message.into(),
            transient: true,
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Create a stream-not-found error
    pub fn stream_not_found(stream: impl Into<String>) -> Self {
        Self::StreamNotFound {
            stream: stream.into(),
        }
    }

    /// Provider error code, if this is a provider API error
    pub fn api_error_code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Provider error subcode, if this is a provider API error
    pub fn api_error_subcode(&self) -> Option<i64> {
        match self {
            Self::Api { subcode, .. } => *subcode,
            _ => None,
        }
    }

    /// Check if this error is retryable
    ///
    /// Matched by type, never by message text. Transport failures and
    /// server-side statuses are transient; provider errors only when the
    /// provider flags them so or uses a known throttling code.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) => true,
            Error::HttpStatus { status, .. } => is_retryable_status(*status),
            Error::Api {
                code, transient, ..
            } => *transient || is_throttling_code(*code),
            _ => false,
        }
    }
}

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Provider-level throttling codes that behave like a 429
fn is_throttling_code(code: i64) -> bool {
    matches!(code, 1 | 2 | 4 | 17 | 32 | 341 | 613)
}

/// Result type alias for Tidemark
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("test message");
        assert_eq!(err.to_string(), "Configuration error: test message");

        let err = Error::missing_field("access_token");
        assert_eq!(
            err.to_string(),
            "Missing required config field: access_token"
        );

        let err = Error::http_status(404, "Not found");
        assert_eq!(err.to_string(), "HTTP 404: Not found");

        let err = Error::api(10, None, "Not enough viewers");
        assert_eq!(err.to_string(), "API error 10: Not enough viewers");

        let err = Error::api(100, Some(2_108_006), "Media posted before");
        assert_eq!(err.to_string(), "API error 100/2108006: Media posted before");
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::http_status(429, "").is_retryable());
        assert!(Error::http_status(500, "").is_retryable());
        assert!(Error::http_status(503, "").is_retryable());

        assert!(!Error::http_status(400, "").is_retryable());
        assert!(!Error::http_status(401, "").is_retryable());
        assert!(!Error::http_status(404, "").is_retryable());
        assert!(!Error::config("test").is_retryable());
    }

    #[test]
    fn test_api_error_classification() {
        // provider says transient
        assert!(Error::api_transient(100, None, "").is_retryable());
        // known throttling codes
        assert!(Error::api(4, None, "too many calls").is_retryable());
        assert!(Error::api(613, None, "rate limited").is_retryable());
        // permanent provider errors
        assert!(!Error::api(100, Some(33), "unsupported request").is_retryable());
        assert!(!Error::api(10, None, "not enough viewers").is_retryable());
    }

    #[test]
    fn test_retries_exhausted_not_retryable() {
        let err = Error::RetriesExhausted {
            attempts: 7,
            source: Box::new(Error::http_status(500, "")),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Retries exhausted after 7 attempts");
    }

    #[test]
    fn test_api_error_accessors() {
        let err = Error::api(100, Some(2_108_006), "old media");
        assert_eq!(err.api_error_code(), Some(100));
        assert_eq!(err.api_error_subcode(), Some(2_108_006));
        assert_eq!(Error::config("x").api_error_code(), None);
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::config("inner"));
        let with_context = result.context("outer");
        assert!(with_context
            .unwrap_err()
            .to_string()
            .contains("outer: Configuration error: inner"));
    }
}
