//! Error types for the agent runtime.
//!
//! The seven kinds below are the ones named by the error-handling design:
//! transport failures talking to the LLM or sandbox, malformed LLM
//! responses, bad tool/template input, misconfiguration, timeouts,
//! cancellation, and "no such tool/skill/session" lookups. Sentinel
//! content-type markers used by the stream postprocessors are routing
//! metadata, never errors.

use thiserror::Error;

/// Result type alias using our [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport failure talking to the LLM backend or a sandbox.
    #[error("transport error: {0}")]
    Transport(String),

    /// HTTP request error (reqwest-originated transport failure).
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed or unexpected response from the LLM backend (e.g. missing
    /// `choices`, unparseable streamed chunk).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bad tool arguments, unknown template placeholders in strict paths,
    /// bad multimodal payloads.
    #[error("validation error: {0}")]
    Validation(String),

    /// Mixing prompt modes, duplicate tool registration without an
    /// override, invalid runtime configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An LLM call, tool invocation, or hook handler exceeded its
    /// configured timeout.
    #[error("timeout")]
    Timeout,

    /// The operation was cancelled (interrupt, client disconnect).
    #[error("cancelled")]
    Cancellation,

    /// Unknown tool, unknown skill, or unknown memory session.
    #[error("not found: {0}")]
    NotFound(String),

    /// Catch-all for errors that don't fit the above kinds.
    #[error("error: {0}")]
    Other(String),
}

impl Error {
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    pub fn timeout() -> Self {
        Error::Timeout
    }

    pub fn cancelled() -> Self {
        Error::Cancellation
    }

    /// Stable, lowercase name of the error kind, used in HTTP error bodies
    /// and SSE terminal frames (`{error, session_id, timestamp}`).
    pub fn kind_name(&self) -> &'static str {
        match self {
            Error::Transport(_) | Error::Http(_) => "transport_error",
            Error::Protocol(_) => "protocol_error",
            Error::Json(_) => "protocol_error",
            Error::Validation(_) => "validation_error",
            Error::Configuration(_) => "configuration_error",
            Error::Timeout => "timeout_error",
            Error::Cancellation => "cancellation_error",
            Error::NotFound(_) => "not_found_error",
            Error::Other(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_config() {
        let err = Error::config("mixing prompt modes");
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(err.kind_name(), "configuration_error");
    }

    #[test]
    fn test_error_not_found() {
        let err = Error::not_found("tool 'search' is not registered");
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.kind_name(), "not_found_error");
    }

    #[test]
    fn test_error_timeout_and_cancellation() {
        assert_eq!(Error::timeout().kind_name(), "timeout_error");
        assert_eq!(Error::cancelled().kind_name(), "cancellation_error");
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn _ok() -> Result<i32> {
            Ok(42)
        }
        fn _err() -> Result<i32> {
            Err(Error::timeout())
        }
    }
}
