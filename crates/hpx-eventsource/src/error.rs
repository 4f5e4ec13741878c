//! Error handling for the EventSource engine.
//!
//! Only construction, configuration and transport plumbing produce
//! [`EventSourceError`] values. Connectivity outcomes (fatal or recoverable)
//! are reported to the consumer as [`Notification::Error`] items instead.
//!
//! [`Notification::Error`]: crate::dispatch::Notification::Error

use thiserror::Error;

/// The main result type used throughout the crate.
pub type EventSourceResult<T> = Result<T, EventSourceError>;

/// Error type for EventSource construction, configuration and transports.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventSourceError {
    /// The stream URL could not be resolved to an absolute `http(s)` URL.
    #[error("Invalid URL: {message}")]
    InvalidUrl { message: String },

    /// A configuration value was rejected.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Network-level transport failure (connection refused, reset, ...).
    #[error("Network error: {message}")]
    Network { message: String },

    /// The server answered with a status other than `200 OK`.
    #[error("Invalid response status: {status}")]
    InvalidStatus { status: http::StatusCode },

    /// The server answered with a non `text/event-stream` content type.
    #[error("Invalid content type: {content_type:?}")]
    InvalidContentType { content_type: String },
}

impl From<url::ParseError> for EventSourceError {
    fn from(e: url::ParseError) -> Self {
        Self::invalid_url(e.to_string())
    }
}

impl EventSourceError {
    /// Create a URL construction error.
    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an invalid status error.
    pub fn invalid_status(status: http::StatusCode) -> Self {
        Self::InvalidStatus { status }
    }

    /// Create an invalid content type error.
    pub fn invalid_content_type(content_type: impl Into<String>) -> Self {
        Self::InvalidContentType {
            content_type: content_type.into(),
        }
    }

    /// Returns `true` if a connection failing with this error may be retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = EventSourceError::config("bad growth rate");
        assert!(matches!(err, EventSourceError::Config { .. }));

        let err = EventSourceError::network("connection reset");
        assert!(matches!(err, EventSourceError::Network { .. }));

        let err = EventSourceError::invalid_status(http::StatusCode::NO_CONTENT);
        assert_eq!(err.to_string(), "Invalid response status: 204 No Content");
    }

    #[test]
    fn test_only_network_errors_are_recoverable() {
        assert!(EventSourceError::network("reset").is_recoverable());
        assert!(!EventSourceError::invalid_status(http::StatusCode::INTERNAL_SERVER_ERROR)
            .is_recoverable());
        assert!(!EventSourceError::invalid_content_type("text/html").is_recoverable());
        assert!(!EventSourceError::invalid_url("relative").is_recoverable());
    }

    #[test]
    fn test_url_parse_error_maps_to_invalid_url() {
        let err: EventSourceError = url::Url::parse("not a url")
            .expect_err("should fail")
            .into();
        assert!(matches!(err, EventSourceError::InvalidUrl { .. }));
    }
}
