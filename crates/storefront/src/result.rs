//! Result and error types for the storefront page-object layer.

use std::time::Duration;

use thiserror::Error;

use crate::locator::Locator;
use crate::session::SessionError;

/// Result type for page-object operations
pub type StorefrontResult<T> = Result<T, StorefrontError>;

/// Errors raised by primitives and page objects.
///
/// "Must succeed" operations raise one of these; "may legitimately be absent"
/// queries return `false` or an empty collection instead.
#[derive(Debug, Error)]
pub enum StorefrontError {
    /// Locator resolved to zero elements within the timeout
    #[error("Element {locator} not found within {}ms", timeout.as_millis())]
    NotFound {
        /// Locator that was waited for
        locator: Locator,
        /// Timeout that was applied
        timeout: Duration,
    },

    /// Element found but not clickable/typeable within the timeout
    #[error("Element {target} not interactable within {}ms: {reason}", timeout.as_millis())]
    NotInteractable {
        /// Description of the locator or element
        target: String,
        /// Timeout that was applied
        timeout: Duration,
        /// Why the interaction was refused
        reason: String,
    },

    /// Navigation call failed
    #[error("Navigation to {url} failed: {message}")]
    NavigationError {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// No JavaScript dialog appeared within the timeout
    #[error("No alert present within {}ms", timeout.as_millis())]
    AlertAbsent {
        /// Timeout that was applied
        timeout: Duration,
    },

    /// Frame element missing or not switchable within the timeout
    #[error("Frame {locator} not available within {}ms", timeout.as_millis())]
    FrameNotFound {
        /// Locator of the frame element
        locator: Locator,
        /// Timeout that was applied
        timeout: Duration,
    },

    /// Unrecognized browser kind, environment, or backend
    #[error("Unsupported configuration: {message}")]
    UnsupportedConfiguration {
        /// Error message
        message: String,
    },

    /// Dropdown or option list has no matching entry
    #[error("Option '{option}' not found in {locator}")]
    OptionNotFound {
        /// Locator of the option container
        locator: Locator,
        /// Requested option text or value
        option: String,
    },

    /// Indexed access past the end of a list of elements
    #[error("{what} index {index} out of range (found {len})")]
    IndexOutOfRange {
        /// What was indexed
        what: &'static str,
        /// Requested index
        index: usize,
        /// Number of elements found
        len: usize,
    },

    /// Page text that could not be interpreted
    #[error("Invalid {what}: '{value}'")]
    InvalidValue {
        /// What was being parsed
        what: &'static str,
        /// Raw value read from the page
        value: String,
    },

    /// Configuration file or override could not be used
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Test data file could not be used
    #[error("Product data error: {message}")]
    Catalog {
        /// Error message
        message: String,
    },

    /// Error reported by the browser session
    #[error(transparent)]
    Session(#[from] SessionError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorefrontError {
    /// Whether this failure came from a bounded wait running out
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::NotInteractable { .. }
                | Self::AlertAbsent { .. }
                | Self::FrameNotFound { .. }
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_locator_and_timeout() {
        let err = StorefrontError::NotFound {
            locator: Locator::css(".cart-item"),
            timeout: Duration::from_millis(1500),
        };
        let message = err.to_string();
        assert!(message.contains("css selector \".cart-item\""));
        assert!(message.contains("1500ms"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_session_error_is_transparent() {
        let err = StorefrontError::from(SessionError::NoAlert);
        assert_eq!(err.to_string(), SessionError::NoAlert.to_string());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_index_out_of_range_message() {
        let err = StorefrontError::IndexOutOfRange {
            what: "related product",
            index: 4,
            len: 2,
        };
        assert_eq!(err.to_string(), "related product index 4 out of range (found 2)");
    }
}
