//! Error types for the SIP message model

use thiserror::Error;

/// Result type for SIP message operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or inspecting SIP messages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A URI could not be interpreted
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// A status code outside 100..=699
    #[error("Invalid status code: {0}")]
    InvalidStatusCode(u16),

    /// A method token that is empty or contains whitespace
    #[error("Invalid method: {0}")]
    InvalidMethod(String),

    /// A header required by the operation is absent
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    /// A header value could not be interpreted
    #[error("Invalid {header} header: {value}")]
    InvalidHeader { header: &'static str, value: String },
}

impl Error {
    /// Create an invalid URI error
    pub fn invalid_uri(uri: impl Into<String>) -> Self {
        Self::InvalidUri(uri.into())
    }

    /// Create an invalid header error
    pub fn invalid_header(header: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidHeader {
            header,
            value: value.into(),
        }
    }
}
