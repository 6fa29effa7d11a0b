//! Error types for session-core
//!
//! [`SessionError`] is what callers of the session API see. Caller misuse
//! (bad argument, wrong state) is reported synchronously; protocol and media
//! failures after a command was accepted surface as `Failed`/`Ended` session
//! events instead.

use thiserror::Error;

use rtcsip_dialog_core::DialogError;
use rtcsip_sip_core::SipError;

use crate::ports::{MediaError, TransportError};
use crate::types::SessionStatus;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors that can occur in the session layer
#[derive(Debug, Error)]
pub enum SessionError {
    /// Operation issued from a state that does not allow it
    #[error("Invalid session state: {status}")]
    InvalidState { status: SessionStatus },

    /// Operation not available for this session
    #[error("Not supported: {message}")]
    NotSupported { message: String },

    /// Argument has the wrong shape or is out of range
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Illegal status transition
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    /// The session's event loop is gone
    #[error("Session terminated")]
    Terminated,

    /// Session already exists for this key
    #[error("Session already exists: {key}")]
    AlreadyExists { key: String },

    /// Dialog layer error
    #[error("Dialog error: {0}")]
    Dialog(#[from] DialogError),

    /// SIP message model error
    #[error("SIP error: {0}")]
    Sip(#[from] SipError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Media engine error
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl SessionError {
    /// Create an invalid state error
    pub fn invalid_state(status: SessionStatus) -> Self {
        Self::InvalidState { status }
    }

    /// Create a not supported error
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
