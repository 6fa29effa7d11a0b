use thiserror::Error;

use rtcsip_sip_core::SipError;

use crate::dialog::DialogState;

/// Result type for dialog operations
pub type DialogResult<T> = Result<T, DialogError>;

/// Errors raised while creating or using a dialog
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialogError {
    /// The peer gave no Contact, so in-dialog requests cannot be routed
    #[error("Missing Contact in {context}")]
    MissingContact { context: String },

    /// A tag needed for the dialog identity is absent
    #[error("Missing {header} tag")]
    MissingTag { header: &'static str },

    /// Operation not allowed in the dialog's current state
    #[error("Invalid dialog state {state:?} for {operation}")]
    InvalidState {
        state: DialogState,
        operation: String,
    },

    /// An in-dialog request arrived with a CSeq lower than the last one seen
    #[error("CSeq out of order: received {received}, last {last}")]
    CSeqOutOfOrder { received: u32, last: u32 },

    /// Message model error
    #[error("SIP error: {0}")]
    Sip(#[from] SipError),
}

impl DialogError {
    /// Create a missing contact error
    pub fn missing_contact(context: impl Into<String>) -> Self {
        Self::MissingContact {
            context: context.into(),
        }
    }

    /// Create a missing tag error
    pub fn missing_tag(header: &'static str) -> Self {
        Self::MissingTag { header }
    }

    /// Create an invalid state error
    pub fn invalid_state(state: DialogState, operation: impl Into<String>) -> Self {
        Self::InvalidState {
            state,
            operation: operation.into(),
        }
    }
}
