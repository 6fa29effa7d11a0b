use async_trait::async_trait;
use thiserror::Error;

use rtcsip_sip_core::{Request, Response};

/// Errors reported by the transport when a message could not be handed over
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection to the next hop failed
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    /// The transport was shut down
    #[error("Transport closed")]
    Closed,
}

impl TransportError {
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }
}

/// SIP transaction/transport layer.
///
/// Requests are handed over with [`send_request`](Transport::send_request);
/// their responses, transport errors and timeouts come back through
/// [`UserAgent`](crate::UserAgent). Responses to requests we received go out
/// with [`send_response`](Transport::send_response), whose result is the
/// delivery confirmation.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send_request(&self, request: Request) -> Result<(), TransportError>;

    async fn send_response(&self, response: Response) -> Result<(), TransportError>;
}
