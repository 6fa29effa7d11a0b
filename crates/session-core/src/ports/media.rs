use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::media::MediaStream;
use crate::session::SessionHandle;

/// Errors reported by the media engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// The user or platform refused access to capture devices
    #[error("Media access denied: {message}")]
    AccessDenied { message: String },

    /// An offer or answer could not be produced or applied
    #[error("Negotiation failed: {message}")]
    Negotiation { message: String },

    /// A stream could not be attached or detached
    #[error("Stream error: {message}")]
    Stream { message: String },

    /// The engine was already closed
    #[error("Media engine closed")]
    Closed,
}

impl MediaError {
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    pub fn negotiation(message: impl Into<String>) -> Self {
        Self::Negotiation {
            message: message.into(),
        }
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }
}

/// Role of a remote session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// What local media to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

impl MediaConstraints {
    pub fn audio_only() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }
}

/// Offer/answer engine owned by one session.
///
/// Every call may take long (ICE gathering); the session never blocks its
/// event loop on them.
#[async_trait]
pub trait MediaEngine: Send + Sync + 'static {
    /// Capture local media
    async fn acquire_local_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, MediaError>;

    /// Attach a local stream to the negotiation
    async fn add_stream(&self, stream: &MediaStream) -> Result<(), MediaError>;

    /// Detach a local stream
    async fn remove_stream(&self, stream: &MediaStream) -> Result<(), MediaError>;

    /// Produce a local offer SDP
    async fn create_offer(&self) -> Result<String, MediaError>;

    /// Produce a local answer SDP for the applied remote offer
    async fn create_answer(&self) -> Result<String, MediaError>;

    /// Apply a remote offer or answer
    async fn apply_remote(&self, kind: SdpKind, sdp: &str) -> Result<(), MediaError>;

    /// Release every media resource
    async fn close(&self);
}

/// Creates one [`MediaEngine`] per session.
///
/// The handle lets the engine report remote streams through
/// [`SessionHandle::remote_stream_added`] and
/// [`SessionHandle::remote_stream_removed`].
pub trait MediaEngineFactory: Send + Sync + 'static {
    fn create_engine(&self, session: &SessionHandle) -> Arc<dyn MediaEngine>;
}
