//! # rtcsip-session-core
//!
//! Call control for SIP INVITE sessions: the offer/answer exchange, early
//! and confirmed dialogs, cancellation, re-INVITE, DTMF over INFO and the
//! timers that bound every wait.
//!
//! The crate sits between an external SIP transaction/transport layer and
//! an external media engine, both reached through the traits in [`ports`].
//! A [`UserAgent`] owns the sessions; each session runs as its own task and
//! is driven through a [`SessionHandle`]:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rtcsip_session_core::prelude::*;
//!
//! # async fn run(transport: Arc<dyn Transport>, media: Arc<dyn MediaEngineFactory>) -> Result<()> {
//! let config = UserAgentConfig::new("sip:alice@example.com".parse()?);
//! let (agent, mut incoming) = UserAgent::new(config, transport, media)?;
//!
//! let (call, mut events) = agent.call("bob", CallOptions::default()).await?;
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::Started { .. } = event {
//!         call.send_dtmf("1234#", DtmfOptions::default()).await?;
//!         call.terminate(TerminateOptions::default()).await?;
//!     }
//! }
//!
//! if let Some(UserAgentEvent::NewSession { handle, .. }) = incoming.recv().await {
//!     handle.answer(AnswerOptions::default()).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod events;
pub mod logging;
pub mod media;
pub mod ports;
pub mod registry;
pub mod session;
pub mod types;
pub mod user_agent;

pub use config::{DtmfSettings, LogSettings, UserAgentConfig};
pub use errors::{Result, SessionError};
pub use events::{SessionEvent, UserAgentEvent};
pub use logging::setup_logging;
pub use media::{MediaStream, MediaTrack, TrackKind};
pub use ports::{
    MediaConstraints, MediaEngine, MediaEngineFactory, MediaError, SdpKind, Transport,
    TransportError,
};
pub use registry::{SessionLifecycle, SessionRegistry};
pub use session::{
    AnswerOptions, CallOptions, DtmfOptions, ReinviteOptions, SessionHandle, TerminateOptions,
    TimerKind, DTMF_CONTENT_TYPE,
};
pub use types::{Cause, Direction, Originator, SessionInfo, SessionKey, SessionStatus};
pub use user_agent::UserAgent;

pub use rtcsip_dialog_core::TimerSettings;

pub mod prelude {
    pub use crate::{
        AnswerOptions, CallOptions, Cause, Direction, DtmfOptions, MediaConstraints, MediaEngine,
        MediaEngineFactory, MediaError, MediaStream, Originator, ReinviteOptions, Result,
        SessionError, SessionEvent, SessionHandle, SessionStatus, TerminateOptions, Transport,
        TransportError, UserAgent, UserAgentConfig, UserAgentEvent,
    };
}
