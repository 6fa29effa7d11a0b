//! Ports to the collaborators the session drives
//!
//! - [`Transport`]: the SIP transaction/transport layer
//! - [`MediaEngine`]: offer/answer negotiation and local media

pub mod media;
pub mod transport;

pub use media::{MediaConstraints, MediaEngine, MediaEngineFactory, MediaError, SdpKind};
pub use transport::{Transport, TransportError};
