//! Events delivered to the application
//!
//! Each session owns an unbounded [`SessionEvent`] channel. The user agent
//! announces new incoming sessions with [`UserAgentEvent::NewSession`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use rtcsip_sip_core::StatusCode;

use crate::media::MediaStream;
use crate::session::SessionHandle;
use crate::types::{Cause, Originator};

/// Events produced by a session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A provisional response arrived (outgoing) or was sent (incoming)
    Progress {
        originator: Originator,
        status_code: StatusCode,
    },

    /// Media negotiation completed
    Started {
        originator: Originator,
        start_time: DateTime<Utc>,
    },

    /// The session never reached the confirmed state
    Failed {
        originator: Originator,
        cause: Cause,
        status_code: Option<StatusCode>,
        end_time: DateTime<Utc>,
    },

    /// A confirmed session ended
    Ended {
        originator: Originator,
        cause: Cause,
        end_time: DateTime<Utc>,
    },

    MediaStreamAdded {
        originator: Originator,
        stream: MediaStream,
    },

    MediaStreamRemoved {
        originator: Originator,
        stream: MediaStream,
    },

    Muted {
        originator: Originator,
    },

    Unmuted {
        originator: Originator,
    },

    /// A DTMF tone was sent or received
    NewDtmf {
        originator: Originator,
        tone: char,
        duration: Duration,
    },
}

impl SessionEvent {
    /// The terminal cause, for `Failed` and `Ended`
    pub fn cause(&self) -> Option<Cause> {
        match self {
            SessionEvent::Failed { cause, .. } | SessionEvent::Ended { cause, .. } => Some(*cause),
            _ => None,
        }
    }

    pub fn originator(&self) -> Originator {
        match self {
            SessionEvent::Progress { originator, .. }
            | SessionEvent::Started { originator, .. }
            | SessionEvent::Failed { originator, .. }
            | SessionEvent::Ended { originator, .. }
            | SessionEvent::MediaStreamAdded { originator, .. }
            | SessionEvent::MediaStreamRemoved { originator, .. }
            | SessionEvent::Muted { originator }
            | SessionEvent::Unmuted { originator }
            | SessionEvent::NewDtmf { originator, .. } => *originator,
        }
    }
}

/// Events produced by the user agent
#[derive(Debug)]
pub enum UserAgentEvent {
    /// An incoming INVITE was accepted for answering
    NewSession {
        originator: Originator,
        handle: SessionHandle,
        events: mpsc::UnboundedReceiver<SessionEvent>,
    },
}
