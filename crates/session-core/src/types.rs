//! Core types for session-core
//!
//! Identifiers, the session status machine, causes and the snapshot returned
//! by [`SessionHandle::info`](crate::SessionHandle::info).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rtcsip_dialog_core::DialogId;
use rtcsip_sip_core::{NameAddr, Request, Response, StatusCode};

use crate::errors::{Result, SessionError};

/// Registry key of a session: Call-ID plus the From tag of its INVITE
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub call_id: String,
    pub from_tag: String,
}

impl SessionKey {
    pub fn new(call_id: impl Into<String>, from_tag: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            from_tag: from_tag.into(),
        }
    }

    /// Candidate keys for a message seen inside a call: the From tag for
    /// messages sent by the INVITE originator, the To tag for the other side
    pub(crate) fn candidates(call_id: &str, from_tag: Option<&str>, to_tag: Option<&str>) -> Vec<Self> {
        [from_tag, to_tag]
            .into_iter()
            .flatten()
            .map(|tag| SessionKey::new(call_id, tag))
            .collect()
    }

    pub(crate) fn for_request(request: &Request) -> Vec<Self> {
        Self::candidates(&request.call_id, request.from_tag(), request.to_tag())
    }

    pub(crate) fn for_response(response: &Response) -> Vec<Self> {
        Self::candidates(&response.call_id, response.from_tag(), response.to_tag())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.call_id, self.from_tag)
    }
}

/// Session status
///
/// ```text
/// outgoing: Null → InviteSent → ProvisionalReceived → Confirmed → Terminated
/// incoming: Null → InviteReceived → WaitingForAnswer → WaitingForAck → Confirmed → Terminated
/// Canceled is reachable from every state before confirmation
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    Null,
    InviteSent,
    ProvisionalReceived,
    InviteReceived,
    WaitingForAnswer,
    WaitingForAck,
    Canceled,
    Terminated,
    Confirmed,
}

impl SessionStatus {
    /// Whether `next` is a legal successor. Staying in the same state is
    /// always allowed except for `Terminated`.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;

        if self == next {
            return self != Terminated;
        }
        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Null, InviteSent | InviteReceived | Canceled) => true,
            (InviteSent, ProvisionalReceived | Confirmed | Canceled) => true,
            (ProvisionalReceived, Confirmed | Canceled) => true,
            (InviteReceived, WaitingForAnswer | Canceled) => true,
            (WaitingForAnswer, WaitingForAck | Canceled) => true,
            (WaitingForAck, Confirmed) => true,
            _ => false,
        }
    }

    /// Validate and perform a transition
    pub fn transition(self, next: SessionStatus) -> Result<SessionStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(SessionError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Before the call was confirmed (failures report `Failed`, not `Ended`)
    pub fn is_early(self) -> bool {
        !matches!(self, SessionStatus::Confirmed | SessionStatus::Terminated)
    }

    pub fn is_terminated(self) -> bool {
        self == SessionStatus::Terminated
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Which side created the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// Who caused a session event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Originator {
    Local,
    Remote,
    System,
}

/// Why a session failed or ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cause {
    ConnectionError,
    RequestTimeout,
    SipFailureCode,
    InternalError,
    Busy,
    Rejected,
    Redirected,
    Unavailable,
    NotFound,
    AddressIncomplete,
    IncompatibleSdp,
    AuthenticationError,
    DialogError,
    WebRtcError,
    Canceled,
    NoAnswer,
    Expires,
    NoAck,
    UserDeniedMediaAccess,
    BadMediaDescription,
    Bye,
}

impl Cause {
    /// Cause for a final non-2xx response to the initial INVITE
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            300 | 301 | 302 | 305 | 380 => Cause::Redirected,
            486 | 600 => Cause::Busy,
            403 | 603 => Cause::Rejected,
            404 | 604 => Cause::NotFound,
            408 | 410 | 430 | 480 => Cause::Unavailable,
            484 => Cause::AddressIncomplete,
            488 | 606 => Cause::IncompatibleSdp,
            401 | 407 => Cause::AuthenticationError,
            _ => Cause::SipFailureCode,
        }
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Snapshot of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub key: SessionKey,
    pub direction: Direction,
    pub status: SessionStatus,
    pub local_identity: Option<NameAddr>,
    pub remote_identity: Option<NameAddr>,
    pub dialog: Option<DialogId>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub muted: bool,
    pub local_streams: Vec<String>,
    pub remote_streams: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionStatus::*;

    #[test]
    fn test_outgoing_path_is_legal() {
        let status = Null
            .transition(InviteSent)
            .and_then(|s| s.transition(ProvisionalReceived))
            .and_then(|s| s.transition(ProvisionalReceived))
            .and_then(|s| s.transition(Confirmed))
            .and_then(|s| s.transition(Terminated))
            .unwrap();
        assert_eq!(status, Terminated);
    }

    #[test]
    fn test_illegal_transitions_are_rejected() {
        assert!(matches!(
            Confirmed.transition(Canceled),
            Err(SessionError::InvalidTransition { from: Confirmed, to: Canceled })
        ));
        assert!(Terminated.transition(Terminated).is_err());
        assert!(Terminated.transition(Null).is_err());
        assert!(!WaitingForAnswer.can_transition_to(Confirmed));
        assert!(!InviteSent.can_transition_to(WaitingForAck));
        assert!(Canceled.can_transition_to(Terminated));
    }

    #[test]
    fn test_cause_mapping() {
        let cause = |code| Cause::from_status(StatusCode::from_u16(code).unwrap());
        assert_eq!(cause(302), Cause::Redirected);
        assert_eq!(cause(486), Cause::Busy);
        assert_eq!(cause(600), Cause::Busy);
        assert_eq!(cause(603), Cause::Rejected);
        assert_eq!(cause(604), Cause::NotFound);
        assert_eq!(cause(408), Cause::Unavailable);
        assert_eq!(cause(484), Cause::AddressIncomplete);
        assert_eq!(cause(606), Cause::IncompatibleSdp);
        assert_eq!(cause(407), Cause::AuthenticationError);
        assert_eq!(cause(500), Cause::SipFailureCode);
    }

    #[test]
    fn test_key_candidates_skip_missing_tags() {
        let keys = SessionKey::candidates("c1", Some("a"), None);
        assert_eq!(keys, vec![SessionKey::new("c1", "a")]);
        assert_eq!(SessionKey::candidates("c1", Some("a"), Some("b")).len(), 2);
    }
}
