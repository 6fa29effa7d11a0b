//! # SIP Request
//!
//! The request model exchanged with the transaction layer. Messages are
//! already parsed when they reach the call-control core, so only the headers
//! the core reads or writes are typed; the rest live in [`Headers`].
//!
//! ```rust
//! use rtcsip_sip_core::{Method, NameAddr, SimpleRequestBuilder, Uri};
//!
//! let invite = SimpleRequestBuilder::new(Method::Invite, "sip:bob@example.com".parse().unwrap())
//!     .from(NameAddr::new("sip:alice@example.com".parse().unwrap()).with_tag("a1"))
//!     .to(NameAddr::new("sip:bob@example.com".parse().unwrap()))
//!     .cseq(1)
//!     .body("application/sdp", "v=0\r\n")
//!     .build()
//!     .unwrap();
//!
//! assert!(invite.has_sdp());
//! let cancel = invite.cancel_for(None);
//! assert_eq!(cancel.method, Method::Cancel);
//! assert_eq!(cancel.cseq.seq, invite.cseq.seq);
//! assert_eq!(cancel.via_branch, invite.via_branch);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use super::address::{CSeq, NameAddr};
use super::headers::{names, Headers};
use super::method::Method;
use super::uri::Uri;

/// Content type of session descriptions
pub const APPLICATION_SDP: &str = "application/sdp";

/// A message body together with its Content-Type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    pub content_type: String,
    pub content: String,
}

impl Body {
    pub fn new(content_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            content: content.into(),
        }
    }

    pub fn sdp(content: impl Into<String>) -> Self {
        Self::new(APPLICATION_SDP, content)
    }

    /// Content-Type match ignoring case and parameters
    pub fn is(&self, content_type: &str) -> bool {
        self.content_type
            .split(';')
            .next()
            .map(|mime| mime.trim().eq_ignore_ascii_case(content_type))
            .unwrap_or(false)
    }

    pub fn is_sdp(&self) -> bool {
        self.is(APPLICATION_SDP)
    }
}

/// A SIP request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    /// Branch parameter of the topmost Via; identifies the transaction
    pub via_branch: String,
    pub from: NameAddr,
    pub to: NameAddr,
    pub call_id: String,
    pub cseq: CSeq,
    pub contact: Option<Uri>,
    pub route: Vec<Uri>,
    pub record_route: Vec<Uri>,
    pub headers: Headers,
    pub body: Option<Body>,
}

impl Request {
    pub fn from_tag(&self) -> Option<&str> {
        self.from.tag()
    }

    pub fn to_tag(&self) -> Option<&str> {
        self.to.tag()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Whether a body is present at all
    pub fn has_body(&self) -> bool {
        self.body.as_ref().map(|b| !b.content.is_empty()).unwrap_or(false)
    }

    /// Whether the body is a session description
    pub fn has_sdp(&self) -> bool {
        self.has_body() && self.body.as_ref().map(Body::is_sdp).unwrap_or(false)
    }

    /// The SDP body, if the request carries one
    pub fn sdp(&self) -> Option<&str> {
        if self.has_sdp() {
            self.body.as_ref().map(|b| b.content.as_str())
        } else {
            None
        }
    }

    /// Value of the Expires header in seconds
    pub fn expires(&self) -> Option<u32> {
        self.header(names::EXPIRES)
            .and_then(|value| value.trim().parse().ok())
    }

    /// Build the CANCEL for this (INVITE) request.
    ///
    /// CANCEL shares Request-URI, Call-ID, From, To, CSeq number, Route set and
    /// Via branch with the request it cancels (RFC 3261 §9.1).
    pub fn cancel_for(&self, reason: Option<String>) -> Request {
        let mut headers = Headers::new();
        if let Some(reason) = reason {
            headers.push(names::REASON, reason);
        }
        Request {
            method: Method::Cancel,
            uri: self.uri.clone(),
            via_branch: self.via_branch.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            call_id: self.call_id.clone(),
            cseq: CSeq::new(self.cseq.seq, Method::Cancel),
            contact: None,
            route: self.route.clone(),
            record_route: Vec::new(),
            headers,
            body: None,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (Call-ID: {}, CSeq: {})",
            self.method, self.uri, self.call_id, self.cseq
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_content_type_matching() {
        assert!(Body::new("Application/SDP; charset=utf-8", "v=0").is_sdp());
        assert!(!Body::new("application/dtmf-relay", "Signal= 1").is_sdp());
        assert!(Body::new("application/dtmf-relay", "").is("application/dtmf-relay"));
    }
}
