//! # SIP Response
//!
//! Responses are always derived from the request they answer: Via branch,
//! From, To, Call-ID, CSeq and Record-Route are copied per RFC 3261 §8.2.6.2.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::address::{CSeq, NameAddr};
use super::headers::Headers;
use super::sip_request::{Body, Request};
use super::status::StatusCode;
use super::uri::Uri;

/// A SIP response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: StatusCode,
    pub reason: String,
    pub via_branch: String,
    pub from: NameAddr,
    pub to: NameAddr,
    pub call_id: String,
    pub cseq: CSeq,
    pub contact: Option<Uri>,
    pub record_route: Vec<Uri>,
    pub headers: Headers,
    pub body: Option<Body>,
}

impl Response {
    /// Create a response to `request` with the default reason phrase
    pub fn from_request(request: &Request, status: StatusCode) -> Self {
        Self {
            status,
            reason: status.reason_phrase().to_string(),
            via_branch: request.via_branch.clone(),
            from: request.from.clone(),
            to: request.to.clone(),
            call_id: request.call_id.clone(),
            cseq: request.cseq.clone(),
            contact: None,
            record_route: request.record_route.clone(),
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Set the To tag unless the request already carried one
    pub fn with_to_tag(mut self, tag: impl Into<String>) -> Self {
        if self.to.tag.is_none() {
            self.to.tag = Some(tag.into());
        }
        self
    }

    pub fn with_contact(mut self, contact: Uri) -> Self {
        self.contact = Some(contact);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    pub fn from_tag(&self) -> Option<&str> {
        self.from.tag()
    }

    pub fn to_tag(&self) -> Option<&str> {
        self.to.tag()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Whether a non-empty body is present
    pub fn has_body(&self) -> bool {
        self.body.as_ref().map(|b| !b.content.is_empty()).unwrap_or(false)
    }

    /// The SDP body, if the response carries a non-empty one
    pub fn sdp(&self) -> Option<&str> {
        self.body
            .as_ref()
            .filter(|b| b.is_sdp() && !b.content.is_empty())
            .map(|b| b.content.as_str())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (Call-ID: {}, CSeq: {})",
            self.status.as_u16(),
            self.reason,
            self.call_id,
            self.cseq
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, SimpleRequestBuilder};

    fn invite() -> Request {
        SimpleRequestBuilder::new(Method::Invite, "sip:bob@example.com".parse().unwrap())
            .from(NameAddr::new("sip:alice@example.com".parse().unwrap()).with_tag("from1"))
            .to(NameAddr::new("sip:bob@example.com".parse().unwrap()))
            .cseq(7)
            .build()
            .unwrap()
    }

    #[test]
    fn test_response_copies_transaction_identity() {
        let request = invite();
        let response = Response::from_request(&request, StatusCode::RINGING).with_to_tag("to1");
        assert_eq!(response.via_branch, request.via_branch);
        assert_eq!(response.call_id, request.call_id);
        assert_eq!(response.cseq, request.cseq);
        assert_eq!(response.from_tag(), Some("from1"));
        assert_eq!(response.to_tag(), Some("to1"));
        assert_eq!(response.reason, "Ringing");
    }

    #[test]
    fn test_existing_to_tag_is_kept() {
        let mut request = invite();
        request.to.tag = Some("established".into());
        let response = Response::from_request(&request, StatusCode::OK).with_to_tag("other");
        assert_eq!(response.to_tag(), Some("established"));
    }

    #[test]
    fn test_sdp_requires_matching_content_type() {
        let response = Response::from_request(&invite(), StatusCode::OK)
            .with_body(Body::new("text/plain", "v=0"));
        assert_eq!(response.sdp(), None);
        let response = Response::from_request(&invite(), StatusCode::OK).with_body(Body::sdp("v=0"));
        assert_eq!(response.sdp(), Some("v=0"));
    }
}
