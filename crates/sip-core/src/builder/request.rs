use crate::error::{Error, Result};
use crate::types::{Body, CSeq, Headers, Method, NameAddr, Request, Uri};
use crate::utils::{generate_branch, generate_call_id};

/// Builder for out-of-dialog and in-dialog requests.
///
/// From and To are mandatory; a Call-ID and Via branch are generated when not
/// supplied.
#[derive(Debug, Clone)]
pub struct SimpleRequestBuilder {
    method: Method,
    uri: Uri,
    via_branch: Option<String>,
    from: Option<NameAddr>,
    to: Option<NameAddr>,
    call_id: Option<String>,
    cseq: u32,
    contact: Option<Uri>,
    route: Vec<Uri>,
    headers: Headers,
    body: Option<Body>,
}

impl SimpleRequestBuilder {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            via_branch: None,
            from: None,
            to: None,
            call_id: None,
            cseq: 1,
            contact: None,
            route: Vec::new(),
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn from(mut self, from: NameAddr) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: NameAddr) -> Self {
        self.to = Some(to);
        self
    }

    pub fn call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    pub fn via_branch(mut self, branch: impl Into<String>) -> Self {
        self.via_branch = Some(branch.into());
        self
    }

    pub fn cseq(mut self, seq: u32) -> Self {
        self.cseq = seq;
        self
    }

    pub fn contact(mut self, contact: Uri) -> Self {
        self.contact = Some(contact);
        self
    }

    pub fn route(mut self, route: Vec<Uri>) -> Self {
        self.route = route;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers.extend(
            headers
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string())),
        );
        self
    }

    pub fn body(mut self, content_type: impl Into<String>, content: impl Into<String>) -> Self {
        self.body = Some(Body::new(content_type, content));
        self
    }

    pub fn maybe_body(mut self, body: Option<Body>) -> Self {
        self.body = body;
        self
    }

    pub fn build(self) -> Result<Request> {
        let from = self.from.ok_or(Error::MissingHeader("From"))?;
        let to = self.to.ok_or(Error::MissingHeader("To"))?;
        Ok(Request {
            cseq: CSeq::new(self.cseq, self.method.clone()),
            method: self.method,
            uri: self.uri,
            via_branch: self.via_branch.unwrap_or_else(generate_branch),
            from,
            to,
            call_id: self.call_id.unwrap_or_else(generate_call_id),
            contact: self.contact,
            route: self.route,
            record_route: Vec::new(),
            headers: self.headers,
            body: self.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(uri: &str) -> NameAddr {
        NameAddr::new(uri.parse().unwrap())
    }

    #[test]
    fn test_build_requires_from_and_to() {
        let uri: Uri = "sip:bob@example.com".parse().unwrap();
        let err = SimpleRequestBuilder::new(Method::Invite, uri.clone())
            .to(addr("sip:bob@example.com"))
            .build()
            .unwrap_err();
        assert_eq!(err, Error::MissingHeader("From"));

        let err = SimpleRequestBuilder::new(Method::Invite, uri)
            .from(addr("sip:alice@example.com"))
            .build()
            .unwrap_err();
        assert_eq!(err, Error::MissingHeader("To"));
    }

    #[test]
    fn test_generated_identifiers() {
        let request = SimpleRequestBuilder::new(Method::Bye, "sip:bob@example.com".parse().unwrap())
            .from(addr("sip:alice@example.com"))
            .to(addr("sip:bob@example.com"))
            .cseq(3)
            .header("Reason", "SIP ;cause=200 ;text=\"OK\"")
            .build()
            .unwrap();
        assert!(request.via_branch.starts_with("z9hG4bK"));
        assert!(!request.call_id.is_empty());
        assert_eq!(request.cseq, CSeq::new(3, Method::Bye));
        assert_eq!(request.header("reason"), Some("SIP ;cause=200 ;text=\"OK\""));
    }
}
