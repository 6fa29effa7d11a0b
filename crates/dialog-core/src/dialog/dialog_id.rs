use std::fmt;

use serde::{Deserialize, Serialize};

use rtcsip_sip_core::{Request, Response};

use crate::errors::{DialogError, DialogResult};

/// Identity of a dialog: Call-ID plus local and remote tag (RFC 3261 §12)
///
/// Keys never change once built. Promoting an early dialog re-inserts it under
/// the key computed from the final response instead of mutating the old key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DialogId {
    pub call_id: String,
    pub local_tag: String,
    pub remote_tag: String,
}

impl DialogId {
    pub fn new(
        call_id: impl Into<String>,
        local_tag: impl Into<String>,
        remote_tag: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            local_tag: local_tag.into(),
            remote_tag: remote_tag.into(),
        }
    }

    /// Key of the dialog a response to our request belongs to
    pub fn for_uac(response: &Response) -> DialogResult<Self> {
        let local_tag = response
            .from_tag()
            .ok_or_else(|| DialogError::missing_tag("From"))?;
        let remote_tag = response
            .to_tag()
            .ok_or_else(|| DialogError::missing_tag("To"))?;
        Ok(Self::new(response.call_id.clone(), local_tag, remote_tag))
    }

    /// Key of the dialog an incoming request establishes, given our To tag
    pub fn for_uas(request: &Request, local_tag: &str) -> DialogResult<Self> {
        let remote_tag = request
            .from_tag()
            .ok_or_else(|| DialogError::missing_tag("From"))?;
        Ok(Self::new(request.call_id.clone(), local_tag, remote_tag))
    }

    /// Key of the dialog an in-dialog request from the peer belongs to
    pub fn for_incoming(request: &Request) -> Option<Self> {
        Some(Self::new(
            request.call_id.clone(),
            request.to_tag()?,
            request.from_tag()?,
        ))
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.call_id, self.local_tag, self.remote_tag)
    }
}
