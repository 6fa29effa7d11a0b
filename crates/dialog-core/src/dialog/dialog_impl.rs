//! Dialog implementation for RFC 3261 SIP dialogs
//!
//! A dialog is built from the message that establishes it (a response carrying
//! a To tag on the UAC side, the INVITE on the UAS side), holds the route set
//! and sequence numbers, and produces in-dialog requests.

use serde::{Deserialize, Serialize};
use tracing::debug;

use rtcsip_sip_core::{
    Body, Headers, Method, NameAddr, Request, Response, SimpleRequestBuilder, Uri,
};

use super::dialog_id::DialogId;
use super::dialog_state::{DialogRole, DialogState};
use crate::errors::{DialogError, DialogResult};

/// A SIP dialog as defined in RFC 3261
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialog {
    id: DialogId,
    state: DialogState,
    role: DialogRole,

    /// Local party, carrying the local tag
    local: NameAddr,

    /// Remote party, carrying the remote tag
    remote: NameAddr,

    /// Our Contact, sent on every in-dialog request
    local_contact: Option<Uri>,

    /// Where in-dialog requests are sent (peer's Contact)
    remote_target: Uri,

    /// Route set, already in the order to be used on requests
    route_set: Vec<Uri>,

    local_cseq: u32,
    remote_cseq: Option<u32>,
}

impl Dialog {
    /// Create the UAC side of a dialog from a response to our INVITE.
    ///
    /// `state` is [`DialogState::Early`] for a 1xx with To tag and
    /// [`DialogState::Confirmed`] for a 2xx.
    pub fn from_response(
        invite: &Request,
        response: &Response,
        state: DialogState,
    ) -> DialogResult<Self> {
        Self::uac(
            invite.from.clone(),
            invite.contact.clone(),
            invite.cseq.seq,
            response,
            state,
        )
    }

    /// Create a confirmed UAC dialog from a 2xx whose INVITE is no longer
    /// tracked. The From header and CSeq of the response stand in for the
    /// INVITE; such a dialog exists only to be acknowledged and released.
    pub fn from_orphan_2xx(response: &Response, local_contact: Option<Uri>) -> DialogResult<Self> {
        Self::uac(
            response.from.clone(),
            local_contact,
            response.cseq.seq,
            response,
            DialogState::Confirmed,
        )
    }

    fn uac(
        local: NameAddr,
        local_contact: Option<Uri>,
        local_cseq: u32,
        response: &Response,
        state: DialogState,
    ) -> DialogResult<Self> {
        let id = DialogId::for_uac(response)?;
        let remote_target = response
            .contact
            .clone()
            .ok_or_else(|| DialogError::missing_contact(format!("{} response", response.status)))?;

        // Record-Route arrives in proxy order; the UAC uses it reversed
        let route_set = response.record_route.iter().rev().cloned().collect();

        debug!("Creating {} UAC dialog {}", state, id);
        Ok(Self {
            id,
            state,
            role: DialogRole::Uac,
            local,
            remote: response.to.clone(),
            local_contact,
            remote_target,
            route_set,
            local_cseq,
            remote_cseq: None,
        })
    }

    /// Create the UAS side of a dialog from an incoming INVITE and our To tag.
    pub fn from_request(
        invite: &Request,
        local_tag: &str,
        local_contact: Option<Uri>,
        state: DialogState,
    ) -> DialogResult<Self> {
        let id = DialogId::for_uas(invite, local_tag)?;
        let remote_target = invite
            .contact
            .clone()
            .ok_or_else(|| DialogError::missing_contact(format!("{} request", invite.method)))?;

        debug!("Creating {} UAS dialog {}", state, id);
        Ok(Self {
            id,
            state,
            role: DialogRole::Uas,
            local: invite.to.clone().with_tag(local_tag),
            remote: invite.from.clone(),
            local_contact,
            remote_target,
            route_set: invite.record_route.clone(),
            local_cseq: 0,
            remote_cseq: Some(invite.cseq.seq),
        })
    }

    pub fn id(&self) -> &DialogId {
        &self.id
    }

    pub fn state(&self) -> DialogState {
        self.state
    }

    pub fn role(&self) -> DialogRole {
        self.role
    }

    pub fn is_early(&self) -> bool {
        self.state == DialogState::Early
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == DialogState::Confirmed
    }

    pub fn is_terminated(&self) -> bool {
        self.state == DialogState::Terminated
    }

    pub fn local(&self) -> &NameAddr {
        &self.local
    }

    pub fn remote(&self) -> &NameAddr {
        &self.remote
    }

    pub fn remote_target(&self) -> &Uri {
        &self.remote_target
    }

    pub fn route_set(&self) -> &[Uri] {
        &self.route_set
    }

    pub fn local_cseq(&self) -> u32 {
        self.local_cseq
    }

    pub fn remote_cseq(&self) -> Option<u32> {
        self.remote_cseq
    }

    /// Promote an early dialog to confirmed.
    ///
    /// On the UAC side the 2xx refreshes the remote target and route set. The
    /// identity is left untouched.
    pub fn promote(mut self, final_response: Option<&Response>) -> DialogResult<Self> {
        if self.state != DialogState::Early {
            return Err(DialogError::invalid_state(self.state, "promote"));
        }
        if let (DialogRole::Uac, Some(response)) = (self.role, final_response) {
            if let Some(contact) = &response.contact {
                self.remote_target = contact.clone();
            }
            self.route_set = response.record_route.iter().rev().cloned().collect();
            self.remote = response.to.clone();
        }
        debug!("Promoting dialog {} to Confirmed", self.id);
        self.state = DialogState::Confirmed;
        Ok(self)
    }

    /// Build an in-dialog request.
    ///
    /// Every method except ACK and CANCEL consumes a new local CSeq number.
    pub fn create_request(
        &mut self,
        method: Method,
        headers: Headers,
        body: Option<Body>,
    ) -> DialogResult<Request> {
        if self.state == DialogState::Terminated {
            return Err(DialogError::invalid_state(self.state, method.to_string()));
        }
        if method.increments_cseq() {
            self.local_cseq += 1;
        }
        self.build(method, self.local_cseq, headers, body)
    }

    /// Build the ACK for the INVITE with sequence number `invite_cseq`
    pub fn create_ack(&self, invite_cseq: u32, body: Option<Body>) -> DialogResult<Request> {
        if self.state == DialogState::Terminated {
            return Err(DialogError::invalid_state(self.state, "ACK"));
        }
        self.build(Method::Ack, invite_cseq, Headers::new(), body)
    }

    fn build(
        &self,
        method: Method,
        cseq: u32,
        headers: Headers,
        body: Option<Body>,
    ) -> DialogResult<Request> {
        let mut builder = SimpleRequestBuilder::new(method, self.remote_target.clone())
            .from(self.local.clone())
            .to(self.remote.clone())
            .call_id(self.id.call_id.clone())
            .cseq(cseq)
            .route(self.route_set.clone())
            .headers(headers)
            .maybe_body(body);
        if let Some(contact) = &self.local_contact {
            builder = builder.contact(contact.clone());
        }
        Ok(builder.build()?)
    }

    /// Validate the CSeq of an incoming in-dialog request and record it.
    ///
    /// ACK and CANCEL carry the INVITE's number and are not checked.
    pub fn check_in_dialog_request(&mut self, request: &Request) -> DialogResult<()> {
        if matches!(request.method, Method::Ack | Method::Cancel) {
            return Ok(());
        }
        let received = request.cseq.seq;
        match self.remote_cseq {
            Some(last) if received < last => {
                debug!(
                    "Rejecting {} in dialog {}: CSeq {} < {}",
                    request.method, self.id, received, last
                );
                Err(DialogError::CSeqOutOfOrder { received, last })
            }
            _ => {
                self.remote_cseq = Some(received);
                Ok(())
            }
        }
    }

    /// Release the dialog. Returns false when it was already terminated.
    pub fn terminate(&mut self) -> bool {
        if self.state == DialogState::Terminated {
            return false;
        }
        debug!("Terminating dialog {} ({})", self.id, self.state);
        self.state = DialogState::Terminated;
        self.route_set.clear();
        true
    }
}
