//! Outgoing side of the initial INVITE

use tracing::{debug, info, warn};

use rtcsip_dialog_core::{Dialog, DialogId, DialogResult, DialogState};
use rtcsip_sip_core::{
    header_names, Body, Headers, Method, NameAddr, Request, Response, SimpleRequestBuilder,
    StatusCode, Uri,
};

use super::{
    reason_header, ApplyPurpose, CallOptions, LocalMediaError, LocalMediaPurpose, Outcome,
    SdpPurpose, Session,
};
use crate::errors::{Result, SessionError};
use crate::events::SessionEvent;
use crate::media::MediaStream;
use crate::ports::{MediaError, SdpKind};
use crate::types::{Cause, Direction, Originator, SessionStatus};

impl Session {
    pub(super) async fn connect(&mut self, target: Uri, options: CallOptions) -> Result<()> {
        if self.direction != Direction::Outgoing {
            return Err(SessionError::not_supported("connect on an incoming session"));
        }
        if self.status != SessionStatus::Null || self.request.is_some() {
            return Err(SessionError::invalid_state(self.status));
        }

        let mut from = NameAddr::new(self.config.uri.clone()).with_tag(self.local_tag.clone());
        if let Some(name) = &self.config.display_name {
            from = from.with_display_name(name.clone());
        }
        let invite = SimpleRequestBuilder::new(Method::Invite, target.clone())
            .from(from)
            .to(NameAddr::new(target.clone()))
            .call_id(self.key.call_id.clone())
            .cseq(1)
            .contact(self.contact.clone())
            .header(header_names::ALLOW, self.config.allow_header())
            .headers(options.extra_headers)
            .build()?;

        info!("Session {}: calling {}", self.key, target);
        self.local_identity = Some(invite.from.clone());
        self.remote_identity = Some(invite.to.clone());
        self.request = Some(invite);
        self.spawn_local_media(LocalMediaPurpose::Invite, options.constraints, options.media_stream);
        Ok(())
    }

    pub(super) async fn on_invite_media(
        &mut self,
        result: std::result::Result<MediaStream, LocalMediaError>,
    ) -> Result<()> {
        match result {
            Ok(stream) => {
                self.attach_local_stream(stream);
                self.spawn_sdp(SdpPurpose::InviteOffer, true);
            }
            Err(LocalMediaError::Denied(e)) => {
                warn!("Session {}: local media denied: {}", self.key, e);
                self.finish(Outcome::failed(Originator::Local, Cause::UserDeniedMediaAccess))
                    .await;
            }
            Err(LocalMediaError::Attach(stream, e)) => {
                warn!("Session {}: cannot attach local media: {}", self.key, e);
                stream.stop();
                self.finish(Outcome::failed(Originator::Local, Cause::WebRtcError))
                    .await;
            }
        }
        Ok(())
    }

    pub(super) async fn on_invite_offer(
        &mut self,
        result: std::result::Result<String, MediaError>,
    ) -> Result<()> {
        let sdp = match result {
            Ok(sdp) => sdp,
            Err(e) => {
                warn!("Session {}: cannot create offer: {}", self.key, e);
                self.finish(Outcome::failed(Originator::Local, Cause::WebRtcError))
                    .await;
                return Ok(());
            }
        };
        let Some(invite) = self.request.as_mut() else {
            return Err(SessionError::invalid_state(self.status));
        };
        invite.body = Some(Body::sdp(sdp));
        let invite = invite.clone();

        self.set_status(SessionStatus::InviteSent)?;
        self.send_request(invite).await;
        Ok(())
    }

    pub(super) async fn on_invite_response(&mut self, response: Response) -> Result<()> {
        match self.status {
            SessionStatus::Canceled if self.cancel.is_some() => {
                self.on_canceled_invite_response(response).await;
                Ok(())
            }
            SessionStatus::InviteSent | SessionStatus::ProvisionalReceived => {
                self.on_invite_progress(response).await
            }
            SessionStatus::Confirmed if response.status.is_success() => {
                self.on_repeated_2xx(&response).await;
                Ok(())
            }
            _ => {
                debug!(
                    "Session {}: ignoring {} in {}",
                    self.key, response.status, self.status
                );
                Ok(())
            }
        }
    }

    async fn on_invite_progress(&mut self, response: Response) -> Result<()> {
        let status = response.status;

        if status == StatusCode::TRYING {
            self.received_100 = true;
            return Ok(());
        }

        if status.is_provisional() {
            self.received_100 = true;
            if response.to_tag().is_none() {
                warn!("Session {}: {} without To tag, dropping", self.key, status);
                return Ok(());
            }
            if response.contact.is_some() && self.dialog.is_none() {
                if let Err(e) = self.track_early_dialog(&response) {
                    warn!("Session {}: cannot create early dialog: {}", self.key, e);
                    self.finish(Outcome::failed_with(
                        Originator::Remote,
                        Cause::InternalError,
                        status,
                    ))
                    .await;
                    return Ok(());
                }
            }
            self.set_status(SessionStatus::ProvisionalReceived)?;
            self.emit(SessionEvent::Progress {
                originator: Originator::Remote,
                status_code: status,
            });
            return Ok(());
        }

        if status.is_success() {
            return self.on_invite_2xx(response).await;
        }

        info!("Session {}: call failed with {}", self.key, status);
        self.finish(Outcome::failed_with(
            Originator::Remote,
            Cause::from_status(status),
            status,
        ))
        .await;
        Ok(())
    }

    fn track_early_dialog(&mut self, response: &Response) -> Result<()> {
        let id = DialogId::for_uac(response)?;
        if self.early_dialogs.contains_key(&id) {
            return Ok(());
        }
        let Some(invite) = self.request.as_ref() else {
            return Err(SessionError::invalid_state(self.status));
        };
        let dialog = Dialog::from_response(invite, response, DialogState::Early)?;
        self.early_dialogs.insert(id, dialog);
        Ok(())
    }

    async fn on_invite_2xx(&mut self, response: Response) -> Result<()> {
        let status = response.status;

        // A 2xx is already being applied: this is a retransmission or a fork
        if self.dialog.is_some() {
            self.on_repeated_2xx(&response).await;
            return Ok(());
        }

        if !response.has_body() {
            self.accept_and_terminate(&response, Some(StatusCode::BAD_REQUEST), Some("Missing session description"))
                .await;
            self.finish(Outcome::failed_with(
                Originator::Remote,
                Cause::BadMediaDescription,
                status,
            ))
            .await;
            return Ok(());
        }
        let Some(sdp) = response.sdp().map(str::to_string) else {
            self.accept_and_terminate(&response, Some(StatusCode::UNSUPPORTED_MEDIA_TYPE), None)
                .await;
            self.finish(Outcome::failed_with(
                Originator::Remote,
                Cause::IncompatibleSdp,
                status,
            ))
            .await;
            return Ok(());
        };

        if let Err(e) = self.confirm_uac_dialog(&response) {
            warn!("Session {}: cannot confirm dialog: {}", self.key, e);
            self.finish(Outcome::failed_with(
                Originator::Remote,
                Cause::InternalError,
                status,
            ))
            .await;
            return Ok(());
        }

        self.spawn_apply(ApplyPurpose::InviteAnswer(response), SdpKind::Answer, &sdp);
        Ok(())
    }

    /// Promote the early dialog matching `response`, or create a confirmed
    /// one, and drop every other early dialog
    pub(super) fn confirm_uac_dialog(&mut self, response: &Response) -> Result<()> {
        let id = DialogId::for_uac(response)?;
        let dialog = match self.early_dialogs.remove(&id) {
            Some(early) => early.promote(Some(response))?,
            None => {
                let invite = self
                    .request
                    .as_ref()
                    .ok_or_else(|| SessionError::invalid_state(self.status))?;
                Dialog::from_response(invite, response, DialogState::Confirmed)?
            }
        };
        for (id, mut early) in self.early_dialogs.drain() {
            debug!("Discarding early dialog {}", id);
            early.terminate();
        }
        self.dialog = Some(dialog);
        Ok(())
    }

    pub(super) async fn on_invite_answer_applied(
        &mut self,
        response: Response,
        result: std::result::Result<(), MediaError>,
    ) -> Result<()> {
        let status = response.status;
        if let Err(e) = result {
            warn!("Session {}: remote answer rejected: {}", self.key, e);
            self.accept_and_terminate(&response, Some(StatusCode::NOT_ACCEPTABLE_HERE), None)
                .await;
            self.finish(Outcome::failed_with(
                Originator::Remote,
                Cause::BadMediaDescription,
                status,
            ))
            .await;
            return Ok(());
        }

        if !self.send_ack(response.cseq.seq).await {
            return Ok(());
        }
        self.set_status(SessionStatus::Confirmed)?;
        let start_time = chrono::Utc::now();
        self.start_time = Some(start_time);
        info!("Session {}: confirmed", self.key);
        self.emit(SessionEvent::Started {
            originator: Originator::Remote,
            start_time,
        });
        Ok(())
    }

    /// A 2xx after the first one: ACK it again if it belongs to our dialog,
    /// otherwise ACK and BYE the extra fork
    pub(super) async fn on_repeated_2xx(&mut self, response: &Response) {
        let Ok(id) = DialogId::for_uac(response) else {
            warn!("Session {}: 2xx without To tag", self.key);
            return;
        };

        if self.dialog.as_ref().map(|d| d.id() == &id).unwrap_or(false) {
            if let Some(ack) = self.sent_ack(response.cseq.seq) {
                debug!("Session {}: retransmitting ACK", self.key);
                self.send_request(ack).await;
            }
            return;
        }

        info!("Session {}: releasing extra dialog {}", self.key, id);
        let Some(invite) = self.request.as_ref() else {
            return;
        };
        let requests = Dialog::from_response(invite, response, DialogState::Confirmed)
            .and_then(|fork| release_requests(fork, response.cseq.seq));
        match requests {
            Ok((ack, bye)) => {
                if self.send_request(ack).await {
                    self.send_request(bye).await;
                }
            }
            Err(e) => warn!("Session {}: cannot release dialog {}: {}", self.key, id, e),
        }
    }

    /// Responses to an INVITE the application cancelled
    async fn on_canceled_invite_response(&mut self, response: Response) {
        let status = response.status;
        if status.is_provisional() {
            self.received_100 = true;
            self.send_pending_cancel().await;
            return;
        }
        if status.is_success() {
            self.accept_and_terminate(&response, None, None).await;
        }
        self.finish(Outcome::failed(Originator::Local, Cause::Canceled))
            .await;
    }

    /// Send the CANCEL once
    pub(super) async fn send_pending_cancel(&mut self) {
        let Some(cancel) = self.cancel.as_mut() else {
            return;
        };
        if cancel.sent {
            return;
        }
        cancel.sent = true;
        let reason = cancel.reason.clone();
        let Some(invite) = self.request.as_ref() else {
            return;
        };
        let request = invite.cancel_for(reason);
        info!("Session {}: sending CANCEL", self.key);
        self.send_request(request).await;
    }

    /// ACK a 2xx we do not want and hang up right away, optionally
    /// explaining why in a Reason header
    pub(super) async fn accept_and_terminate(
        &mut self,
        response: &Response,
        status: Option<StatusCode>,
        phrase: Option<&str>,
    ) {
        let mut headers = Headers::new();
        if let Some(status) = status {
            let phrase = phrase.unwrap_or_else(|| status.reason_phrase());
            headers.push(header_names::REASON, reason_header(status.as_u16(), phrase));
        }

        if self.dialog.is_none() {
            if let Err(e) = self.confirm_uac_dialog(response) {
                warn!("Session {}: cannot acknowledge {}: {}", self.key, response.status, e);
                return;
            }
        }
        if self.send_ack(response.cseq.seq).await {
            self.send_bye(headers, None).await;
        }
    }
}

/// ACK and BYE for a 2xx whose dialog is not kept
pub(crate) fn release_requests(
    mut fork: Dialog,
    invite_cseq: u32,
) -> DialogResult<(Request, Request)> {
    let ack = fork.create_ack(invite_cseq, None)?;
    let bye = fork.create_request(Method::Bye, Headers::new(), None)?;
    fork.terminate();
    Ok((ack, bye))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::session::testing::Harness;
    use crate::session::{SessionInput, TerminateOptions};

    async fn dial(harness: &mut Harness) -> Request {
        harness
            .session
            .connect("sip:bob@example.com".parse().unwrap(), CallOptions::default())
            .await
            .unwrap();
        // local media, then the offer
        harness.step().await;
        harness.step().await;
        let requests = harness.transport.requests.lock();
        assert_eq!(requests.len(), 1);
        requests[0].clone()
    }

    fn answer(invite: &Request, status: StatusCode, to_tag: &str) -> Response {
        Response::from_request(invite, status)
            .with_to_tag(to_tag)
            .with_contact("sip:bob@10.0.0.2".parse().unwrap())
    }

    async fn receive(harness: &mut Harness, response: Response) {
        harness
            .session
            .handle_input(SessionInput::Response(response))
            .await
            .unwrap();
    }

    fn failure(harness: &mut Harness) -> Option<(Originator, Cause)> {
        while let Ok(event) = harness.events.try_recv() {
            if let SessionEvent::Failed {
                originator, cause, ..
            } = event
            {
                return Some((originator, cause));
            }
        }
        None
    }

    fn sent_methods(harness: &Harness) -> Vec<Method> {
        harness
            .transport
            .requests
            .lock()
            .iter()
            .map(|r| r.method.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_rejection_after_forked_ringing_drops_early_dialogs() {
        let mut harness = Harness::new(Direction::Outgoing);
        let invite = dial(&mut harness).await;

        receive(&mut harness, answer(&invite, StatusCode::RINGING, "b1")).await;
        receive(&mut harness, answer(&invite, StatusCode::RINGING, "b2")).await;
        assert_eq!(harness.session.early_dialogs.len(), 2);

        receive(&mut harness, answer(&invite, StatusCode::BUSY_HERE, "b1")).await;
        assert!(harness.session.early_dialogs.is_empty());
        assert!(harness.session.status.is_terminated());
        assert_eq!(harness.lifecycle.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(failure(&mut harness), Some((Originator::Remote, Cause::Busy)));
        assert_eq!(sent_methods(&harness), vec![Method::Invite]);
    }

    #[tokio::test]
    async fn test_deferred_cancel_goes_out_on_ringing() {
        let mut harness = Harness::new(Direction::Outgoing);
        let invite = dial(&mut harness).await;

        harness
            .session
            .terminate(TerminateOptions::default())
            .await
            .unwrap();
        assert_eq!(harness.session.status, SessionStatus::Canceled);
        assert_eq!(sent_methods(&harness), vec![Method::Invite]);

        receive(&mut harness, answer(&invite, StatusCode::RINGING, "b1")).await;
        assert_eq!(sent_methods(&harness), vec![Method::Invite, Method::Cancel]);

        receive(&mut harness, answer(&invite, StatusCode::REQUEST_TERMINATED, "b1")).await;
        assert!(harness.session.early_dialogs.is_empty());
        assert!(harness.session.status.is_terminated());
        assert_eq!(harness.lifecycle.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(failure(&mut harness), Some((Originator::Local, Cause::Canceled)));
    }

    #[tokio::test]
    async fn test_deferred_cancel_closes_on_final_response() {
        let mut harness = Harness::new(Direction::Outgoing);
        let invite = dial(&mut harness).await;

        harness
            .session
            .terminate(TerminateOptions::default())
            .await
            .unwrap();
        receive(&mut harness, answer(&invite, StatusCode::BUSY_HERE, "b1")).await;

        assert_eq!(sent_methods(&harness), vec![Method::Invite]);
        assert!(harness.session.early_dialogs.is_empty());
        assert!(harness.session.status.is_terminated());
        assert_eq!(harness.lifecycle.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(failure(&mut harness), Some((Originator::Local, Cause::Canceled)));
    }

    #[tokio::test]
    async fn test_cancel_after_trying_drops_early_dialogs() {
        let mut harness = Harness::new(Direction::Outgoing);
        let invite = dial(&mut harness).await;

        receive(&mut harness, Response::from_request(&invite, StatusCode::TRYING)).await;
        receive(&mut harness, answer(&invite, StatusCode::RINGING, "b1")).await;
        receive(&mut harness, answer(&invite, StatusCode::RINGING, "b2")).await;
        harness
            .session
            .terminate(TerminateOptions::default())
            .await
            .unwrap();
        assert_eq!(sent_methods(&harness), vec![Method::Invite, Method::Cancel]);

        receive(&mut harness, answer(&invite, StatusCode::REQUEST_TERMINATED, "b2")).await;
        assert!(harness.session.early_dialogs.is_empty());
        assert_eq!(harness.lifecycle.destroyed.load(Ordering::SeqCst), 1);

        // A late final from the other branch changes nothing
        let _ = harness
            .session
            .handle_input(SessionInput::Response(answer(
                &invite,
                StatusCode::REQUEST_TERMINATED,
                "b1",
            )))
            .await;
        assert_eq!(harness.lifecycle.destroyed.load(Ordering::SeqCst), 1);
    }
}
