//! Mid-call renegotiation
//!
//! Only one re-INVITE may be in progress at a time in either direction. An
//! incoming one that collides with ours, or arrives while our own 2xx is
//! still unacknowledged, is answered with 491.

use tracing::{debug, info, warn};

use rtcsip_sip_core::{header_names, Body, Method, Request, Response, StatusCode};

use super::{ApplyPurpose, OutgoingReinvite, Outcome, ReinviteOptions, SdpPurpose, Session};
use crate::errors::{Result, SessionError};
use crate::ports::{MediaError, SdpKind};
use crate::types::{Cause, Originator, SessionStatus};

impl Session {
    pub(super) fn renegotiating(&self) -> bool {
        self.reinvite.as_ref().map(|r| !r.completed).unwrap_or(false)
            || self.incoming_reinvite.is_some()
            || self.unacked_2xx.is_some()
    }

    pub(super) fn send_reinvite(&mut self, options: ReinviteOptions) -> Result<()> {
        if self.status != SessionStatus::Confirmed || self.renegotiating() {
            return Err(SessionError::invalid_state(self.status));
        }
        self.start_reinvite(options);
        Ok(())
    }

    pub(super) fn start_reinvite(&mut self, options: ReinviteOptions) {
        debug!("Session {}: renegotiating", self.key);
        self.reinvite = Some(OutgoingReinvite {
            extra_headers: options.extra_headers,
            cseq: None,
            answer_applied: false,
            completed: false,
        });
        self.spawn_sdp(SdpPurpose::ReinviteOffer, true);
    }

    pub(super) async fn on_reinvite_offer(
        &mut self,
        result: std::result::Result<String, MediaError>,
    ) -> Result<()> {
        let sdp = match result {
            Ok(sdp) => sdp,
            Err(e) => {
                warn!("Session {}: cannot create re-INVITE offer: {}", self.key, e);
                self.reinvite = None;
                return Ok(());
            }
        };
        let Some(reinvite) = self.reinvite.as_mut() else {
            return Ok(());
        };
        let mut headers = std::mem::take(&mut reinvite.extra_headers);
        headers.push(header_names::ALLOW, self.config.allow_header());

        let request = match self.in_dialog_request(Method::Invite, headers, Some(Body::sdp(sdp))) {
            Ok(request) => request,
            Err(e) => {
                self.reinvite = None;
                return Err(e);
            }
        };
        if let Some(reinvite) = self.reinvite.as_mut() {
            reinvite.cseq = Some(request.cseq.seq);
        }
        info!("Session {}: sending re-INVITE", self.key);
        self.send_request(request).await;
        Ok(())
    }

    pub(super) async fn on_reinvite_response(&mut self, response: Response) -> Result<()> {
        let status = response.status;
        if status.is_provisional() {
            return Ok(());
        }
        if !status.is_success() {
            warn!("Session {}: re-INVITE rejected with {}", self.key, status);
            if let Some(reinvite) = self.reinvite.as_mut() {
                reinvite.completed = true;
            }
            return Ok(());
        }

        if !response.has_body() {
            self.accept_and_terminate(
                &response,
                Some(StatusCode::BAD_REQUEST),
                Some("Missing session description"),
            )
            .await;
            self.finish(Outcome::ended(Originator::Remote, Cause::BadMediaDescription))
                .await;
            return Ok(());
        }
        let Some(sdp) = response.sdp().map(str::to_string) else {
            self.accept_and_terminate(&response, Some(StatusCode::UNSUPPORTED_MEDIA_TYPE), None)
                .await;
            self.finish(Outcome::ended(Originator::Remote, Cause::IncompatibleSdp))
                .await;
            return Ok(());
        };

        let Some(reinvite) = self.reinvite.as_mut() else {
            return Ok(());
        };
        if reinvite.answer_applied {
            // Retransmitted 2xx: the answer is never applied twice
            if let Some(ack) = self.sent_ack(response.cseq.seq) {
                debug!("Session {}: retransmitting re-INVITE ACK", self.key);
                self.send_request(ack).await;
            }
            return Ok(());
        }
        reinvite.answer_applied = true;
        self.spawn_apply(ApplyPurpose::ReinviteAnswer(response), SdpKind::Answer, &sdp);
        Ok(())
    }

    pub(super) async fn on_reinvite_answer_applied(
        &mut self,
        response: Response,
        result: std::result::Result<(), MediaError>,
    ) -> Result<()> {
        if let Some(reinvite) = self.reinvite.as_mut() {
            reinvite.completed = true;
        }
        if let Err(e) = result {
            warn!("Session {}: re-INVITE answer rejected: {}", self.key, e);
            self.accept_and_terminate(&response, Some(StatusCode::NOT_ACCEPTABLE_HERE), None)
                .await;
            self.finish(Outcome::ended(Originator::Remote, Cause::BadMediaDescription))
                .await;
            return Ok(());
        }
        self.send_ack(response.cseq.seq).await;
        Ok(())
    }

    pub(super) async fn on_reinvite(&mut self, request: Request) -> Result<()> {
        if self.status != SessionStatus::Confirmed || self.renegotiating() {
            debug!("Session {}: re-INVITE glare in {}", self.key, self.status);
            let response = self.response_to(&request, StatusCode::REQUEST_PENDING);
            self.send_response(response).await;
            return Ok(());
        }
        if request.has_body() && !request.has_sdp() {
            let response = self.response_to(&request, StatusCode::UNSUPPORTED_MEDIA_TYPE);
            self.send_response(response).await;
            return Ok(());
        }

        info!("Session {}: received re-INVITE", self.key);
        let offer = request.sdp().map(str::to_string);
        self.incoming_reinvite = Some(request);
        match offer {
            Some(sdp) => self.spawn_apply(ApplyPurpose::ReinviteOffer, SdpKind::Offer, &sdp),
            // No offer: we offer in the 2xx and expect the answer in the ACK
            None => self.spawn_sdp(SdpPurpose::ReinviteAnswer, true),
        }
        Ok(())
    }

    pub(super) async fn on_reinvite_offer_applied(
        &mut self,
        result: std::result::Result<(), MediaError>,
    ) -> Result<()> {
        if let Err(e) = result {
            warn!("Session {}: re-INVITE offer rejected: {}", self.key, e);
            self.reject_reinvite(StatusCode::NOT_ACCEPTABLE_HERE).await;
            return Ok(());
        }
        self.spawn_sdp(SdpPurpose::ReinviteAnswer, false);
        Ok(())
    }

    pub(super) async fn on_reinvite_answer_sdp(
        &mut self,
        result: std::result::Result<String, MediaError>,
    ) -> Result<()> {
        let sdp = match result {
            Ok(sdp) => sdp,
            Err(e) => {
                warn!("Session {}: cannot answer re-INVITE: {}", self.key, e);
                self.reject_reinvite(StatusCode::SERVER_INTERNAL_ERROR).await;
                return Ok(());
            }
        };
        let Some(request) = self.incoming_reinvite.take() else {
            return Ok(());
        };
        let response = self
            .response_to(&request, StatusCode::OK)
            .with_contact(self.contact.clone())
            .with_body(Body::sdp(sdp));

        if !self.send_response(response.clone()).await {
            return Ok(());
        }
        let expects_answer = !request.has_body();
        self.start_2xx_retransmission(response, expects_answer, true);
        Ok(())
    }

    async fn reject_reinvite(&mut self, status: StatusCode) {
        if let Some(request) = self.incoming_reinvite.take() {
            let response = self.response_to(&request, status);
            self.send_response(response).await;
        }
    }
}
