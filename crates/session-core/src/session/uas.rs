//! Incoming side of the initial INVITE: ringing, answering and the wait
//! for the ACK

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, info, warn};

use rtcsip_dialog_core::{Dialog, DialogId, DialogState};
use rtcsip_sip_core::{header_names, Body, Headers, Request, StatusCode};

use super::{
    reason_header, AnswerOptions, ApplyPurpose, LocalMediaError, LocalMediaPurpose, Outcome,
    SdpPurpose, Session, TimerKind, Unacked2xx,
};
use crate::errors::{Result, SessionError};
use crate::events::SessionEvent;
use crate::media::MediaStream;
use crate::ports::{MediaError, SdpKind};
use crate::types::{Cause, Direction, Originator, SessionStatus};

impl Session {
    pub(super) async fn init_incoming(&mut self, invite: Request) -> Result<()> {
        info!("Session {}: incoming call from {}", self.key, invite.from);
        self.set_status(SessionStatus::InviteReceived)?;
        self.local_identity = Some(invite.to.clone().with_tag(self.local_tag.clone()));
        self.remote_identity = Some(invite.from.clone());
        self.expires = invite.expires().map(|secs| Duration::from_secs(u64::from(secs)));
        self.request = Some(invite.clone());

        match Dialog::from_request(
            &invite,
            &self.local_tag,
            Some(self.contact.clone()),
            DialogState::Early,
        ) {
            Ok(dialog) => {
                self.early_dialogs.insert(dialog.id().clone(), dialog);
            }
            Err(e) => {
                warn!("Session {}: cannot create dialog: {}", self.key, e);
                self.reply_to_invite(
                    StatusCode::SERVER_INTERNAL_ERROR,
                    Some("Missing Contact header field"),
                )
                .await;
                self.finish(Outcome::failed(Originator::Remote, Cause::InternalError))
                    .await;
                return Ok(());
            }
        }

        if !invite.has_body() {
            debug!("Session {}: INVITE without offer", self.key);
            self.late_offer = true;
            self.start_ringing().await;
            return Ok(());
        }

        match invite.sdp() {
            Some(sdp) => {
                self.spawn_apply(ApplyPurpose::IncomingOffer, SdpKind::Offer, sdp);
            }
            None => {
                self.reply_to_invite(StatusCode::UNSUPPORTED_MEDIA_TYPE, None)
                    .await;
                self.finish(Outcome::failed(Originator::Remote, Cause::IncompatibleSdp))
                    .await;
            }
        }
        Ok(())
    }

    pub(super) async fn on_incoming_offer_applied(
        &mut self,
        result: std::result::Result<(), MediaError>,
    ) -> Result<()> {
        match result {
            Ok(()) => self.start_ringing().await,
            Err(e) => {
                warn!("Session {}: remote offer rejected: {}", self.key, e);
                self.reply_to_invite(StatusCode::NOT_ACCEPTABLE_HERE, None)
                    .await;
                self.finish(Outcome::failed(Originator::Remote, Cause::IncompatibleSdp))
                    .await;
            }
        }
        Ok(())
    }

    /// Send 180, arm the timers and hand the session to the application
    async fn start_ringing(&mut self) {
        if !self.reply_to_invite(StatusCode::RINGING, None).await {
            return;
        }
        if let Err(e) = self.set_status(SessionStatus::WaitingForAnswer) {
            warn!("Session {}: {}", self.key, e);
            return;
        }

        self.timers
            .schedule(TimerKind::NoAnswer, self.config.no_answer_timeout);
        if let Some(expires) = self.expires {
            self.timers.schedule(TimerKind::Expires, expires);
        }

        if let Some(events) = self.unannounced.take() {
            self.lifecycle
                .incoming_session_ready(self.handle.clone(), events);
        }
        self.emit(SessionEvent::Progress {
            originator: Originator::Local,
            status_code: StatusCode::RINGING,
        });
    }

    pub(super) async fn answer(&mut self, options: AnswerOptions) -> Result<()> {
        if self.direction != Direction::Incoming {
            return Err(SessionError::not_supported(
                "answer is only valid for incoming sessions",
            ));
        }
        if self.status != SessionStatus::WaitingForAnswer || self.dialog.is_some() {
            return Err(SessionError::invalid_state(self.status));
        }

        if let Err(e) = self.confirm_uas_dialog() {
            warn!("Session {}: cannot confirm dialog: {}", self.key, e);
            self.reply_to_invite(
                StatusCode::SERVER_INTERNAL_ERROR,
                Some("Missing Contact header field"),
            )
            .await;
            self.finish(Outcome::failed(Originator::Remote, Cause::InternalError))
                .await;
            return Ok(());
        }

        self.timers.cancel(TimerKind::NoAnswer);
        self.answer_headers = options.extra_headers;
        info!("Session {}: answering", self.key);
        self.spawn_local_media(LocalMediaPurpose::Answer, options.constraints, options.media_stream);
        Ok(())
    }

    fn confirm_uas_dialog(&mut self) -> Result<()> {
        let invite = self
            .request
            .as_ref()
            .ok_or_else(|| SessionError::invalid_state(self.status))?;
        let id = DialogId::for_uas(invite, &self.local_tag)?;
        let dialog = match self.early_dialogs.remove(&id) {
            Some(early) => early.promote(None)?,
            None => Dialog::from_request(
                invite,
                &self.local_tag,
                Some(self.contact.clone()),
                DialogState::Confirmed,
            )?,
        };
        self.dialog = Some(dialog);
        Ok(())
    }

    pub(super) async fn on_answer_media(
        &mut self,
        result: std::result::Result<MediaStream, LocalMediaError>,
    ) -> Result<()> {
        match result {
            Ok(stream) => {
                self.attach_local_stream(stream);
                let offer = self.late_offer;
                self.spawn_sdp(SdpPurpose::Answer, offer);
            }
            Err(LocalMediaError::Denied(e)) => {
                warn!("Session {}: local media denied: {}", self.key, e);
                self.reply_to_invite(StatusCode::TEMPORARILY_UNAVAILABLE, None)
                    .await;
                self.finish(Outcome::failed(Originator::Local, Cause::UserDeniedMediaAccess))
                    .await;
            }
            Err(LocalMediaError::Attach(stream, e)) => {
                warn!("Session {}: cannot attach local media: {}", self.key, e);
                stream.stop();
                self.reply_to_invite(StatusCode::SERVER_INTERNAL_ERROR, None)
                    .await;
                self.finish(Outcome::failed(Originator::Local, Cause::WebRtcError))
                    .await;
            }
        }
        Ok(())
    }

    pub(super) async fn on_answer_sdp(
        &mut self,
        result: std::result::Result<String, MediaError>,
    ) -> Result<()> {
        let sdp = match result {
            Ok(sdp) => sdp,
            Err(e) => {
                warn!("Session {}: cannot create local description: {}", self.key, e);
                self.reply_to_invite(StatusCode::SERVER_INTERNAL_ERROR, None)
                    .await;
                self.finish(Outcome::failed(Originator::Local, Cause::WebRtcError))
                    .await;
                return Ok(());
            }
        };

        let Some(mut response) = self.invite_response(StatusCode::OK) else {
            return Err(SessionError::invalid_state(self.status));
        };
        let headers = std::mem::take(&mut self.answer_headers);
        response.headers.extend(
            headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string())),
        );
        let response = response.with_body(Body::sdp(sdp));

        if !self.send_response(response.clone()).await {
            return Ok(());
        }
        self.set_status(SessionStatus::WaitingForAck)?;
        self.start_2xx_retransmission(response, self.late_offer, false);

        let start_time = chrono::Utc::now();
        self.start_time = Some(start_time);
        self.emit(SessionEvent::Started {
            originator: Originator::Local,
            start_time,
        });
        Ok(())
    }

    /// Retransmit `response` on the T1..T2 schedule and arm Timer H
    pub(super) fn start_2xx_retransmission(
        &mut self,
        response: rtcsip_sip_core::Response,
        expects_answer: bool,
        reinvite: bool,
    ) {
        let timers = self.config.timers;
        let mut intervals: VecDeque<Duration> = timers.retransmission_intervals().collect();
        if let Some(first) = intervals.pop_front() {
            self.timers.schedule(TimerKind::Invite2xx, first);
        }
        self.timers.schedule(TimerKind::Ack, timers.timer_h());
        self.unacked_2xx = Some(Unacked2xx {
            response,
            intervals,
            expects_answer,
            reinvite,
        });
    }

    /// A 2xx of ours is waiting for its ACK
    fn awaiting_ack(&self) -> bool {
        match self.status {
            SessionStatus::WaitingForAck => true,
            SessionStatus::Confirmed => self
                .unacked_2xx
                .as_ref()
                .map(|pending| pending.reinvite)
                .unwrap_or(false),
            _ => false,
        }
    }

    pub(super) async fn on_2xx_retransmit_timer(&mut self) {
        if !self.awaiting_ack() {
            return;
        }
        let Some(pending) = self.unacked_2xx.as_mut() else {
            return;
        };
        let response = pending.response.clone();
        let next = pending.intervals.pop_front();

        debug!("Session {}: retransmitting {}", self.key, response.status);
        if !self.send_response(response).await {
            return;
        }
        if let Some(next) = next {
            self.timers.schedule(TimerKind::Invite2xx, next);
        }
    }

    pub(super) async fn on_ack_timeout(&mut self) {
        if !self.awaiting_ack() {
            return;
        }
        warn!("Session {}: no ACK received", self.key);
        self.timers.cancel(TimerKind::Invite2xx);
        self.unacked_2xx = None;
        self.send_bye(Headers::new(), None).await;
        self.finish(Outcome::ended(Originator::Remote, Cause::NoAck))
            .await;
    }

    pub(super) async fn on_no_answer_timeout(&mut self) {
        if self.status != SessionStatus::WaitingForAnswer {
            return;
        }
        info!("Session {}: not answered in time", self.key);
        self.reply_to_invite(StatusCode::REQUEST_TIMEOUT, None).await;
        self.finish(Outcome::failed(Originator::Local, Cause::NoAnswer))
            .await;
    }

    pub(super) async fn on_expires_timeout(&mut self) {
        if self.status != SessionStatus::WaitingForAnswer {
            return;
        }
        info!("Session {}: INVITE expired", self.key);
        self.reply_to_invite(StatusCode::REQUEST_TERMINATED, None).await;
        self.finish(Outcome::failed(Originator::System, Cause::Expires))
            .await;
    }

    pub(super) async fn on_ack(&mut self, ack: Request) -> Result<()> {
        if !self.awaiting_ack() {
            debug!("Session {}: ignoring ACK in {}", self.key, self.status);
            return Ok(());
        }
        self.timers.cancel(TimerKind::Ack);
        self.timers.cancel(TimerKind::Invite2xx);
        let expects_answer = self
            .unacked_2xx
            .take()
            .map(|pending| pending.expects_answer)
            .unwrap_or(false);
        self.set_status(SessionStatus::Confirmed)?;

        if !expects_answer {
            return Ok(());
        }
        match ack.sdp() {
            Some(sdp) => {
                self.spawn_apply(ApplyPurpose::AckAnswer, SdpKind::Answer, sdp);
            }
            None => {
                warn!("Session {}: ACK without the expected answer", self.key);
                self.terminate_bad_media(StatusCode::BAD_REQUEST, "Missing session description")
                    .await;
            }
        }
        Ok(())
    }

    pub(super) async fn on_ack_answer_applied(
        &mut self,
        result: std::result::Result<(), MediaError>,
    ) -> Result<()> {
        if let Err(e) = result {
            warn!("Session {}: answer in ACK rejected: {}", self.key, e);
            let status = StatusCode::NOT_ACCEPTABLE_HERE;
            self.terminate_bad_media(status, status.reason_phrase()).await;
        }
        Ok(())
    }

    async fn terminate_bad_media(&mut self, status: StatusCode, phrase: &str) {
        let mut headers = Headers::new();
        headers.push(header_names::REASON, reason_header(status.as_u16(), phrase));
        self.send_bye(headers, None).await;
        self.finish(Outcome::ended(Originator::Remote, Cause::BadMediaDescription))
            .await;
    }

    pub(super) async fn on_cancel(&mut self, cancel: Request) -> Result<()> {
        let response = self.response_to(&cancel, StatusCode::OK);
        if !self.send_response(response).await {
            return Ok(());
        }

        match self.status {
            SessionStatus::InviteReceived | SessionStatus::WaitingForAnswer => {
                info!("Session {}: cancelled by the caller", self.key);
                self.set_status(SessionStatus::Canceled)?;
                self.reply_to_invite(StatusCode::REQUEST_TERMINATED, None)
                    .await;
                self.finish(Outcome::failed(Originator::Remote, Cause::Canceled))
                    .await;
            }
            _ => debug!("Session {}: CANCEL too late in {}", self.key, self.status),
        }
        Ok(())
    }
}
