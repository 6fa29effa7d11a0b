//! Ending a session: the terminate command, BYE, error paths and close

use chrono::Utc;
use tracing::{debug, info, warn};

use rtcsip_sip_core::{header_names, Headers, Request, StatusCode};

use super::{reason_header, Outcome, PendingCancel, Session, TerminateOptions};
use crate::errors::{Result, SessionError};
use crate::events::SessionEvent;
use crate::types::{Cause, Originator, SessionStatus};

impl Session {
    pub(super) async fn terminate(&mut self, options: TerminateOptions) -> Result<()> {
        let TerminateOptions {
            status_code,
            reason_phrase,
            extra_headers,
            body,
        } = options;

        match self.status {
            SessionStatus::Terminated | SessionStatus::InviteReceived => {
                Err(SessionError::invalid_state(self.status))
            }
            SessionStatus::Canceled => Ok(()),

            SessionStatus::Null | SessionStatus::InviteSent | SessionStatus::ProvisionalReceived => {
                let reason = match status_code {
                    Some(code) => Some(reason_value(code, reason_phrase.as_deref())?),
                    None => None,
                };
                self.cancel_outgoing(reason).await
            }

            SessionStatus::WaitingForAnswer => {
                let code = status_code.unwrap_or(480);
                if !(300..700).contains(&code) {
                    return Err(SessionError::invalid_argument(format!(
                        "invalid status code for a rejection: {}",
                        code
                    )));
                }
                let status = StatusCode::from_u16(code)?;
                info!("Session {}: rejecting with {}", self.key, status);
                if let Some(mut response) = self.invite_response(status) {
                    if let Some(phrase) = reason_phrase {
                        response = response.with_reason(phrase);
                    }
                    response.headers.extend(
                        extra_headers
                            .iter()
                            .map(|(name, value)| (name.to_string(), value.to_string())),
                    );
                    response.body = body;
                    self.send_response(response).await;
                }
                self.finish(Outcome::failed(Originator::Local, Cause::Rejected))
                    .await;
                Ok(())
            }

            SessionStatus::WaitingForAck | SessionStatus::Confirmed => {
                let mut headers = extra_headers;
                if let Some(code) = status_code {
                    headers.push(
                        header_names::REASON,
                        reason_value(code, reason_phrase.as_deref())?,
                    );
                }
                info!("Session {}: hanging up", self.key);
                self.send_bye(headers, body).await;
                self.finish(Outcome::ended(Originator::Local, Cause::Bye))
                    .await;
                Ok(())
            }
        }
    }

    /// Cancel an outgoing call before its final response
    async fn cancel_outgoing(&mut self, reason: Option<String>) -> Result<()> {
        // A 2xx already arrived and its answer is being applied
        if let (Some(invite_cseq), true) = (
            self.request.as_ref().map(|r| r.cseq.seq),
            self.dialog.is_some(),
        ) {
            let mut headers = Headers::new();
            if let Some(reason) = reason {
                headers.push(header_names::REASON, reason);
            }
            if self.send_ack(invite_cseq).await {
                self.send_bye(headers, None).await;
            }
            self.finish(Outcome::failed(Originator::Local, Cause::Canceled))
                .await;
            return Ok(());
        }

        let previous = self.status;
        self.set_status(SessionStatus::Canceled)?;
        match previous {
            SessionStatus::Null => {
                debug!("Session {}: cancelled before the INVITE went out", self.key);
                self.finish(Outcome::failed(Originator::Local, Cause::Canceled))
                    .await;
            }
            SessionStatus::InviteSent if !self.received_100 => {
                debug!(
                    "Session {}: CANCEL deferred until a provisional response",
                    self.key
                );
                self.cancel = Some(PendingCancel {
                    reason,
                    sent: false,
                });
            }
            _ => {
                self.cancel = Some(PendingCancel {
                    reason,
                    sent: false,
                });
                self.send_pending_cancel().await;
            }
        }
        Ok(())
    }

    pub(super) async fn on_bye(&mut self, bye: Request) -> Result<()> {
        match self.status {
            SessionStatus::WaitingForAck | SessionStatus::Confirmed => {
                info!("Session {}: remote hung up", self.key);
                let response = self.response_to(&bye, StatusCode::OK);
                self.send_response(response).await;
                self.finish(Outcome::ended(Originator::Remote, Cause::Bye))
                    .await;
            }
            _ => {
                let response = self.response_to(&bye, StatusCode::CALL_DOES_NOT_EXIST);
                self.send_response(response).await;
            }
        }
        Ok(())
    }

    pub(super) async fn on_transport_error(&mut self) {
        self.on_delivery_failure(Cause::ConnectionError).await;
    }

    pub(super) async fn on_request_timeout(&mut self) {
        self.on_delivery_failure(Cause::RequestTimeout).await;
    }

    async fn on_delivery_failure(&mut self, cause: Cause) {
        let outcome = match self.status {
            SessionStatus::Terminated => return,
            SessionStatus::Canceled if self.cancel.is_some() => {
                Outcome::failed(Originator::Local, Cause::Canceled)
            }
            SessionStatus::Confirmed => Outcome::ended(Originator::System, cause),
            _ => Outcome::failed(Originator::System, cause),
        };
        warn!("Session {}: {:?}", self.key, cause);
        self.finish(outcome).await;
    }

    pub(super) async fn on_dialog_error(&mut self, status: StatusCode) {
        warn!("Session {}: dialog gone ({})", self.key, status);
        let outcome = if self.status == SessionStatus::Confirmed {
            Outcome::ended(Originator::Remote, Cause::DialogError)
        } else {
            Outcome::failed_with(Originator::Remote, Cause::DialogError, status)
        };
        self.finish(outcome).await;
    }

    /// Decide the outcome. The session closes right away, or as soon as the
    /// running media operation returns.
    pub(super) async fn finish(&mut self, outcome: Outcome) {
        if self.is_finishing() {
            return;
        }
        self.timers.cancel_all();
        self.dtmf.halt();
        if self.media_busy() {
            debug!("Session {}: closing after the running media operation", self.key);
            self.pending_outcome = Some(outcome);
            return;
        }
        self.complete(outcome).await;
    }

    /// Close, then report the outcome
    pub(super) async fn complete(&mut self, outcome: Outcome) {
        let end_time = Utc::now();
        self.end_time = Some(end_time);
        self.close().await;

        let event = match outcome {
            Outcome::Failed {
                originator,
                cause,
                status_code,
            } => {
                info!("Session {} failed: {:?} ({:?})", self.key, cause, originator);
                SessionEvent::Failed {
                    originator,
                    cause,
                    status_code,
                    end_time,
                }
            }
            Outcome::Ended { originator, cause } => {
                info!("Session {} ended: {:?} ({:?})", self.key, cause, originator);
                SessionEvent::Ended {
                    originator,
                    cause,
                    end_time,
                }
            }
        };
        self.emit(event);
    }

    /// Release every resource. Safe to call more than once.
    pub(crate) async fn close(&mut self) {
        if self.status.is_terminated() {
            return;
        }
        debug!("Closing session {}", self.key);

        if let Some(task) = self.media_task.take() {
            task.abort();
        }
        self.queued_media.clear();
        self.media.close().await;
        self.local_streams.stop_all();
        self.remote_streams.stop_all();

        self.timers.cancel_all();
        self.dtmf.halt();
        self.unacked_2xx = None;
        self.incoming_reinvite = None;

        if let Some(mut dialog) = self.dialog.take() {
            dialog.terminate();
        }
        for (_, mut early) in self.early_dialogs.drain() {
            early.terminate();
        }

        self.pending_outcome = None;
        self.status = SessionStatus::Terminated;
        self.status_tx.send_replace(SessionStatus::Terminated);
        self.lifecycle.session_destroyed(&self.key);
    }
}

/// Validate a status code for a Reason header and render the header value
fn reason_value(code: u16, phrase: Option<&str>) -> Result<String> {
    if !(200..700).contains(&code) {
        return Err(SessionError::invalid_argument(format!(
            "invalid status code: {}",
            code
        )));
    }
    let status = StatusCode::from_u16(code)?;
    Ok(reason_header(code, phrase.unwrap_or_else(|| status.reason_phrase())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::media::{MediaStream, MediaTrack, TrackKind};
    use crate::ports::MediaConstraints;
    use crate::session::testing::Harness;
    use crate::session::LocalMediaPurpose;
    use crate::types::Direction;

    #[tokio::test]
    async fn test_close_twice_releases_once() {
        let mut harness = Harness::new(Direction::Outgoing);
        harness.session.close().await;
        harness.session.close().await;

        assert_eq!(harness.lifecycle.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(harness.media.closes.load(Ordering::SeqCst), 1);
        assert_eq!(harness.session.status, SessionStatus::Terminated);
        assert!(harness.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_outcome_waits_for_running_media_operation() {
        let mut harness = Harness::new(Direction::Outgoing);
        let stream = MediaStream::new(vec![MediaTrack::new(TrackKind::Audio)]);
        harness.session.spawn_local_media(
            LocalMediaPurpose::Invite,
            MediaConstraints::default(),
            Some(stream.clone()),
        );
        harness
            .session
            .finish(Outcome::failed(Originator::Local, Cause::Canceled))
            .await;
        assert!(!harness.session.status.is_terminated());
        assert!(harness.events.try_recv().is_err());

        // The capture result is discarded and the session closes
        harness.step().await;
        assert!(harness.session.status.is_terminated());
        assert!(stream.is_ended());
        assert!(harness.transport.requests.lock().is_empty());
        match harness.events.try_recv() {
            Ok(SessionEvent::Failed {
                originator: Originator::Local,
                cause: Cause::Canceled,
                ..
            }) => {}
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(harness.lifecycle.destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reason_value_bounds() {
        assert_eq!(
            reason_value(486, None).unwrap(),
            "SIP ;cause=486 ;text=\"Busy Here\""
        );
        assert_eq!(
            reason_value(200, Some("Call completed elsewhere")).unwrap(),
            "SIP ;cause=200 ;text=\"Call completed elsewhere\""
        );
        assert!(reason_value(199, None).is_err());
        assert!(reason_value(700, None).is_err());
    }
}
