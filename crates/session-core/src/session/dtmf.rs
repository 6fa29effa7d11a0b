//! DTMF over SIP INFO (`application/dtmf-relay`)
//!
//! Outgoing tones are paced by a sequencer: one INFO per tone, with the
//! inter-tone gap between them. Tones queued while a sequence runs are
//! appended to it.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use rtcsip_sip_core::{Body, Headers, Method, Request, Response, StatusCode};

use super::{is_dialog_error, DtmfOptions, Session, SessionInput};
use crate::config::{DtmfSettings, MAX_DTMF_DURATION, MIN_DTMF_DURATION, MIN_INTER_TONE_GAP};
use crate::errors::{Result, SessionError};
use crate::events::SessionEvent;
use crate::types::{Originator, SessionStatus};

pub const DTMF_CONTENT_TYPE: &str = "application/dtmf-relay";

fn is_tone(c: char) -> bool {
    matches!(c, '0'..='9' | 'A'..='D' | 'a'..='d' | '#' | '*')
}

pub(crate) struct DtmfSequencer {
    defaults: DtmfSettings,
    queue: VecDeque<char>,
    duration: Duration,
    gap: Duration,
    token: u64,
    tick: Option<JoinHandle<()>>,
}

impl DtmfSequencer {
    pub(crate) fn new(defaults: DtmfSettings) -> Self {
        Self {
            defaults,
            queue: VecDeque::new(),
            duration: defaults.duration,
            gap: defaults.inter_tone_gap,
            token: 0,
            tick: None,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.tick.is_some()
    }

    /// Drop the queued tones and the pending tick
    pub(crate) fn halt(&mut self) {
        self.queue.clear();
        if let Some(tick) = self.tick.take() {
            tick.abort();
        }
    }

    /// Clamp the requested timing into the accepted range
    fn timing(&self, options: DtmfOptions) -> (Duration, Duration) {
        let mut duration = options.duration.unwrap_or(self.defaults.duration);
        if duration < MIN_DTMF_DURATION {
            warn!(
                "DTMF duration {:?} too short, using {:?}",
                duration, MIN_DTMF_DURATION
            );
            duration = MIN_DTMF_DURATION;
        } else if duration > MAX_DTMF_DURATION {
            warn!(
                "DTMF duration {:?} too long, using {:?}",
                duration, MAX_DTMF_DURATION
            );
            duration = MAX_DTMF_DURATION;
        }

        let mut gap = options.inter_tone_gap.unwrap_or(self.defaults.inter_tone_gap);
        if gap < MIN_INTER_TONE_GAP {
            warn!(
                "DTMF inter-tone gap {:?} too short, using {:?}",
                gap, MIN_INTER_TONE_GAP
            );
            gap = MIN_INTER_TONE_GAP;
        }
        (duration, gap)
    }
}

/// Body of one outgoing tone
fn dtmf_body(tone: char, duration: Duration) -> String {
    format!("Signal= {}\r\nDuration= {}\r\n", tone, duration.as_millis())
}

/// Parse an `application/dtmf-relay` body. A missing or unparsable
/// duration falls back to `default_duration`.
pub(crate) fn parse_dtmf_relay(body: &str, default_duration: Duration) -> Option<(char, Duration)> {
    let mut tone = None;
    let mut duration = None;
    for line in body.lines() {
        let Some((name, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "signal" => tone = value.chars().next().filter(|c| is_tone(*c)),
            "duration" => duration = value.parse::<u64>().ok().map(Duration::from_millis),
            _ => {}
        }
    }
    tone.map(|tone| (tone.to_ascii_uppercase(), duration.unwrap_or(default_duration)))
}

impl Session {
    pub(super) async fn send_dtmf(&mut self, tones: &str, options: DtmfOptions) -> Result<()> {
        if !matches!(
            self.status,
            SessionStatus::WaitingForAck | SessionStatus::Confirmed
        ) {
            return Err(SessionError::invalid_state(self.status));
        }
        if tones.is_empty() || !tones.chars().all(is_tone) {
            return Err(SessionError::invalid_argument(format!(
                "invalid DTMF tones: {:?}",
                tones
            )));
        }

        if self.dtmf.is_running() {
            debug!("Session {}: appending {} to the DTMF queue", self.key, tones);
            self.dtmf.queue.extend(tones.chars());
            return Ok(());
        }

        let (duration, gap) = self.dtmf.timing(options);
        self.dtmf.duration = duration;
        self.dtmf.gap = gap;
        self.dtmf.queue.extend(tones.chars());
        self.send_next_tone().await;
        Ok(())
    }

    pub(super) async fn on_dtmf_tick(&mut self, token: u64) -> Result<()> {
        if token != self.dtmf.token || self.dtmf.tick.is_none() {
            return Ok(());
        }
        self.dtmf.tick = None;
        if matches!(
            self.status,
            SessionStatus::WaitingForAck | SessionStatus::Confirmed
        ) {
            self.send_next_tone().await;
        } else {
            self.dtmf.halt();
        }
        Ok(())
    }

    async fn send_next_tone(&mut self) {
        let Some(tone) = self.dtmf.queue.pop_front() else {
            return;
        };
        let duration = self.dtmf.duration;
        let body = Body::new(DTMF_CONTENT_TYPE, dtmf_body(tone, duration));
        let request = match self.in_dialog_request(Method::Info, Headers::new(), Some(body)) {
            Ok(request) => request,
            Err(e) => {
                warn!("Session {}: cannot send DTMF: {}", self.key, e);
                self.dtmf.halt();
                return;
            }
        };

        debug!("Session {}: sending DTMF {}", self.key, tone);
        self.emit(SessionEvent::NewDtmf {
            originator: Originator::Local,
            tone,
            duration,
        });
        if !self.send_request(request).await {
            self.dtmf.halt();
            return;
        }
        self.schedule_dtmf_tick();
    }

    /// The gap runs after every tone, so tones appended later keep spacing
    fn schedule_dtmf_tick(&mut self) {
        self.dtmf.token += 1;
        let token = self.dtmf.token;
        let gap = self.dtmf.gap;
        let inputs = self.inputs.clone();
        self.dtmf.tick = Some(tokio::spawn(async move {
            tokio::time::sleep(gap).await;
            let _ = inputs.send(SessionInput::DtmfTick { token });
        }));
    }

    pub(super) async fn on_info_response(&mut self, response: Response) {
        let status = response.status;
        if status.is_provisional() || status.is_success() {
            return;
        }
        if is_dialog_error(status) {
            self.on_dialog_error(status).await;
            return;
        }
        if self.dtmf.is_running() {
            warn!("Session {}: DTMF INFO rejected with {}, stopping", self.key, status);
            self.dtmf.halt();
        }
    }

    pub(super) async fn on_info(&mut self, info: Request) -> Result<()> {
        if !matches!(
            self.status,
            SessionStatus::WaitingForAck | SessionStatus::Confirmed
        ) {
            let response = self.response_to(&info, StatusCode::CALL_DOES_NOT_EXIST);
            self.send_response(response).await;
            return Ok(());
        }

        let relay = info
            .body
            .as_ref()
            .filter(|body| body.is(DTMF_CONTENT_TYPE))
            .map(|body| body.content.clone());
        let Some(content) = relay else {
            let response = self.response_to(&info, StatusCode::UNSUPPORTED_MEDIA_TYPE);
            self.send_response(response).await;
            return Ok(());
        };

        let response = self.response_to(&info, StatusCode::OK);
        if !self.send_response(response).await {
            return Ok(());
        }
        match parse_dtmf_relay(&content, self.config.dtmf.duration) {
            Some((tone, duration)) => {
                debug!("Session {}: received DTMF {}", self.key, tone);
                self.emit(SessionEvent::NewDtmf {
                    originator: Originator::Remote,
                    tone,
                    duration,
                });
            }
            None => warn!("Session {}: unparsable DTMF body", self.key),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dtmf_relay() {
        let parsed = parse_dtmf_relay("Signal=5\r\nDuration=160\r\n", Duration::from_millis(100));
        assert_eq!(parsed, Some(('5', Duration::from_millis(160))));

        let parsed = parse_dtmf_relay("Signal= #\nDuration= 250\n", Duration::from_millis(100));
        assert_eq!(parsed, Some(('#', Duration::from_millis(250))));
    }

    #[test]
    fn test_parse_dtmf_relay_defaults_and_rejects() {
        assert_eq!(
            parse_dtmf_relay("Signal=a", Duration::from_millis(100)),
            Some(('A', Duration::from_millis(100)))
        );
        assert_eq!(parse_dtmf_relay("Duration=100", Duration::from_millis(100)), None);
        assert_eq!(parse_dtmf_relay("Signal=X", Duration::from_millis(100)), None);
        assert_eq!(parse_dtmf_relay("", Duration::from_millis(100)), None);
    }

    #[test]
    fn test_body_round_trips_through_parser() {
        let body = dtmf_body('*', Duration::from_millis(120));
        assert_eq!(body, "Signal= *\r\nDuration= 120\r\n");
        assert_eq!(
            parse_dtmf_relay(&body, Duration::from_millis(100)),
            Some(('*', Duration::from_millis(120)))
        );
    }

    #[test]
    fn test_timing_is_clamped() {
        let sequencer = DtmfSequencer::new(DtmfSettings::default());
        let (duration, gap) = sequencer.timing(
            DtmfOptions::default()
                .with_duration(Duration::from_millis(10))
                .with_inter_tone_gap(Duration::from_millis(5)),
        );
        assert_eq!(duration, MIN_DTMF_DURATION);
        assert_eq!(gap, MIN_INTER_TONE_GAP);

        let (duration, gap) =
            sequencer.timing(DtmfOptions::default().with_duration(Duration::from_secs(60)));
        assert_eq!(duration, MAX_DTMF_DURATION);
        assert_eq!(gap, Duration::from_millis(500));
    }

    #[test]
    fn test_tone_alphabet() {
        assert!("0123456789ABCDabcd#*".chars().all(is_tone));
        assert!(!"E".chars().all(is_tone));
        assert!(!is_tone(' '));
    }
}
