//! Per-call options of the session commands

use std::time::Duration;

use rtcsip_sip_core::{Body, Headers};

use crate::media::MediaStream;
use crate::ports::MediaConstraints;

/// Options for an outgoing call
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// What to capture when no stream is supplied
    pub constraints: MediaConstraints,
    /// Use this stream instead of capturing one
    pub media_stream: Option<MediaStream>,
    /// Extra headers for the INVITE
    pub extra_headers: Headers,
}

impl CallOptions {
    pub fn with_constraints(mut self, constraints: MediaConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_media_stream(mut self, stream: MediaStream) -> Self {
        self.media_stream = Some(stream);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push(name, value);
        self
    }
}

/// Options for answering an incoming call
#[derive(Debug, Clone, Default)]
pub struct AnswerOptions {
    pub constraints: MediaConstraints,
    pub media_stream: Option<MediaStream>,
    /// Extra headers for the 200
    pub extra_headers: Headers,
}

impl AnswerOptions {
    pub fn with_constraints(mut self, constraints: MediaConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_media_stream(mut self, stream: MediaStream) -> Self {
        self.media_stream = Some(stream);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push(name, value);
        self
    }
}

/// Options for cancel, reject and hang-up.
///
/// `status_code` must be in 300..700 when rejecting and in 200..700
/// otherwise. When hanging up or cancelling it only feeds the Reason header.
#[derive(Debug, Clone, Default)]
pub struct TerminateOptions {
    pub status_code: Option<u16>,
    pub reason_phrase: Option<String>,
    pub extra_headers: Headers,
    pub body: Option<Body>,
}

impl TerminateOptions {
    pub fn with_status(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn with_reason_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.reason_phrase = Some(phrase.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push(name, value);
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }
}

/// Tone timing for `send_dtmf`; unset values come from the configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DtmfOptions {
    pub duration: Option<Duration>,
    pub inter_tone_gap: Option<Duration>,
}

impl DtmfOptions {
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_inter_tone_gap(mut self, gap: Duration) -> Self {
        self.inter_tone_gap = Some(gap);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReinviteOptions {
    pub extra_headers: Headers,
}

impl ReinviteOptions {
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push(name, value);
        self
    }
}
