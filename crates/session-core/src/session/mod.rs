//! # Session actor
//!
//! Every INVITE session runs as one tokio task that owns all of its state:
//! the dialogs, the timers, the DTMF sequencer and the media streams. The
//! rest of the world talks to it through a [`SessionHandle`], which posts
//! [`SessionInput`]s into the task's queue. Inputs are processed strictly one
//! at a time, so no state is ever shared.
//!
//! Media engine calls can take long. They run as spawned tasks that post a
//! [`MediaStep`] back into the queue, so SIP traffic, commands and timers keep
//! being processed meanwhile. At most one media operation is outstanding;
//! further ones wait in a FIFO.
//!
//! Once a terminal outcome is decided while a media operation is still
//! running, the session only waits for that result, discards it and then
//! closes. Everything else arriving in that window is refused.

mod dtmf;
mod handle;
mod options;
mod reinvite;
mod streams;
mod termination;
mod timers;
mod uac;
mod uas;

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use rtcsip_dialog_core::{Dialog, DialogId};
use rtcsip_sip_core::{
    header_names, Body, Headers, Method, NameAddr, Request, Response, StatusCode, Uri,
};

use crate::config::UserAgentConfig;
use crate::errors::{Result, SessionError};
use crate::events::SessionEvent;
use crate::media::{MediaStream, StreamSet};
use crate::ports::{MediaEngine, MediaEngineFactory, MediaError, SdpKind, Transport};
use crate::registry::SessionLifecycle;
use crate::types::{Cause, Direction, Originator, SessionInfo, SessionKey, SessionStatus};

pub use handle::SessionHandle;
pub use options::{AnswerOptions, CallOptions, DtmfOptions, ReinviteOptions, TerminateOptions};
pub use timers::TimerKind;

pub use dtmf::DTMF_CONTENT_TYPE;
pub(crate) use uac::release_requests;

use dtmf::DtmfSequencer;
use timers::TimerSet;

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

/// Application commands, each answered through its reply channel
pub(crate) enum Command {
    Connect {
        target: Uri,
        options: CallOptions,
        reply: Reply<()>,
    },
    Answer {
        options: AnswerOptions,
        reply: Reply<()>,
    },
    Terminate {
        options: TerminateOptions,
        reply: Reply<()>,
    },
    SendDtmf {
        tones: String,
        options: DtmfOptions,
        reply: Reply<()>,
    },
    ToggleMute {
        reply: Reply<bool>,
    },
    AddStream {
        stream: MediaStream,
        dont_reinvite: bool,
        reply: Reply<()>,
    },
    RemoveStream {
        stream_id: String,
        dont_reinvite: bool,
        reply: Reply<()>,
    },
    SendReinvite {
        options: ReinviteOptions,
        reply: Reply<()>,
    },
    Info {
        reply: Reply<SessionInfo>,
    },
}

/// Everything the session loop reacts to
pub(crate) enum SessionInput {
    Command(Command),
    Request(Request),
    Response(Response),
    /// The transport could not deliver one of our requests
    TransportError,
    /// No final response arrived for one of our requests
    RequestTimeout,
    Media(MediaStep),
    Timer { kind: TimerKind, token: u64 },
    DtmfTick { token: u64 },
    RemoteStreamAdded(MediaStream),
    RemoteStreamRemoved(String),
}

/// Why local media is being captured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LocalMediaPurpose {
    Invite,
    Answer,
}

pub(crate) enum LocalMediaError {
    /// Capture was refused
    Denied(MediaError),
    /// Captured, but the engine did not take the stream
    Attach(MediaStream, MediaError),
}

/// Which local description is being produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SdpPurpose {
    /// Offer of our initial INVITE
    InviteOffer,
    /// Body of our 2xx to the initial INVITE
    Answer,
    /// Offer of our re-INVITE
    ReinviteOffer,
    /// Body of our 2xx to a re-INVITE
    ReinviteAnswer,
}

/// Which remote description is being applied
pub(crate) enum ApplyPurpose {
    /// Answer in the 2xx to our initial INVITE
    InviteAnswer(Response),
    /// Offer of the incoming initial INVITE
    IncomingOffer,
    /// Answer in the 2xx to our re-INVITE
    ReinviteAnswer(Response),
    /// Offer of an incoming re-INVITE
    ReinviteOffer,
    /// Answer carried by an ACK after we offered in a 2xx
    AckAnswer,
}

pub(crate) enum StreamChange {
    Added(MediaStream),
    Removed(MediaStream),
}

/// Result of a media engine operation
pub(crate) enum MediaStep {
    LocalMedia {
        purpose: LocalMediaPurpose,
        result: std::result::Result<MediaStream, LocalMediaError>,
    },
    LocalSdp {
        purpose: SdpPurpose,
        result: std::result::Result<String, MediaError>,
    },
    RemoteApplied {
        purpose: ApplyPurpose,
        result: std::result::Result<(), MediaError>,
    },
    StreamChanged {
        change: StreamChange,
        dont_reinvite: bool,
        result: std::result::Result<(), MediaError>,
        reply: Reply<()>,
    },
}

impl MediaStep {
    /// Release what a discarded result still holds
    fn discard(self) {
        match self {
            MediaStep::LocalMedia { result, .. } => match result {
                Ok(stream) | Err(LocalMediaError::Attach(stream, _)) => stream.stop(),
                Err(LocalMediaError::Denied(_)) => {}
            },
            MediaStep::StreamChanged { reply, .. } => {
                let _ = reply.send(Err(SessionError::Terminated));
            }
            MediaStep::LocalSdp { .. } | MediaStep::RemoteApplied { .. } => {}
        }
    }
}

type MediaOp = Box<dyn FnOnce(Arc<dyn MediaEngine>) -> BoxFuture<'static, MediaStep> + Send>;

/// How a session ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Failed {
        originator: Originator,
        cause: Cause,
        status_code: Option<StatusCode>,
    },
    Ended {
        originator: Originator,
        cause: Cause,
    },
}

impl Outcome {
    pub(crate) fn failed(originator: Originator, cause: Cause) -> Self {
        Outcome::Failed {
            originator,
            cause,
            status_code: None,
        }
    }

    pub(crate) fn failed_with(originator: Originator, cause: Cause, status: StatusCode) -> Self {
        Outcome::Failed {
            originator,
            cause,
            status_code: Some(status),
        }
    }

    pub(crate) fn ended(originator: Originator, cause: Cause) -> Self {
        Outcome::Ended { originator, cause }
    }
}

/// UAC side: a CANCEL requested by the application
struct PendingCancel {
    reason: Option<String>,
    sent: bool,
}

/// UAS side: a 2xx being retransmitted until its ACK arrives
struct Unacked2xx {
    response: Response,
    intervals: VecDeque<Duration>,
    /// We offered in the 2xx, so the ACK carries the answer
    expects_answer: bool,
    reinvite: bool,
}

/// UAC side: our latest re-INVITE
struct OutgoingReinvite {
    extra_headers: Headers,
    cseq: Option<u32>,
    /// A 2xx answer was applied; retransmissions only get the ACK again
    answer_applied: bool,
    completed: bool,
}

/// Everything needed to start a session task
pub(crate) struct SessionParams {
    pub key: SessionKey,
    pub direction: Direction,
    pub config: Arc<UserAgentConfig>,
    pub transport: Arc<dyn Transport>,
    pub media_factory: Arc<dyn MediaEngineFactory>,
    pub lifecycle: Arc<dyn SessionLifecycle>,
}

pub(crate) struct Session {
    key: SessionKey,
    direction: Direction,
    status: SessionStatus,
    status_tx: watch::Sender<SessionStatus>,
    config: Arc<UserAgentConfig>,
    transport: Arc<dyn Transport>,
    media: Arc<dyn MediaEngine>,
    lifecycle: Arc<dyn SessionLifecycle>,
    handle: SessionHandle,
    inputs: mpsc::UnboundedSender<SessionInput>,
    events: mpsc::UnboundedSender<SessionEvent>,
    /// Event receiver of an incoming session, until the session is announced
    unannounced: Option<mpsc::UnboundedReceiver<SessionEvent>>,

    local_tag: String,
    contact: Uri,
    /// The initial INVITE, sent or received
    request: Option<Request>,
    local_identity: Option<NameAddr>,
    remote_identity: Option<NameAddr>,

    dialog: Option<Dialog>,
    early_dialogs: HashMap<DialogId, Dialog>,
    /// ACK for the 2xx to our initial INVITE
    invite_ack: Option<Request>,
    /// ACK for the 2xx to our latest re-INVITE
    reinvite_ack: Option<Request>,

    received_100: bool,
    cancel: Option<PendingCancel>,
    late_offer: bool,
    expires: Option<Duration>,
    answer_headers: Headers,
    unacked_2xx: Option<Unacked2xx>,
    reinvite: Option<OutgoingReinvite>,
    incoming_reinvite: Option<Request>,

    timers: TimerSet,
    dtmf: DtmfSequencer,
    media_task: Option<JoinHandle<()>>,
    queued_media: VecDeque<MediaOp>,
    pending_outcome: Option<Outcome>,

    local_streams: StreamSet,
    remote_streams: StreamSet,
    muted: bool,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

impl Session {
    fn new(
        params: SessionParams,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<SessionInput>,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::Null);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let handle = SessionHandle::new(
            params.key.clone(),
            params.direction,
            inputs_tx.clone(),
            status_rx,
        );
        let media = params.media_factory.create_engine(&handle);
        let local_tag = match params.direction {
            Direction::Outgoing => params.key.from_tag.clone(),
            Direction::Incoming => rtcsip_sip_core::utils::generate_tag(),
        };

        let session = Self {
            key: params.key,
            direction: params.direction,
            status: SessionStatus::Null,
            status_tx,
            contact: params.config.contact_uri(),
            dtmf: DtmfSequencer::new(params.config.dtmf),
            config: params.config,
            transport: params.transport,
            media,
            lifecycle: params.lifecycle,
            handle,
            timers: TimerSet::new(inputs_tx.clone()),
            inputs: inputs_tx,
            events: events_tx,
            unannounced: None,
            local_tag,
            request: None,
            local_identity: None,
            remote_identity: None,
            dialog: None,
            early_dialogs: HashMap::new(),
            invite_ack: None,
            reinvite_ack: None,
            received_100: false,
            cancel: None,
            late_offer: false,
            expires: None,
            answer_headers: Headers::new(),
            unacked_2xx: None,
            reinvite: None,
            incoming_reinvite: None,
            media_task: None,
            queued_media: VecDeque::new(),
            pending_outcome: None,
            local_streams: StreamSet::default(),
            remote_streams: StreamSet::default(),
            muted: false,
            start_time: None,
            end_time: None,
        };
        (session, inputs_rx, events_rx)
    }

    /// Start an outgoing session. It stays in `Null` until connected.
    pub(crate) fn spawn_outgoing(
        params: SessionParams,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (session, inputs, events) = Self::new(params);
        let handle = session.handle.clone();
        tokio::spawn(session.run(inputs));
        (handle, events)
    }

    /// Start an incoming session for `invite`. Its event receiver is handed
    /// to the lifecycle once the INVITE has been accepted for ringing.
    pub(crate) fn spawn_incoming(params: SessionParams, invite: Request) -> SessionHandle {
        let (mut session, inputs, events) = Self::new(params);
        session.unannounced = Some(events);
        let handle = session.handle.clone();
        handle.deliver(SessionInput::Request(invite));
        tokio::spawn(session.run(inputs));
        handle
    }

    async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<SessionInput>) {
        debug!("Session {} started ({:?})", self.key, self.direction);

        while let Some(input) = inputs.recv().await {
            if let Err(e) = self.handle_input(input).await {
                warn!("Session {}: {}", self.key, e);
            }
            if self.status.is_terminated() {
                break;
            }
        }

        // Inputs queued behind the one that closed the session
        inputs.close();
        while let Ok(input) = inputs.try_recv() {
            match input {
                SessionInput::Command(command) => command.refuse(),
                SessionInput::Media(step) => step.discard(),
                input => self.refuse(input).await,
            }
        }

        debug!("Session {} loop ended", self.key);
    }

    async fn handle_input(&mut self, input: SessionInput) -> Result<()> {
        match input {
            SessionInput::Command(command) => self.on_command(command).await,
            SessionInput::Media(step) => self.on_media(step).await,
            input if self.is_finishing() => {
                self.refuse(input).await;
                Ok(())
            }
            SessionInput::Request(request) => self.on_request(request).await,
            SessionInput::Response(response) => self.on_response(response).await,
            SessionInput::TransportError => {
                self.on_transport_error().await;
                Ok(())
            }
            SessionInput::RequestTimeout => {
                self.on_request_timeout().await;
                Ok(())
            }
            SessionInput::Timer { kind, token } => {
                if self.timers.fired(kind, token) {
                    self.on_timer(kind).await?;
                }
                Ok(())
            }
            SessionInput::DtmfTick { token } => self.on_dtmf_tick(token).await,
            SessionInput::RemoteStreamAdded(stream) => {
                self.on_remote_stream_added(stream);
                Ok(())
            }
            SessionInput::RemoteStreamRemoved(id) => {
                self.on_remote_stream_removed(&id);
                Ok(())
            }
        }
    }

    async fn on_command(&mut self, command: Command) -> Result<()> {
        if self.is_finishing() {
            match command {
                Command::Terminate { reply, .. } => {
                    let _ = reply.send(Ok(()));
                }
                Command::Info { reply } => {
                    let _ = reply.send(Ok(self.info()));
                }
                other => other.refuse(),
            }
            return Ok(());
        }

        match command {
            Command::Connect {
                target,
                options,
                reply,
            } => {
                let _ = reply.send(self.connect(target, options).await);
            }
            Command::Answer { options, reply } => {
                let _ = reply.send(self.answer(options).await);
            }
            Command::Terminate { options, reply } => {
                let _ = reply.send(self.terminate(options).await);
            }
            Command::SendDtmf {
                tones,
                options,
                reply,
            } => {
                let _ = reply.send(self.send_dtmf(&tones, options).await);
            }
            Command::ToggleMute { reply } => {
                let _ = reply.send(Ok(self.toggle_mute()));
            }
            Command::AddStream {
                stream,
                dont_reinvite,
                reply,
            } => self.add_stream(stream, dont_reinvite, reply),
            Command::RemoveStream {
                stream_id,
                dont_reinvite,
                reply,
            } => self.remove_stream(&stream_id, dont_reinvite, reply),
            Command::SendReinvite { options, reply } => {
                let _ = reply.send(self.send_reinvite(options));
            }
            Command::Info { reply } => {
                let _ = reply.send(Ok(self.info()));
            }
        }
        Ok(())
    }

    async fn on_media(&mut self, step: MediaStep) -> Result<()> {
        self.media_task = None;

        if let Some(outcome) = self.pending_outcome.take() {
            debug!("Session {}: discarding media result, closing", self.key);
            step.discard();
            self.queued_media.clear();
            self.complete(outcome).await;
            return Ok(());
        }

        let result = match step {
            MediaStep::LocalMedia { purpose, result } => match purpose {
                LocalMediaPurpose::Invite => self.on_invite_media(result).await,
                LocalMediaPurpose::Answer => self.on_answer_media(result).await,
            },
            MediaStep::LocalSdp { purpose, result } => match purpose {
                SdpPurpose::InviteOffer => self.on_invite_offer(result).await,
                SdpPurpose::Answer => self.on_answer_sdp(result).await,
                SdpPurpose::ReinviteOffer => self.on_reinvite_offer(result).await,
                SdpPurpose::ReinviteAnswer => self.on_reinvite_answer_sdp(result).await,
            },
            MediaStep::RemoteApplied { purpose, result } => match purpose {
                ApplyPurpose::InviteAnswer(response) => {
                    self.on_invite_answer_applied(response, result).await
                }
                ApplyPurpose::IncomingOffer => self.on_incoming_offer_applied(result).await,
                ApplyPurpose::ReinviteAnswer(response) => {
                    self.on_reinvite_answer_applied(response, result).await
                }
                ApplyPurpose::ReinviteOffer => self.on_reinvite_offer_applied(result).await,
                ApplyPurpose::AckAnswer => self.on_ack_answer_applied(result).await,
            },
            MediaStep::StreamChanged {
                change,
                dont_reinvite,
                result,
                reply,
            } => {
                self.on_stream_changed(change, dont_reinvite, result, reply);
                Ok(())
            }
        };

        if !self.status.is_terminated() && self.media_task.is_none() {
            if let Some(op) = self.queued_media.pop_front() {
                self.start_media(op);
            }
        }
        result
    }

    /// Inputs that arrive after the outcome was decided
    async fn refuse(&mut self, input: SessionInput) {
        match input {
            SessionInput::Request(request) if request.method != Method::Ack => {
                debug!(
                    "Session {} is closing, refusing {}",
                    self.key, request.method
                );
                let response = self.response_to(&request, StatusCode::CALL_DOES_NOT_EXIST);
                let _ = self.transport.send_response(response).await;
            }
            // A forked 2xx still needs its ACK and BYE
            SessionInput::Response(response)
                if response.cseq.method == Method::Invite && response.status.is_success() =>
            {
                self.on_repeated_2xx(&response).await;
            }
            SessionInput::RemoteStreamAdded(stream) => stream.stop(),
            _ => {}
        }
    }

    async fn on_request(&mut self, request: Request) -> Result<()> {
        debug!("Session {} received {}", self.key, request.method);
        match request.method {
            Method::Invite if request.to_tag().is_none() => {
                if self.status == SessionStatus::Null && self.direction == Direction::Incoming {
                    self.init_incoming(request).await
                } else {
                    debug!("Ignoring retransmitted INVITE");
                    Ok(())
                }
            }
            Method::Ack => self.on_ack(request).await,
            Method::Cancel => self.on_cancel(request).await,
            _ => {
                if !self.check_in_dialog(&request).await {
                    return Ok(());
                }
                match request.method {
                    Method::Invite => self.on_reinvite(request).await,
                    Method::Bye => self.on_bye(request).await,
                    Method::Info => self.on_info(request).await,
                    _ => {
                        let response = self
                            .response_to(&request, StatusCode::METHOD_NOT_ALLOWED)
                            .with_header(header_names::ALLOW, self.config.allow_header());
                        self.send_response(response).await;
                        Ok(())
                    }
                }
            }
        }
    }

    /// Validate the CSeq of an in-dialog request. Out-of-order requests are
    /// answered with 500 and dropped.
    async fn check_in_dialog(&mut self, request: &Request) -> bool {
        let Some(id) = DialogId::for_incoming(request) else {
            return true;
        };
        let dialog = match self.dialog.as_mut() {
            Some(dialog) if dialog.id() == &id => Some(dialog),
            _ => self.early_dialogs.get_mut(&id),
        };
        let Some(dialog) = dialog else {
            return true;
        };
        if let Err(e) = dialog.check_in_dialog_request(request) {
            warn!("Session {}: {}", self.key, e);
            let response = self
                .response_to(request, StatusCode::SERVER_INTERNAL_ERROR)
                .with_reason("Out of order CSeq");
            self.send_response(response).await;
            return false;
        }
        true
    }

    async fn on_response(&mut self, response: Response) -> Result<()> {
        debug!("Session {} received {}", self.key, response);
        match response.cseq.method {
            Method::Invite => {
                let reinvite_cseq = self.reinvite.as_ref().and_then(|r| r.cseq);
                if reinvite_cseq == Some(response.cseq.seq) {
                    self.on_reinvite_response(response).await
                } else if self.request.as_ref().map(|r| r.cseq.seq) == Some(response.cseq.seq) {
                    self.on_invite_response(response).await
                } else {
                    debug!("Ignoring response to an unknown INVITE");
                    Ok(())
                }
            }
            Method::Info => {
                self.on_info_response(response).await;
                Ok(())
            }
            Method::Bye => {
                if is_dialog_error(response.status) {
                    self.on_dialog_error(response.status).await;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn on_timer(&mut self, kind: TimerKind) -> Result<()> {
        debug!("Session {}: {:?} timer fired", self.key, kind);
        match kind {
            TimerKind::Invite2xx => self.on_2xx_retransmit_timer().await,
            TimerKind::Ack => self.on_ack_timeout().await,
            TimerKind::NoAnswer => self.on_no_answer_timeout().await,
            TimerKind::Expires => self.on_expires_timeout().await,
        }
        Ok(())
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            key: self.key.clone(),
            direction: self.direction,
            status: self.status,
            local_identity: self.local_identity.clone(),
            remote_identity: self.remote_identity.clone(),
            dialog: self.dialog.as_ref().map(|d| d.id().clone()),
            start_time: self.start_time,
            end_time: self.end_time,
            muted: self.muted,
            local_streams: self.local_streams.ids(),
            remote_streams: self.remote_streams.ids(),
        }
    }

    // ---- helpers shared by the handlers ----

    fn is_finishing(&self) -> bool {
        self.pending_outcome.is_some() || self.status.is_terminated()
    }

    fn set_status(&mut self, next: SessionStatus) -> Result<()> {
        let next = self.status.transition(next)?;
        if next != self.status {
            debug!("Session {}: {} -> {}", self.key, self.status, next);
            self.status = next;
            self.status_tx.send_replace(next);
        }
        Ok(())
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn media_busy(&self) -> bool {
        self.media_task.is_some()
    }

    /// Run a media engine operation, or queue it behind the running one
    fn spawn_media<F, Fut>(&mut self, op: F)
    where
        F: FnOnce(Arc<dyn MediaEngine>) -> Fut + Send + 'static,
        Fut: Future<Output = MediaStep> + Send + 'static,
    {
        let op: MediaOp = Box::new(move |engine| op(engine).boxed());
        if self.media_busy() {
            self.queued_media.push_back(op);
        } else {
            self.start_media(op);
        }
    }

    fn start_media(&mut self, op: MediaOp) {
        let engine = self.media.clone();
        let inputs = self.inputs.clone();
        self.media_task = Some(tokio::spawn(async move {
            let step = op(engine).await;
            let _ = inputs.send(SessionInput::Media(step));
        }));
    }

    fn spawn_sdp(&mut self, purpose: SdpPurpose, offer: bool) {
        self.spawn_media(move |engine| async move {
            let result = if offer {
                engine.create_offer().await
            } else {
                engine.create_answer().await
            };
            MediaStep::LocalSdp { purpose, result }
        });
    }

    fn spawn_apply(&mut self, purpose: ApplyPurpose, kind: SdpKind, sdp: &str) {
        let sdp = sdp.to_string();
        self.spawn_media(move |engine| async move {
            let result = engine.apply_remote(kind, &sdp).await;
            MediaStep::RemoteApplied { purpose, result }
        });
    }

    /// Capture (unless supplied) and attach a local stream
    fn spawn_local_media(
        &mut self,
        purpose: LocalMediaPurpose,
        constraints: crate::ports::MediaConstraints,
        supplied: Option<MediaStream>,
    ) {
        self.spawn_media(move |engine| async move {
            let stream = match supplied {
                Some(stream) => stream,
                None => match engine.acquire_local_media(&constraints).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        return MediaStep::LocalMedia {
                            purpose,
                            result: Err(LocalMediaError::Denied(e)),
                        }
                    }
                },
            };
            let result = match engine.add_stream(&stream).await {
                Ok(()) => Ok(stream),
                Err(e) => Err(LocalMediaError::Attach(stream, e)),
            };
            MediaStep::LocalMedia { purpose, result }
        });
    }

    /// Response to `request` carrying our To tag
    fn response_to(&self, request: &Request, status: StatusCode) -> Response {
        Response::from_request(request, status).with_to_tag(self.local_tag.clone())
    }

    /// Response to the initial INVITE; dialog-creating ones carry our Contact
    fn invite_response(&self, status: StatusCode) -> Option<Response> {
        let invite = self.request.as_ref()?;
        let response = self.response_to(invite, status);
        if status.is_provisional() || status.is_success() {
            Some(response.with_contact(self.contact.clone()))
        } else {
            Some(response)
        }
    }

    async fn reply_to_invite(&mut self, status: StatusCode, reason: Option<&str>) -> bool {
        let Some(mut response) = self.invite_response(status) else {
            return false;
        };
        if let Some(reason) = reason {
            response = response.with_reason(reason);
        }
        self.send_response(response).await
    }

    /// Send a request; a transport failure takes the transport-error path
    async fn send_request(&mut self, request: Request) -> bool {
        let method = request.method.clone();
        match self.transport.send_request(request).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Session {}: sending {} failed: {}", self.key, method, e);
                self.on_transport_error().await;
                false
            }
        }
    }

    async fn send_response(&mut self, response: Response) -> bool {
        let status = response.status;
        match self.transport.send_response(response).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Session {}: sending {} failed: {}", self.key, status, e);
                self.on_transport_error().await;
                false
            }
        }
    }

    fn in_dialog_request(
        &mut self,
        method: Method,
        headers: Headers,
        body: Option<Body>,
    ) -> Result<Request> {
        let status = self.status;
        let dialog = self
            .dialog
            .as_mut()
            .ok_or_else(|| SessionError::invalid_state(status))?;
        Ok(dialog.create_request(method, headers, body)?)
    }

    /// ACK a 2xx to the INVITE with sequence number `cseq`
    async fn send_ack(&mut self, cseq: u32) -> bool {
        let ack = match self.dialog.as_ref().map(|d| d.create_ack(cseq, None)) {
            Some(Ok(ack)) => ack,
            Some(Err(e)) => {
                warn!("Session {}: cannot build ACK: {}", self.key, e);
                return false;
            }
            None => return false,
        };
        let initial = self.direction == Direction::Outgoing
            && self.request.as_ref().map(|r| r.cseq.seq) == Some(cseq);
        if initial {
            self.invite_ack = Some(ack.clone());
        } else {
            self.reinvite_ack = Some(ack.clone());
        }
        self.send_request(ack).await
    }

    /// The ACK already sent for the 2xx with this CSeq
    fn sent_ack(&self, cseq: u32) -> Option<Request> {
        [&self.invite_ack, &self.reinvite_ack]
            .into_iter()
            .flatten()
            .find(|ack| ack.cseq.seq == cseq)
            .cloned()
    }

    async fn send_bye(&mut self, headers: Headers, body: Option<Body>) -> bool {
        match self.in_dialog_request(Method::Bye, headers, body) {
            Ok(bye) => self.send_request(bye).await,
            Err(e) => {
                warn!("Session {}: cannot build BYE: {}", self.key, e);
                false
            }
        }
    }
}

impl Command {
    /// Answer a command the closing session will not run
    fn refuse(self) {
        match self {
            Command::Connect { reply, .. }
            | Command::Answer { reply, .. }
            | Command::Terminate { reply, .. }
            | Command::SendDtmf { reply, .. }
            | Command::AddStream { reply, .. }
            | Command::RemoveStream { reply, .. }
            | Command::SendReinvite { reply, .. } => {
                let _ = reply.send(Err(SessionError::Terminated));
            }
            Command::ToggleMute { reply } => {
                let _ = reply.send(Err(SessionError::Terminated));
            }
            Command::Info { reply } => {
                let _ = reply.send(Err(SessionError::Terminated));
            }
        }
    }
}

/// 408 and 481 to an in-dialog request mean the dialog is gone
fn is_dialog_error(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::CALL_DOES_NOT_EXIST
}

/// Value of a `Reason: SIP` header
pub(crate) fn reason_header(code: u16, phrase: &str) -> String {
    format!("SIP ;cause={} ;text=\"{}\"", code, phrase)
}

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_header_format() {
        assert_eq!(
            reason_header(488, "Not Acceptable Here"),
            "SIP ;cause=488 ;text=\"Not Acceptable Here\""
        );
    }

    #[test]
    fn test_dialog_error_codes() {
        assert!(is_dialog_error(StatusCode::REQUEST_TIMEOUT));
        assert!(is_dialog_error(StatusCode::CALL_DOES_NOT_EXIST));
        assert!(!is_dialog_error(StatusCode::BUSY_HERE));
    }
}
