// Common test fixtures for session-core integration tests
//
// A UserAgent wired to a recording transport and a scriptable media
// engine, plus builders for the messages a remote peer would send.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use rtcsip_session_core::{
    MediaConstraints, MediaEngine, MediaEngineFactory, MediaError, MediaStream, MediaTrack,
    SdpKind, SessionEvent, SessionHandle, Transport, TransportError, TrackKind, UserAgent,
    UserAgentConfig, UserAgentEvent,
};
use rtcsip_sip_core::{
    Body, Method, NameAddr, Request, Response, SimpleRequestBuilder, StatusCode, Uri,
};

pub const REMOTE_SDP: &str = "v=0\r\no=bob 1 1 IN IP4 192.0.2.20\r\n";

/// What the session handed to the transport
#[derive(Debug, Clone)]
pub enum Sent {
    Request(Request),
    Response(Response),
}

pub struct MockTransport {
    tx: mpsc::UnboundedSender<Sent>,
    fail: AtomicBool,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Sent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            tx,
            fail: AtomicBool::new(false),
        });
        (transport, rx)
    }

    /// Make every following send fail
    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn record(&self, sent: Sent) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::connection_failed("unreachable"));
        }
        let _ = self.tx.send(sent);
        Ok(())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_request(&self, request: Request) -> Result<(), TransportError> {
        self.record(Sent::Request(request))
    }

    async fn send_response(&self, response: Response) -> Result<(), TransportError> {
        self.record(Sent::Response(response))
    }
}

/// Media engine whose behaviour each test can script
#[derive(Default)]
pub struct MockMedia {
    pub deny_media: AtomicBool,
    pub fail_apply: AtomicBool,
    pub applied: Mutex<Vec<(SdpKind, String)>>,
    pub offers: AtomicUsize,
    pub answers: AtomicUsize,
    pub added: AtomicUsize,
    pub removed: AtomicUsize,
    pub closes: AtomicUsize,
    /// When set, acquire_local_media waits for a notification first
    pub acquire_gate: Mutex<Option<Arc<Notify>>>,
    /// When set, apply_remote waits for a notification first
    pub apply_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockMedia {
    pub fn apply_count(&self) -> usize {
        self.applied.lock().len()
    }

    /// Hold acquire_local_media until the returned notify fires
    pub fn hold_acquire(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.acquire_gate.lock() = Some(gate.clone());
        gate
    }

    /// Hold apply_remote until the returned notify fires
    pub fn hold_apply(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.apply_gate.lock() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl MediaEngine for MockMedia {
    async fn acquire_local_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, MediaError> {
        let gate = self.acquire_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.deny_media.load(Ordering::SeqCst) {
            return Err(MediaError::access_denied("no camera"));
        }
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(MediaTrack::new(TrackKind::Audio));
        }
        if constraints.video {
            tracks.push(MediaTrack::new(TrackKind::Video));
        }
        Ok(MediaStream::new(tracks))
    }

    async fn add_stream(&self, _stream: &MediaStream) -> Result<(), MediaError> {
        self.added.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_stream(&self, _stream: &MediaStream) -> Result<(), MediaError> {
        self.removed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_offer(&self) -> Result<String, MediaError> {
        let n = self.offers.fetch_add(1, Ordering::SeqCst);
        Ok(format!("v=0\r\no=alice 1 {} IN IP4 192.0.2.10\r\n", n + 1))
    }

    async fn create_answer(&self) -> Result<String, MediaError> {
        let n = self.answers.fetch_add(1, Ordering::SeqCst);
        Ok(format!("v=0\r\no=alice 2 {} IN IP4 192.0.2.10\r\n", n + 1))
    }

    async fn apply_remote(&self, kind: SdpKind, sdp: &str) -> Result<(), MediaError> {
        let gate = self.apply_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(MediaError::negotiation("unusable description"));
        }
        self.applied.lock().push((kind, sdp.to_string()));
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands the same engine to every session
pub struct MockFactory(pub Arc<MockMedia>);

impl MediaEngineFactory for MockFactory {
    fn create_engine(&self, _session: &SessionHandle) -> Arc<dyn MediaEngine> {
        self.0.clone()
    }
}

/// A user agent and everything it talks to
pub struct TestAgent {
    pub agent: UserAgent,
    pub incoming: mpsc::UnboundedReceiver<UserAgentEvent>,
    pub transport: Arc<MockTransport>,
    pub sent: mpsc::UnboundedReceiver<Sent>,
    pub media: Arc<MockMedia>,
}

pub fn test_config() -> UserAgentConfig {
    UserAgentConfig::new("sip:alice@example.com".parse().unwrap())
        .with_contact("sip:alice@192.0.2.10:5060".parse().unwrap())
}

impl TestAgent {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: UserAgentConfig) -> Self {
        let (transport, sent) = MockTransport::new();
        let media = Arc::new(MockMedia::default());
        let (agent, incoming) = UserAgent::new(
            config,
            transport.clone(),
            Arc::new(MockFactory(media.clone())),
        )
        .unwrap();
        Self {
            agent,
            incoming,
            transport,
            sent,
            media,
        }
    }

    pub async fn next_sent(&mut self) -> Sent {
        tokio::time::timeout(Duration::from_secs(300), self.sent.recv())
            .await
            .expect("nothing sent in time")
            .expect("transport closed")
    }

    pub async fn next_request(&mut self) -> Request {
        match self.next_sent().await {
            Sent::Request(request) => request,
            Sent::Response(response) => panic!("expected a request, got {}", response),
        }
    }

    pub async fn next_response(&mut self) -> Response {
        match self.next_sent().await {
            Sent::Response(response) => response,
            Sent::Request(request) => panic!("expected a response, got {}", request),
        }
    }

    /// Nothing further was handed to the transport
    pub fn assert_idle(&mut self) {
        if let Ok(sent) = self.sent.try_recv() {
            panic!("unexpected message: {:?}", sent);
        }
    }

    /// Deliver an INVITE and wait for the incoming session announcement
    pub async fn receive_call(
        &mut self,
        invite: Request,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        self.agent.receive_request(invite).await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), self.incoming.recv())
            .await
            .expect("no incoming session")
            .expect("user agent gone");
        match event {
            UserAgentEvent::NewSession { handle, events, .. } => (handle, events),
        }
    }
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(300), events.recv())
        .await
        .expect("no session event in time")
        .expect("session event channel closed")
}

/// Skip events until one matches
pub async fn wait_for_event(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    matches: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    loop {
        let event = next_event(events).await;
        if matches(&event) {
            return event;
        }
    }
}

pub async fn wait_for_end(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    wait_for_event(events, |event| event.cause().is_some()).await
}

fn uri(s: &str) -> Uri {
    s.parse().unwrap()
}

/// The remote side of a call, building the messages a peer would send
pub struct RemotePeer {
    pub contact: Uri,
    cseq: u32,
}

impl RemotePeer {
    pub fn new() -> Self {
        Self {
            contact: uri("sip:bob@192.0.2.20:5060"),
            cseq: 1,
        }
    }

    /// An initial INVITE towards us
    pub fn invite(&mut self, call_id: &str, body: Option<Body>) -> Request {
        SimpleRequestBuilder::new(Method::Invite, uri("sip:alice@192.0.2.10:5060"))
            .from(NameAddr::new(uri("sip:bob@example.com")).with_tag("bob-tag"))
            .to(NameAddr::new(uri("sip:alice@example.com")))
            .call_id(call_id)
            .cseq(self.cseq)
            .contact(self.contact.clone())
            .maybe_body(body)
            .build()
            .unwrap()
    }

    /// A response of ours-as-callee to an INVITE the session sent
    pub fn respond(&self, invite: &Request, status: StatusCode, to_tag: &str) -> Response {
        Response::from_request(invite, status)
            .with_to_tag(to_tag)
            .with_contact(self.contact.clone())
    }

    pub fn answer(&self, invite: &Request, to_tag: &str) -> Response {
        self.respond(invite, StatusCode::OK, to_tag)
            .with_body(Body::sdp(REMOTE_SDP))
    }

    /// An in-dialog request for a dialog established by `response`,
    /// sent by the side that received `response`
    pub fn request_after_response(&mut self, response: &Response, method: Method) -> Request {
        self.cseq += 1;
        self.build_in_dialog(
            response.from.clone(),
            response.to.clone(),
            &response.call_id,
            method,
            self.cseq,
        )
    }

    /// ACK for a 2xx we got from the session
    pub fn ack(&self, response: &Response, body: Option<Body>) -> Request {
        let mut ack = self.build_in_dialog(
            response.from.clone(),
            response.to.clone(),
            &response.call_id,
            Method::Ack,
            response.cseq.seq,
        );
        ack.body = body;
        ack
    }

    /// An in-dialog request from the callee of a call the session placed
    pub fn request_to_caller(&mut self, invite: &Request, to_tag: &str, method: Method) -> Request {
        self.cseq += 1;
        self.build_in_dialog(
            invite.to.clone().with_tag(to_tag),
            invite.from.clone(),
            &invite.call_id,
            method,
            self.cseq,
        )
    }

    fn build_in_dialog(
        &self,
        from: NameAddr,
        to: NameAddr,
        call_id: &str,
        method: Method,
        cseq: u32,
    ) -> Request {
        SimpleRequestBuilder::new(method, uri("sip:alice@192.0.2.10:5060"))
            .from(from)
            .to(to)
            .call_id(call_id)
            .cseq(cseq)
            .contact(self.contact.clone())
            .build()
            .unwrap()
    }
}

/// The response the remote returns for an in-dialog request of ours
pub fn reply(request: &Request, status: StatusCode) -> Response {
    Response::from_request(request, status)
}
