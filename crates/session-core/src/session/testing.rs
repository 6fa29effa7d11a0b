//! Test doubles for driving a [`Session`] without its task

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use rtcsip_sip_core::{Request, Response};

use super::{Session, SessionHandle, SessionInput, SessionParams};
use crate::config::UserAgentConfig;
use crate::events::SessionEvent;
use crate::media::{MediaStream, MediaTrack, TrackKind};
use crate::ports::{
    MediaConstraints, MediaEngine, MediaEngineFactory, MediaError, SdpKind, Transport,
    TransportError,
};
use crate::registry::SessionLifecycle;
use crate::types::{Direction, SessionKey};

#[derive(Default)]
pub(crate) struct RecordingTransport {
    pub(crate) requests: Mutex<Vec<Request>>,
    pub(crate) responses: Mutex<Vec<Response>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_request(&self, request: Request) -> Result<(), TransportError> {
        self.requests.lock().push(request);
        Ok(())
    }

    async fn send_response(&self, response: Response) -> Result<(), TransportError> {
        self.responses.lock().push(response);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct StubMedia {
    pub(crate) closes: AtomicUsize,
}

#[async_trait]
impl MediaEngine for StubMedia {
    async fn acquire_local_media(
        &self,
        _constraints: &MediaConstraints,
    ) -> Result<MediaStream, MediaError> {
        Ok(MediaStream::new(vec![MediaTrack::new(TrackKind::Audio)]))
    }

    async fn add_stream(&self, _stream: &MediaStream) -> Result<(), MediaError> {
        Ok(())
    }

    async fn remove_stream(&self, _stream: &MediaStream) -> Result<(), MediaError> {
        Ok(())
    }

    async fn create_offer(&self) -> Result<String, MediaError> {
        Ok("v=0 offer".into())
    }

    async fn create_answer(&self) -> Result<String, MediaError> {
        Ok("v=0 answer".into())
    }

    async fn apply_remote(&self, _kind: SdpKind, _sdp: &str) -> Result<(), MediaError> {
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct StubFactory(Arc<StubMedia>);

impl MediaEngineFactory for StubFactory {
    fn create_engine(&self, _session: &SessionHandle) -> Arc<dyn MediaEngine> {
        self.0.clone()
    }
}

#[derive(Default)]
pub(crate) struct CountingLifecycle {
    pub(crate) destroyed: AtomicUsize,
}

impl SessionLifecycle for CountingLifecycle {
    fn incoming_session_ready(
        &self,
        _handle: SessionHandle,
        _events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
    }

    fn session_destroyed(&self, _key: &SessionKey) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct Harness {
    pub(crate) session: Session,
    pub(crate) inputs: mpsc::UnboundedReceiver<SessionInput>,
    pub(crate) events: mpsc::UnboundedReceiver<SessionEvent>,
    pub(crate) transport: Arc<RecordingTransport>,
    pub(crate) media: Arc<StubMedia>,
    pub(crate) lifecycle: Arc<CountingLifecycle>,
}

impl Harness {
    pub(crate) fn new(direction: Direction) -> Self {
        let transport = Arc::new(RecordingTransport::default());
        let media = Arc::new(StubMedia::default());
        let lifecycle = Arc::new(CountingLifecycle::default());
        let params = SessionParams {
            key: SessionKey::new("harness-call", "harness-tag"),
            direction,
            config: Arc::new(UserAgentConfig::default()),
            transport: transport.clone(),
            media_factory: Arc::new(StubFactory(media.clone())),
            lifecycle: lifecycle.clone(),
        };
        let (session, inputs, events) = Session::new(params);
        Self {
            session,
            inputs,
            events,
            transport,
            media,
            lifecycle,
        }
    }

    /// Feed the next queued input to the session
    pub(crate) async fn step(&mut self) {
        let input = self.inputs.recv().await.expect("session input");
        let _ = self.session.handle_input(input).await;
    }
}
