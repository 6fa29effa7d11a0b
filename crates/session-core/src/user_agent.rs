//! User agent: entry point of the call-control core
//!
//! Owns the session registry, creates outgoing sessions, and routes what
//! the transaction layer delivers (requests, responses, transport errors,
//! timeouts) to the session each message belongs to.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use rtcsip_dialog_core::Dialog;
use rtcsip_sip_core::utils::{generate_call_id, generate_tag};
use rtcsip_sip_core::{Method, Request, Response, StatusCode};

use crate::config::UserAgentConfig;
use crate::errors::{Result, SessionError};
use crate::events::{SessionEvent, UserAgentEvent};
use crate::ports::{MediaEngineFactory, Transport};
use crate::registry::{SessionLifecycle, SessionRegistry};
use crate::session::{
    release_requests, CallOptions, Session, SessionHandle, SessionInput, SessionParams,
    TerminateOptions,
};
use crate::types::{Direction, Originator, SessionKey};

/// Lifecycle hooks that keep the registry in sync and announce incoming calls
struct RegistryHooks {
    registry: Arc<SessionRegistry>,
    events: mpsc::UnboundedSender<UserAgentEvent>,
}

impl SessionLifecycle for RegistryHooks {
    fn incoming_session_ready(
        &self,
        handle: SessionHandle,
        events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        info!("New incoming session {}", handle.key());
        let event = UserAgentEvent::NewSession {
            originator: Originator::Remote,
            handle,
            events,
        };
        if self.events.send(event).is_err() {
            warn!("No listener for incoming sessions");
        }
    }

    fn session_destroyed(&self, key: &SessionKey) {
        self.registry.remove(key);
    }
}

pub struct UserAgent {
    config: Arc<UserAgentConfig>,
    transport: Arc<dyn Transport>,
    media_factory: Arc<dyn MediaEngineFactory>,
    registry: Arc<SessionRegistry>,
    hooks: Arc<RegistryHooks>,
}

impl UserAgent {
    /// Create a user agent. Incoming sessions are announced on the returned
    /// receiver.
    pub fn new(
        config: UserAgentConfig,
        transport: Arc<dyn Transport>,
        media_factory: Arc<dyn MediaEngineFactory>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<UserAgentEvent>)> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(SessionRegistry::new());
        let hooks = Arc::new(RegistryHooks {
            registry: registry.clone(),
            events: events_tx,
        });
        info!("User agent {} ready", config.uri);

        let agent = Self {
            config: Arc::new(config),
            transport,
            media_factory,
            registry,
            hooks,
        };
        Ok((agent, events_rx))
    }

    pub fn config(&self) -> &UserAgentConfig {
        &self.config
    }

    fn params(&self, key: SessionKey, direction: Direction) -> SessionParams {
        SessionParams {
            key,
            direction,
            config: self.config.clone(),
            transport: self.transport.clone(),
            media_factory: self.media_factory.clone(),
            lifecycle: self.hooks.clone(),
        }
    }

    /// Place a call to `target`, a SIP URI or a bare user of our domain
    pub async fn call(
        &self,
        target: &str,
        options: CallOptions,
    ) -> Result<(SessionHandle, mpsc::UnboundedReceiver<SessionEvent>)> {
        let target = self.config.normalize_target(target)?;
        let key = SessionKey::new(generate_call_id(), generate_tag());

        let mut events = None;
        let handle = self.registry.insert_with(key.clone(), || {
            let (handle, rx) = Session::spawn_outgoing(self.params(key, Direction::Outgoing));
            events = Some(rx);
            handle
        })?;
        let events = events.ok_or(SessionError::Terminated)?;

        if let Err(e) = handle.connect(target, options).await {
            let _ = handle.terminate(TerminateOptions::default()).await;
            return Err(e);
        }
        Ok((handle, events))
    }

    /// Hand over a request received from the network
    pub async fn receive_request(&self, request: Request) -> Result<()> {
        if request.method == Method::Invite && request.to_tag().is_none() {
            return self.receive_invite(request).await;
        }

        if let Some(handle) = self.registry.find_for_request(&request) {
            if handle.deliver(SessionInput::Request(request.clone())) {
                return Ok(());
            }
        }
        if request.method == Method::Ack {
            debug!("Dropping ACK for unknown session {}", request.call_id);
            return Ok(());
        }
        debug!("No session for {} {}", request.method, request.call_id);
        let response = Response::from_request(&request, StatusCode::CALL_DOES_NOT_EXIST)
            .with_to_tag(generate_tag());
        self.transport.send_response(response).await?;
        Ok(())
    }

    async fn receive_invite(&self, invite: Request) -> Result<()> {
        let Some(from_tag) = invite.from_tag().map(str::to_string) else {
            warn!("INVITE without From tag");
            let response = Response::from_request(&invite, StatusCode::BAD_REQUEST)
                .with_reason("Missing From tag")
                .with_to_tag(generate_tag());
            self.transport.send_response(response).await?;
            return Ok(());
        };

        let key = SessionKey::new(invite.call_id.clone(), from_tag);
        let created = self.registry.insert_with(key.clone(), || {
            Session::spawn_incoming(self.params(key.clone(), Direction::Incoming), invite)
        });
        match created {
            Ok(_) => Ok(()),
            Err(SessionError::AlreadyExists { .. }) => {
                debug!("Retransmitted INVITE for {}", key);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Hand over a response received from the network
    pub fn receive_response(&self, response: Response) {
        if let Some(handle) = self.registry.find_for_response(&response) {
            if handle.deliver(SessionInput::Response(response.clone())) {
                return;
            }
        }
        if response.cseq.method == Method::Invite && response.status.is_success() {
            self.release_orphan_2xx(response);
        } else {
            debug!("Dropping {} for unknown session", response);
        }
    }

    /// ACK and hang up a 2xx to an INVITE no session tracks any more, such
    /// as a fork answering after the call was cancelled
    fn release_orphan_2xx(&self, response: Response) {
        let requests = Dialog::from_orphan_2xx(&response, Some(self.config.contact_uri()))
            .and_then(|fork| release_requests(fork, response.cseq.seq));
        let (ack, bye) = match requests {
            Ok(requests) => requests,
            Err(e) => {
                warn!("Cannot release {} for unknown session: {}", response, e);
                return;
            }
        };

        info!("Releasing dialog of {} for call {}", response, response.call_id);
        let transport = self.transport.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.send_request(ack).await {
                warn!("Sending ACK for released dialog failed: {}", e);
                return;
            }
            if let Err(e) = transport.send_request(bye).await {
                warn!("Sending BYE for released dialog failed: {}", e);
            }
        });
    }

    /// The transport could not deliver `request`
    pub fn transport_error(&self, request: &Request) {
        if let Some(handle) = self.registry.find_for_request(request) {
            handle.deliver(SessionInput::TransportError);
        }
    }

    /// No final response arrived for `request`
    pub fn request_timeout(&self, request: &Request) {
        if let Some(handle) = self.registry.find_for_request(request) {
            handle.deliver(SessionInput::RequestTimeout);
        }
    }

    pub fn session(&self, key: &SessionKey) -> Option<SessionHandle> {
        self.registry.get(key)
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }
}
