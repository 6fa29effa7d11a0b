use tokio::sync::{mpsc, oneshot, watch};

use rtcsip_sip_core::Uri;

use super::{
    AnswerOptions, CallOptions, Command, DtmfOptions, ReinviteOptions, SessionInput,
    TerminateOptions,
};
use crate::errors::{Result, SessionError};
use crate::media::MediaStream;
use crate::types::{Direction, SessionInfo, SessionKey, SessionStatus};

/// Cheap, cloneable handle to a running session.
///
/// Every command is queued to the session task and answered once processed.
/// Once the session is closed, commands fail with [`SessionError::Terminated`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    key: SessionKey,
    direction: Direction,
    inputs: mpsc::UnboundedSender<SessionInput>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    pub(crate) fn new(
        key: SessionKey,
        direction: Direction,
        inputs: mpsc::UnboundedSender<SessionInput>,
        status: watch::Receiver<SessionStatus>,
    ) -> Self {
        Self {
            key,
            direction,
            inputs,
            status,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Current status
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Wait until the session is closed
    pub async fn closed(&self) {
        let mut status = self.status.clone();
        let _ = status.wait_for(|s| s.is_terminated()).await;
    }

    /// Send the initial INVITE of an outgoing session
    pub async fn connect(&self, target: Uri, options: CallOptions) -> Result<()> {
        self.call(|reply| Command::Connect {
            target,
            options,
            reply,
        })
        .await
    }

    /// Accept an incoming session
    pub async fn answer(&self, options: AnswerOptions) -> Result<()> {
        self.call(|reply| Command::Answer { options, reply }).await
    }

    /// Cancel, reject or hang up, depending on the status
    pub async fn terminate(&self, options: TerminateOptions) -> Result<()> {
        self.call(|reply| Command::Terminate { options, reply }).await
    }

    /// Queue DTMF tones, sent one INFO per tone
    pub async fn send_dtmf(&self, tones: &str, options: DtmfOptions) -> Result<()> {
        let tones = tones.to_string();
        self.call(|reply| Command::SendDtmf {
            tones,
            options,
            reply,
        })
        .await
    }

    /// Flip the enabled state of every local audio track. Returns whether
    /// the session is muted afterwards.
    pub async fn toggle_mute(&self) -> Result<bool> {
        self.call(|reply| Command::ToggleMute { reply }).await
    }

    /// Attach a local stream; renegotiates unless `dont_reinvite`
    pub async fn add_stream(&self, stream: MediaStream, dont_reinvite: bool) -> Result<()> {
        self.call(|reply| Command::AddStream {
            stream,
            dont_reinvite,
            reply,
        })
        .await
    }

    /// Detach a local stream; renegotiates unless `dont_reinvite`
    pub async fn remove_stream(&self, stream_id: &str, dont_reinvite: bool) -> Result<()> {
        let stream_id = stream_id.to_string();
        self.call(|reply| Command::RemoveStream {
            stream_id,
            dont_reinvite,
            reply,
        })
        .await
    }

    /// Renegotiate media with a re-INVITE
    pub async fn send_reinvite(&self, options: ReinviteOptions) -> Result<()> {
        self.call(|reply| Command::SendReinvite { options, reply })
            .await
    }

    /// Snapshot of the session
    pub async fn info(&self) -> Result<SessionInfo> {
        self.call(|reply| Command::Info { reply }).await
    }

    /// Report a stream the media engine received from the peer
    pub fn remote_stream_added(&self, stream: MediaStream) {
        self.deliver(SessionInput::RemoteStreamAdded(stream));
    }

    /// Report that a remote stream went away
    pub fn remote_stream_removed(&self, stream_id: impl Into<String>) {
        self.deliver(SessionInput::RemoteStreamRemoved(stream_id.into()));
    }

    /// Queue an input; false when the session is gone
    pub(crate) fn deliver(&self, input: SessionInput) -> bool {
        self.inputs.send(input).is_ok()
    }

    async fn call<T>(&self, command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        if !self.deliver(SessionInput::Command(command(tx))) {
            return Err(SessionError::Terminated);
        }
        rx.await.map_err(|_| SessionError::Terminated)?
    }
}
