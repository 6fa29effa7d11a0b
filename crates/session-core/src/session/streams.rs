use tracing::{debug, warn};

use super::{MediaStep, ReinviteOptions, Reply, Session, StreamChange};
use crate::errors::SessionError;
use crate::events::SessionEvent;
use crate::media::MediaStream;
use crate::ports::MediaError;
use crate::types::{Originator, SessionStatus};

impl Session {
    /// Record a local stream the engine has taken
    pub(super) fn attach_local_stream(&mut self, stream: MediaStream) {
        if self.muted {
            stream.audio_tracks().for_each(|track| track.set_enabled(false));
        }
        if self.local_streams.insert(stream.clone()) {
            self.emit(SessionEvent::MediaStreamAdded {
                originator: Originator::Local,
                stream,
            });
        }
    }

    pub(super) fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        let enabled = !self.muted;
        for stream in self.local_streams.iter() {
            stream
                .audio_tracks()
                .for_each(|track| track.set_enabled(enabled));
        }
        debug!("Session {}: muted = {}", self.key, self.muted);
        let originator = Originator::Local;
        self.emit(if self.muted {
            SessionEvent::Muted { originator }
        } else {
            SessionEvent::Unmuted { originator }
        });
        self.muted
    }

    pub(super) fn add_stream(&mut self, stream: MediaStream, dont_reinvite: bool, reply: Reply<()>) {
        if self.local_streams.contains(stream.id()) {
            warn!("Session {}: stream {} already added", self.key, stream.id());
            let _ = reply.send(Ok(()));
            return;
        }
        self.spawn_media(move |engine| async move {
            let result = engine.add_stream(&stream).await;
            MediaStep::StreamChanged {
                change: StreamChange::Added(stream),
                dont_reinvite,
                result,
                reply,
            }
        });
    }

    pub(super) fn remove_stream(&mut self, stream_id: &str, dont_reinvite: bool, reply: Reply<()>) {
        let Some(stream) = self.local_streams.get(stream_id).cloned() else {
            warn!("Session {}: no local stream {}", self.key, stream_id);
            let _ = reply.send(Ok(()));
            return;
        };
        self.spawn_media(move |engine| async move {
            let result = engine.remove_stream(&stream).await;
            MediaStep::StreamChanged {
                change: StreamChange::Removed(stream),
                dont_reinvite,
                result,
                reply,
            }
        });
    }

    pub(super) fn on_stream_changed(
        &mut self,
        change: StreamChange,
        dont_reinvite: bool,
        result: std::result::Result<(), MediaError>,
        reply: Reply<()>,
    ) {
        if let Err(e) = result {
            warn!("Session {}: stream change failed: {}", self.key, e);
            let _ = reply.send(Err(SessionError::Media(e)));
            return;
        }

        match change {
            StreamChange::Added(stream) => self.attach_local_stream(stream),
            StreamChange::Removed(stream) => {
                if let Some(stream) = self.local_streams.remove(stream.id()) {
                    stream.stop();
                    self.emit(SessionEvent::MediaStreamRemoved {
                        originator: Originator::Local,
                        stream,
                    });
                }
            }
        }
        let _ = reply.send(Ok(()));

        if dont_reinvite || self.status != SessionStatus::Confirmed {
            return;
        }
        if self.renegotiating() {
            debug!(
                "Session {}: renegotiation already running, no re-INVITE",
                self.key
            );
            return;
        }
        self.start_reinvite(ReinviteOptions::default());
    }

    pub(super) fn on_remote_stream_added(&mut self, stream: MediaStream) {
        if self.remote_streams.insert(stream.clone()) {
            self.emit(SessionEvent::MediaStreamAdded {
                originator: Originator::Remote,
                stream,
            });
        }
    }

    pub(super) fn on_remote_stream_removed(&mut self, stream_id: &str) {
        if let Some(stream) = self.remote_streams.remove(stream_id) {
            self.emit(SessionEvent::MediaStreamRemoved {
                originator: Originator::Remote,
                stream,
            });
        }
    }
}
