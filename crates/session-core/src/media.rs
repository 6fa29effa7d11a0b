//! Media stream bookkeeping
//!
//! Streams and tracks are plain containers. Clones share the enabled/ended
//! flags of a track, so an application holding a stream observes mute and
//! stop performed by the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug)]
struct TrackState {
    enabled: AtomicBool,
    ended: AtomicBool,
}

/// One audio or video track
#[derive(Debug, Clone)]
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    state: Arc<TrackState>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), kind)
    }

    pub fn with_id(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            state: Arc::new(TrackState {
                enabled: AtomicBool::new(true),
                ended: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.state.ended.store(true, Ordering::SeqCst);
    }

    pub fn is_ended(&self) -> bool {
        self.state.ended.load(Ordering::SeqCst)
    }
}

/// A set of tracks negotiated together
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), tracks)
    }

    pub fn with_id(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Video)
    }

    /// Stop every track
    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    /// All tracks stopped
    pub fn is_ended(&self) -> bool {
        self.tracks.iter().all(MediaTrack::is_ended)
    }
}

/// Insertion-ordered streams, unique by id
#[derive(Debug, Default)]
pub(crate) struct StreamSet {
    streams: IndexMap<String, MediaStream>,
}

impl StreamSet {
    /// Insert unless a stream with the same id is present
    pub(crate) fn insert(&mut self, stream: MediaStream) -> bool {
        if self.streams.contains_key(stream.id()) {
            return false;
        }
        self.streams.insert(stream.id().to_string(), stream);
        true
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<MediaStream> {
        self.streams.shift_remove(id)
    }

    pub(crate) fn get(&self, id: &str) -> Option<&MediaStream> {
        self.streams.get(id)
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.streams.contains_key(id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &MediaStream> {
        self.streams.values()
    }

    pub(crate) fn ids(&self) -> Vec<String> {
        self.streams.keys().cloned().collect()
    }

    pub(crate) fn stop_all(&self) {
        for stream in self.streams.values() {
            stream.stop();
        }
    }
}
