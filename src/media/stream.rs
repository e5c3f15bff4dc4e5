//! Media streams
//!
//! A capture stream owns its tracks. The encoder never sees capture streams
//! directly; it consumes a [`CombinedStream`] of one video track and at most
//! one (mixed) audio track.

use super::track::{OwnedTrack, SharedTrack, TrackKind};

/// Tracks returned by one capture request
#[derive(Debug, Default)]
pub struct MediaStream {
    tracks: Vec<OwnedTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<OwnedTrack>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[OwnedTrack] {
        &self.tracks
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &OwnedTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &OwnedTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    pub fn first_video(&self) -> Option<SharedTrack> {
        self.video_tracks().next().map(OwnedTrack::share)
    }

    pub fn first_audio(&self) -> Option<SharedTrack> {
        self.audio_tracks().next().map(OwnedTrack::share)
    }

    pub fn has_audio(&self) -> bool {
        self.audio_tracks().next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn into_tracks(self) -> Vec<OwnedTrack> {
        self.tracks
    }

    /// Stop every track in the stream
    pub fn stop_all(self) {
        for track in self.tracks {
            track.stop();
        }
    }
}

/// What the encoder consumes
#[derive(Debug, Clone)]
pub struct CombinedStream {
    pub video: SharedTrack,
    pub audio: Option<SharedTrack>,
}

impl CombinedStream {
    pub fn track_count(&self) -> usize {
        1 + usize::from(self.audio.is_some())
    }
}
