//! Media track ownership
//!
//! A capture track has exactly one owner, the component that acquired it.
//! Only the owner can stop it: [`OwnedTrack`] stops the underlying track when
//! it is stopped or dropped, while [`SharedTrack`] is a plain reference that
//! any number of other consumers may hold without being able to stop it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// A platform media track (screen, microphone, mixed output, ...)
pub trait MediaTrack: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;
    fn kind(&self) -> TrackKind;
    fn label(&self) -> &str;
    fn is_live(&self) -> bool;
    /// Stop capture. Idempotent.
    fn stop(&self);
}

/// The owning handle of a track
#[derive(Debug)]
pub struct OwnedTrack {
    inner: Arc<dyn MediaTrack>,
}

impl OwnedTrack {
    pub fn new(track: Arc<dyn MediaTrack>) -> Self {
        Self { inner: track }
    }

    pub fn id(&self) -> &str {
        self.inner.id()
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind()
    }

    pub fn label(&self) -> &str {
        self.inner.label()
    }

    pub fn is_live(&self) -> bool {
        self.inner.is_live()
    }

    /// Hand out a non-owning reference
    pub fn share(&self) -> SharedTrack {
        SharedTrack {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Stop the track and release ownership
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for OwnedTrack {
    fn drop(&mut self) {
        if self.inner.is_live() {
            tracing::debug!("Stopping {:?} track {}", self.inner.kind(), self.inner.id());
            self.inner.stop();
        }
    }
}

/// A non-owning reference to a track. Cannot stop it.
#[derive(Debug, Clone)]
pub struct SharedTrack {
    inner: Arc<dyn MediaTrack>,
}

impl SharedTrack {
    pub fn id(&self) -> &str {
        self.inner.id()
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind()
    }

    pub fn label(&self) -> &str {
        self.inner.label()
    }

    pub fn is_live(&self) -> bool {
        self.inner.is_live()
    }

    /// Whether both handles refer to the same underlying track
    pub fn same_track(&self, other: &SharedTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Underlying track, for handing to a platform API (peer connection,
    /// audio graph, encoder). Platform code must not stop it.
    pub fn handle(&self) -> Arc<dyn MediaTrack> {
        Arc::clone(&self.inner)
    }
}

impl PartialEq for SharedTrack {
    fn eq(&self, other: &Self) -> bool {
        self.same_track(other)
    }
}
