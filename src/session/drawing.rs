//! Presenter-side annotation
//!
//! Pointer moves and in-progress strokes are advisory: throttled, overwrite
//! latest, failures dropped. A finished stroke is committed into the drawing
//! set with a durable write, and only then counts as done.

use super::schema::{Drawings, Path, Point};
use super::sync::SessionSync;
use super::throttle::Throttle;
use super::SessionResult;
use crate::config::SyncConfig;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;

struct ActiveStroke {
    slide_id: String,
    path: Path,
}

pub struct Annotator {
    sync: Arc<SessionSync>,
    session_id: String,
    drawings: Drawings,
    active: Option<ActiveStroke>,
    pointer_throttle: Throttle,
    /// Latest pointer position not yet written
    pointer_pending: Arc<Mutex<Option<Point>>>,
    pointer_flush: Option<JoinHandle<()>>,
    stroke_throttle: Throttle,
}

impl Annotator {
    pub fn new(sync: Arc<SessionSync>, session_id: impl Into<String>, config: &SyncConfig) -> Self {
        Self {
            sync,
            session_id: session_id.into(),
            drawings: Drawings::new(),
            active: None,
            pointer_throttle: Throttle::new(config.pointer_interval()),
            pointer_pending: Arc::new(Mutex::new(None)),
            pointer_flush: None,
            stroke_throttle: Throttle::new(config.stroke_interval()),
        }
    }

    /// Seed local state from an existing session (e.g. after a reload)
    pub fn with_drawings(mut self, drawings: Drawings) -> Self {
        self.drawings = drawings;
        self
    }

    pub fn drawings(&self) -> &Drawings {
        &self.drawings
    }

    pub fn is_drawing(&self) -> bool {
        self.active.is_some()
    }

    /// Move the laser pointer. `None` hides it and is never throttled.
    ///
    /// Returns whether a write was issued immediately. A move that lands
    /// inside the throttle window is written when the window closes, unless
    /// a newer move replaces it first.
    pub async fn move_pointer(&mut self, position: Option<Point>) -> bool {
        let Some(point) = position else {
            self.cancel_pointer_flush();
            self.pointer_throttle.reset();
            self.sync.set_pointer_position(&self.session_id, None).await;
            return true;
        };

        *self.pointer_pending.lock() = Some(point);
        if self.pointer_flush.as_ref().is_some_and(|t| !t.is_finished()) {
            return false;
        }

        if self.pointer_throttle.ready() {
            let latest = self.pointer_pending.lock().take();
            self.sync.set_pointer_position(&self.session_id, latest).await;
            return true;
        }

        let wait = self.pointer_throttle.reserve();
        let sync = Arc::clone(&self.sync);
        let session_id = self.session_id.clone();
        let pending = Arc::clone(&self.pointer_pending);
        self.pointer_flush = Some(tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let latest = pending.lock().take();
            if latest.is_some() {
                sync.set_pointer_position(&session_id, latest).await;
            }
        }));
        false
    }

    fn cancel_pointer_flush(&mut self) {
        if let Some(task) = self.pointer_flush.take() {
            task.abort();
        }
        *self.pointer_pending.lock() = None;
    }

    /// Start a stroke on a slide. Any unfinished stroke is discarded.
    pub async fn begin_stroke(&mut self, slide_id: impl Into<String>, mut path: Path, start: Point) {
        if self.active.is_some() {
            tracing::debug!("Discarding unfinished stroke");
        }
        path.points.clear();
        path.push(start);

        self.stroke_throttle.reset();
        self.stroke_throttle.ready();
        self.active = Some(ActiveStroke {
            slide_id: slide_id.into(),
            path,
        });
        self.publish_preview().await;
    }

    /// Add a point to the stroke in progress
    pub async fn extend_stroke(&mut self, point: Point) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        active.path.push(point);
        if self.stroke_throttle.ready() {
            self.publish_preview().await;
            return true;
        }
        false
    }

    /// Commit the stroke in progress into the slide's drawings.
    ///
    /// On a failed write the stroke stays in the local drawing set and the
    /// error is returned; nothing is rolled back.
    pub async fn end_stroke(&mut self) -> SessionResult<Option<Path>> {
        let Some(ActiveStroke { slide_id, path }) = self.active.take() else {
            return Ok(None);
        };

        self.drawings
            .entry(slide_id.clone())
            .or_default()
            .push(path.clone());
        self.commit().await?;

        tracing::debug!(
            "Committed {:?} stroke with {} points on slide {}",
            path.tool,
            path.points.len(),
            slide_id
        );
        Ok(Some(path))
    }

    /// Remove the most recent stroke on a slide
    pub async fn undo_last(&mut self, slide_id: &str) -> SessionResult<Option<Path>> {
        let removed = self.drawings.get_mut(slide_id).and_then(Vec::pop);
        if removed.is_some() {
            self.commit().await?;
        }
        Ok(removed)
    }

    /// Remove every stroke on a slide
    pub async fn clear_slide(&mut self, slide_id: &str) -> SessionResult<()> {
        if self.drawings.remove(slide_id).is_some() {
            self.commit().await?;
        }
        Ok(())
    }

    async fn publish_preview(&self) {
        if let Some(active) = &self.active {
            self.sync
                .set_current_path(&self.session_id, Some(&active.path))
                .await;
        }
    }

    async fn commit(&self) -> SessionResult<()> {
        self.sync.set_drawings(&self.session_id, &self.drawings).await
    }
}
