//! Session synchronizer
//!
//! The session document has one writer for presenter intent (slide index,
//! drawings, pointer) and many readers. Viewer presence is the only
//! multi-writer field and goes through atomic increments.

use super::schema::{Drawings, Path, Point, Session, SESSIONS};
use super::{SessionResult, SubscriptionHandle};
use crate::store::{to_fields, DocumentStore, Fields};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub struct SessionSync {
    store: Arc<dyn DocumentStore>,
    /// Joins made by this client per session, so a leave never outnumbers them
    joined: Mutex<HashMap<String, u32>>,
}

impl SessionSync {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            joined: Mutex::new(HashMap::new()),
        }
    }

    /// Push every committed mutation of the session to `on_change`.
    ///
    /// The current state is delivered first. Dropping the handle unsubscribes.
    pub async fn subscribe_session<F>(
        &self,
        session_id: &str,
        on_change: F,
    ) -> SessionResult<SubscriptionHandle>
    where
        F: Fn(Session) + Send + 'static,
    {
        let mut watch = self.store.subscribe(SESSIONS, session_id).await?;
        let id = session_id.to_string();

        let task = tokio::spawn(async move {
            while let Some(doc) = watch.next().await {
                match doc.decode::<Session>() {
                    Ok(session) => on_change(session),
                    Err(e) => tracing::warn!("Skipping undecodable session {} update: {}", id, e),
                }
            }
            tracing::debug!("Session {} subscription closed", id);
        });

        Ok(SubscriptionHandle::new(task))
    }

    pub async fn set_active_slide(&self, session_id: &str, index: u32) -> SessionResult<()> {
        self.write(session_id, json!({ "activeSlideIndex": index }))
            .await?;
        tracing::debug!("Session {} now on slide {}", session_id, index);
        Ok(())
    }

    /// Commit the full drawing set; also clears the in-progress stroke
    pub async fn set_drawings(&self, session_id: &str, drawings: &Drawings) -> SessionResult<()> {
        self.write(
            session_id,
            json!({ "drawings": drawings, "currentPath": Value::Null }),
        )
        .await
    }

    /// Live preview of the stroke being drawn. Best effort: failures are logged and dropped.
    pub async fn set_current_path(&self, session_id: &str, path: Option<&Path>) {
        if let Err(e) = self.write(session_id, json!({ "currentPath": path })).await {
            tracing::debug!("Dropped in-progress stroke update for {}: {}", session_id, e);
        }
    }

    /// Laser pointer position, `None` hides it. Best effort.
    pub async fn set_pointer_position(&self, session_id: &str, position: Option<Point>) {
        let position = position.map(Point::clamped);
        if let Err(e) = self
            .write(session_id, json!({ "pointerPosition": position }))
            .await
        {
            tracing::debug!("Dropped pointer update for {}: {}", session_id, e);
        }
    }

    /// Count this client as a viewer
    pub async fn join_session(&self, session_id: &str) -> SessionResult<()> {
        self.store
            .increment_field(SESSIONS, session_id, "viewerCount", 1)
            .await?;
        *self.joined.lock().entry(session_id.to_string()).or_insert(0) += 1;

        tracing::info!("Joined session {}", session_id);
        Ok(())
    }

    /// Undo one earlier join. Without a matching join this is a no-op.
    pub async fn leave_session(&self, session_id: &str) -> SessionResult<()> {
        if !self.reserve_leave(session_id) {
            tracing::warn!("Leave for session {} without a matching join", session_id);
            return Ok(());
        }

        if let Err(e) = self
            .store
            .increment_field(SESSIONS, session_id, "viewerCount", -1)
            .await
        {
            *self.joined.lock().entry(session_id.to_string()).or_insert(0) += 1;
            return Err(e.into());
        }

        tracing::info!("Left session {}", session_id);
        Ok(())
    }

    /// Number of outstanding joins this client holds for a session
    pub fn joins_held(&self, session_id: &str) -> u32 {
        self.joined.lock().get(session_id).copied().unwrap_or(0)
    }

    fn reserve_leave(&self, session_id: &str) -> bool {
        let mut joined = self.joined.lock();
        match joined.get_mut(session_id) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    joined.remove(session_id);
                }
                true
            }
            _ => false,
        }
    }

    async fn write(&self, session_id: &str, value: Value) -> SessionResult<()> {
        let fields: Fields = to_fields(&value)?;
        self.store.update(SESSIONS, session_id, fields).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::registry::SessionRegistry;
    use crate::session::schema::Tool;
    use crate::store::MemoryStore;
    use tokio::sync::mpsc;

    async fn setup() -> (Arc<MemoryStore>, SessionSync, SessionRegistry, String) {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new(store.clone());
        let created = registry.create_session("deck", "host", "Ada").await.unwrap();
        let sync = SessionSync::new(store.clone());
        (store, sync, registry, created.session_id)
    }

    #[tokio::test]
    async fn test_subscribers_see_slide_changes() {
        let (_store, sync, _registry, id) = setup().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = sync
            .subscribe_session(&id, move |s| {
                let _ = tx.send(s.active_slide_index);
            })
            .await
            .unwrap();

        sync.set_active_slide(&id, 2).await.unwrap();
        sync.set_active_slide(&id, 5).await.unwrap();

        assert_eq!(rx.recv().await, Some(0));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(5));
    }

    #[tokio::test]
    async fn test_set_drawings_clears_current_path() {
        let (_store, sync, registry, id) = setup().await;
        let mut path = Path::new(Tool::Pen, "#000", 2.0, 1.0);
        path.push(Point::new(1.0, 1.0));

        sync.set_current_path(&id, Some(&path)).await;
        assert!(registry.get_session(&id).await.unwrap().current_path.is_some());

        let mut drawings = Drawings::new();
        drawings.insert("slide-1".to_string(), vec![path.clone()]);
        sync.set_drawings(&id, &drawings).await.unwrap();

        let session = registry.get_session(&id).await.unwrap();
        assert!(session.current_path.is_none());
        assert_eq!(session.slide_drawings("slide-1"), &[path]);
    }

    #[tokio::test]
    async fn test_best_effort_writes_swallow_errors() {
        let (store, sync, registry, id) = setup().await;
        store.set_offline(true);
        sync.set_pointer_position(&id, Some(Point::new(10.0, 10.0)))
            .await;
        sync.set_current_path(&id, None).await;
        assert!(sync.set_active_slide(&id, 1).await.is_err());
        store.set_offline(false);

        let session = registry.get_session(&id).await.unwrap();
        assert!(session.pointer_position.is_none());
        assert_eq!(session.active_slide_index, 0);
    }

    #[tokio::test]
    async fn test_unmatched_leave_is_noop() {
        let (_store, sync, registry, id) = setup().await;
        sync.leave_session(&id).await.unwrap();
        assert_eq!(registry.get_session(&id).await.unwrap().viewer_count, 0);

        sync.join_session(&id).await.unwrap();
        assert_eq!(sync.joins_held(&id), 1);
        sync.leave_session(&id).await.unwrap();
        sync.leave_session(&id).await.unwrap();
        assert_eq!(registry.get_session(&id).await.unwrap().viewer_count, 0);
    }
}
