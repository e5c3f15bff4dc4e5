//! Session registry
//!
//! Creates session records keyed by a share code, resolves codes back to
//! sessions and marks sessions inactive when they end. Ending never deletes
//! anything, so comments stay queryable afterwards.

use super::code::{format_code, generate_code, normalize_code};
use super::schema::{Session, SESSIONS};
use super::{SessionError, SessionResult};
use crate::store::{DocumentStore, Query};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

const CODE_ATTEMPTS: usize = 3;

/// Result of going live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSession {
    pub session_id: String,
    /// Canonical unspaced code
    pub code: String,
}

impl CreatedSession {
    /// Code as shown to the presenter (`AB3D EF9K`)
    pub fn display_code(&self) -> String {
        format_code(&self.code)
    }
}

#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn DocumentStore>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Create a new active session for a deck
    pub async fn create_session(
        &self,
        design_ref: &str,
        host_id: &str,
        host_name: &str,
    ) -> SessionResult<CreatedSession> {
        let mut code = generate_code();
        for _ in 1..CODE_ATTEMPTS {
            if self.active_with_code(&code).await?.is_empty() {
                break;
            }
            tracing::debug!("Share code {} already active, regenerating", code);
            code = generate_code();
        }

        let fields = crate::store::to_fields(&json!({
            "code": code,
            "hostId": host_id,
            "hostName": host_name,
            "designRef": design_ref,
            "isActive": true,
            "activeSlideIndex": 0,
            "viewerCount": 0,
            "drawings": {},
            "currentPath": Value::Null,
            "pointerPosition": Value::Null,
        }))?;
        let session_id = self.store.create(SESSIONS, fields).await?;

        tracing::info!(
            "Session {} created for deck {} (code {})",
            session_id,
            design_ref,
            format_code(&code)
        );
        Ok(CreatedSession { session_id, code })
    }

    /// Resolve a user-entered code to an active session
    pub async fn find_session_by_code(&self, input: &str) -> SessionResult<Session> {
        let code =
            normalize_code(input).ok_or_else(|| SessionError::NotFound(input.trim().to_string()))?;

        let doc = self
            .active_with_code(&code)
            .await?
            .pop()
            .ok_or_else(|| SessionError::NotFound(format_code(&code)))?;
        Ok(doc.decode()?)
    }

    pub async fn get_session(&self, session_id: &str) -> SessionResult<Session> {
        let doc = self
            .store
            .get(SESSIONS, session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        Ok(doc.decode()?)
    }

    /// Mark a session inactive. Idempotent.
    pub async fn end_session(&self, session_id: &str) -> SessionResult<()> {
        let fields = crate::store::to_fields(&json!({
            "isActive": false,
            "endedAt": Utc::now(),
            "currentPath": Value::Null,
            "pointerPosition": Value::Null,
        }))?;
        self.store.update(SESSIONS, session_id, fields).await?;

        tracing::info!("Session {} ended", session_id);
        Ok(())
    }

    async fn active_with_code(&self, code: &str) -> SessionResult<Vec<crate::store::Document>> {
        let query = Query::new()
            .where_eq("code", code)
            .where_eq("isActive", true);
        Ok(self.store.query(SESSIONS, &query).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_create_and_find_by_any_spelling() {
        let registry = registry();
        let created = registry
            .create_session("deck-1", "host-1", "Ada")
            .await
            .unwrap();

        let display = created.display_code();
        assert_eq!(display.len(), 9);
        assert_eq!(display.chars().nth(4), Some(' '));

        for spelling in [
            display.clone(),
            created.code.to_lowercase(),
            display.to_lowercase(),
        ] {
            let session = registry.find_session_by_code(&spelling).await.unwrap();
            assert_eq!(session.id, created.session_id);
            assert_eq!(session.host_name, "Ada");
            assert!(session.is_active);
        }
    }

    #[tokio::test]
    async fn test_ended_session_not_found() {
        let registry = registry();
        let created = registry
            .create_session("deck-1", "host-1", "Ada")
            .await
            .unwrap();
        registry.end_session(&created.session_id).await.unwrap();

        let result = registry.find_session_by_code(&created.code).await;
        assert!(matches!(result, Err(SessionError::NotFound(_))));

        let session = registry.get_session(&created.session_id).await.unwrap();
        assert!(!session.is_active);
        assert!(session.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_malformed_code_not_found() {
        let registry = registry();
        let result = registry.find_session_by_code("nope").await;
        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }
}
