//! Audience feedback: comments and reactions
//!
//! Comments are a durable, ordered stream with a like set per comment.
//! Reactions are ephemeral: subscribers only see a live tail, each reaction at
//! most once, and nothing older than the expiry window.

use super::schema::{comments_collection, reactions_collection, Author, Comment, Reaction, ReactionType};
use super::{SessionError, SessionResult, SubscriptionHandle};
use crate::config::FeedbackConfig;
use crate::store::{to_fields, ChangeKind, DocumentStore, Query};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct Feedback {
    store: Arc<dyn DocumentStore>,
    config: FeedbackConfig,
}

impl Feedback {
    pub fn new(store: Arc<dyn DocumentStore>, config: FeedbackConfig) -> Self {
        Self { store, config }
    }

    // -------------------------------------------------------------------------
    // Comments
    // -------------------------------------------------------------------------

    /// Append a comment. Whitespace-only text is rejected.
    pub async fn post_comment(
        &self,
        session_id: &str,
        author: &Author,
        text: &str,
    ) -> SessionResult<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyComment);
        }

        let fields = to_fields(&json!({
            "sessionId": session_id,
            "userId": author.user_id,
            "userName": author.user_name,
            "userPhoto": author.user_photo,
            "text": text,
            "likes": [],
            "likeCount": 0,
        }))?;
        let id = self
            .store
            .append(&comments_collection(session_id), fields)
            .await?;

        tracing::debug!("Comment {} posted to session {}", id, session_id);
        Ok(id)
    }

    /// Like or unlike a comment for `user_id`. Returns whether it is now liked.
    ///
    /// The like set and `likeCount` go out in one write, the count taken from
    /// the set, so a failed write leaves both untouched.
    pub async fn toggle_comment_like(
        &self,
        session_id: &str,
        comment_id: &str,
        user_id: &str,
    ) -> SessionResult<bool> {
        let collection = comments_collection(session_id);
        let mut comment: Comment = self
            .store
            .get(&collection, comment_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(comment_id.to_string()))?
            .decode()?;

        let now_liked = if comment.likes.remove(user_id) {
            false
        } else {
            comment.likes.insert(user_id.to_string());
            true
        };

        let fields = to_fields(&json!({
            "likes": comment.likes,
            "likeCount": comment.likes.len(),
        }))?;
        self.store.update(&collection, comment_id, fields).await?;

        Ok(now_liked)
    }

    /// All comments, oldest first
    pub async fn list_comments(&self, session_id: &str) -> SessionResult<Vec<Comment>> {
        let docs = self
            .store
            .query(&comments_collection(session_id), &Query::new())
            .await?;
        docs.iter()
            .map(|doc| doc.decode().map_err(SessionError::from))
            .collect()
    }

    /// Live comment feed: history first, then new and updated comments in order
    pub async fn subscribe_comments<F>(
        &self,
        session_id: &str,
        on_comment: F,
    ) -> SessionResult<SubscriptionHandle>
    where
        F: Fn(Comment, ChangeKind) + Send + 'static,
    {
        let mut watch = self
            .store
            .watch(&comments_collection(session_id), Query::new())
            .await?;

        let task = tokio::spawn(async move {
            while let Some(change) = watch.next().await {
                match change.doc.decode::<Comment>() {
                    Ok(comment) => on_comment(comment, change.kind),
                    Err(e) => tracing::warn!("Skipping undecodable comment: {}", e),
                }
            }
        });
        Ok(SubscriptionHandle::new(task))
    }

    // -------------------------------------------------------------------------
    // Reactions
    // -------------------------------------------------------------------------

    pub async fn post_reaction(&self, session_id: &str, kind: ReactionType) -> SessionResult<String> {
        let fields = to_fields(&json!({ "sessionId": session_id, "type": kind }))?;
        Ok(self
            .store
            .append(&reactions_collection(session_id), fields)
            .await?)
    }

    /// Live tail of reactions from the moment of subscription.
    ///
    /// Each reaction is delivered at most once; anything older than the
    /// expiry window is dropped even if the store still returns it.
    pub async fn subscribe_reactions<F>(
        &self,
        session_id: &str,
        on_reaction: F,
    ) -> SessionResult<SubscriptionHandle>
    where
        F: Fn(Reaction) + Send + 'static,
    {
        let query = Query::new().created_after(Utc::now());
        let mut watch = self
            .store
            .watch(&reactions_collection(session_id), query)
            .await?;
        let mut feed = ReactionFeed::new(&self.config);

        let task = tokio::spawn(async move {
            while let Some(change) = watch.next().await {
                if change.kind != ChangeKind::Added {
                    continue;
                }
                let reaction = match change.doc.decode::<Reaction>() {
                    Ok(reaction) => reaction,
                    Err(e) => {
                        tracing::warn!("Skipping undecodable reaction: {}", e);
                        continue;
                    }
                };
                let now = Utc::now();
                if feed.accept(reaction.clone(), now) {
                    on_reaction(reaction);
                }
                feed.prune(now);
            }
        });
        Ok(SubscriptionHandle::new(task))
    }
}

/// Reaction view model: dedupes by id, drops expired, auto-removes shown ones
#[derive(Debug)]
pub struct ReactionFeed {
    expiry: chrono::Duration,
    display: chrono::Duration,
    /// Ids already accepted, with their creation time
    seen: HashMap<String, DateTime<Utc>>,
    visible: Vec<Reaction>,
}

impl ReactionFeed {
    pub fn new(config: &FeedbackConfig) -> Self {
        Self {
            expiry: config.reaction_expiry(),
            display: config.reaction_display(),
            seen: HashMap::new(),
            visible: Vec::new(),
        }
    }

    /// Accept a reaction for display. False if stale or already seen.
    pub fn accept(&mut self, reaction: Reaction, now: DateTime<Utc>) -> bool {
        if now - reaction.created_at > self.expiry {
            return false;
        }
        if self.seen.contains_key(&reaction.id) {
            return false;
        }
        self.seen.insert(reaction.id.clone(), reaction.created_at);
        self.visible.push(reaction);
        true
    }

    /// Drop reactions that have been on screen long enough.
    ///
    /// Seen ids are forgotten once they are past expiry, since `accept`
    /// rejects them on age anyway.
    pub fn prune(&mut self, now: DateTime<Utc>) -> Vec<Reaction> {
        let display = self.display;
        let (expired, kept): (Vec<_>, Vec<_>) = self
            .visible
            .drain(..)
            .partition(|r| now - r.created_at > display);
        self.visible = kept;

        let expiry = self.expiry;
        self.seen.retain(|_, created_at| now - *created_at <= expiry);
        expired
    }

    pub fn visible(&self) -> &[Reaction] {
        &self.visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn feedback(store: Arc<MemoryStore>) -> Feedback {
        Feedback::new(store, FeedbackConfig::default())
    }

    fn reaction(id: &str, created_at: DateTime<Utc>) -> Reaction {
        Reaction {
            id: id.to_string(),
            session_id: "s".to_string(),
            kind: ReactionType::Heart,
            created_at,
        }
    }

    #[tokio::test]
    async fn test_whitespace_comment_rejected() {
        let store = Arc::new(MemoryStore::new());
        let feedback = feedback(store.clone());
        let author = Author::new("u1", "Grace");

        feedback.post_comment("s1", &author, "first").await.unwrap();
        let result = feedback.post_comment("s1", &author, "   \n\t ").await;
        assert!(matches!(result, Err(SessionError::EmptyComment)));
        feedback.post_comment("s1", &author, "  nice!  ").await.unwrap();

        let comments = feedback.list_comments("s1").await.unwrap();
        let texts: Vec<_> = comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "nice!"]);
        assert!(comments[0].created_at < comments[1].created_at);
    }

    #[tokio::test]
    async fn test_like_toggle_roundtrip() {
        let store = Arc::new(MemoryStore::new());
        let feedback = feedback(store);
        let id = feedback
            .post_comment("s1", &Author::new("u1", "Grace"), "hello")
            .await
            .unwrap();

        assert!(feedback.toggle_comment_like("s1", &id, "u2").await.unwrap());
        let liked = &feedback.list_comments("s1").await.unwrap()[0];
        assert!(liked.is_liked_by("u2"));
        assert_eq!(liked.like_count, 1);

        assert!(!feedback.toggle_comment_like("s1", &id, "u2").await.unwrap());
        let unliked = &feedback.list_comments("s1").await.unwrap()[0];
        assert!(unliked.likes.is_empty());
        assert_eq!(unliked.like_count, 0);
    }

    #[tokio::test]
    async fn test_like_count_follows_like_set() {
        let store = Arc::new(MemoryStore::new());
        let feedback = feedback(store.clone());
        let id = feedback
            .post_comment("s1", &Author::new("u1", "Grace"), "hello")
            .await
            .unwrap();

        // A count that drifted from the set is corrected by the next toggle
        store
            .update(
                &comments_collection("s1"),
                &id,
                to_fields(&json!({ "likeCount": 7 })).unwrap(),
            )
            .await
            .unwrap();
        feedback.toggle_comment_like("s1", &id, "u2").await.unwrap();
        feedback.toggle_comment_like("s1", &id, "u3").await.unwrap();
        let comment = &feedback.list_comments("s1").await.unwrap()[0];
        assert_eq!(comment.like_count, 2);

        // Offline toggles change neither field
        store.set_offline(true);
        assert!(feedback.toggle_comment_like("s1", &id, "u2").await.is_err());
        store.set_offline(false);
        let comment = &feedback.list_comments("s1").await.unwrap()[0];
        assert_eq!(comment.like_count, 2);
        assert_eq!(comment.likes.len(), 2);
    }

    #[tokio::test]
    async fn test_like_missing_comment() {
        let feedback = feedback(Arc::new(MemoryStore::new()));
        let result = feedback.toggle_comment_like("s1", "nope", "u1").await;
        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reactions_are_live_tail_only() {
        let store = Arc::new(MemoryStore::new());
        let feedback = feedback(store);

        feedback.post_reaction("s1", ReactionType::Clap).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = feedback
            .subscribe_reactions("s1", move |r| {
                let _ = tx.send(r.kind);
            })
            .await
            .unwrap();

        feedback.post_reaction("s1", ReactionType::Heart).await.unwrap();
        assert_eq!(rx.recv().await, Some(ReactionType::Heart));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_feed_rejects_stale_and_duplicates() {
        let mut feed = ReactionFeed::new(&FeedbackConfig::default());
        let now = Utc::now();

        assert!(!feed.accept(reaction("old", now - chrono::Duration::seconds(11)), now));
        assert!(feed.accept(reaction("a", now), now));
        assert!(!feed.accept(reaction("a", now), now));
        assert_eq!(feed.visible().len(), 1);
    }

    #[test]
    fn test_feed_prunes_after_display_window() {
        let mut feed = ReactionFeed::new(&FeedbackConfig::default());
        let now = Utc::now();
        feed.accept(reaction("a", now), now);

        assert!(feed.prune(now + chrono::Duration::seconds(1)).is_empty());
        let removed = feed.prune(now + chrono::Duration::seconds(4));
        assert_eq!(removed.len(), 1);
        assert!(feed.visible().is_empty());

        // Still remembered until expiry, so a replay is not shown twice
        assert!(!feed.accept(reaction("a", now), now + chrono::Duration::seconds(5)));
    }
}
