//! Viewer side of a live session

use super::LiveContext;
use crate::media::SharedTrack;
use crate::session::schema::{Author, Comment, Reaction, ReactionType, Session};
use crate::session::{Feedback, SessionRegistry, SessionResult, SessionSync, SubscriptionHandle};
use crate::store::ChangeKind;
use crate::voice::{VoiceListener, VoiceResult};
use std::sync::Arc;

/// A read-only participant of a live session
pub struct AudienceSession {
    session: Session,
    author: Author,
    sync: Arc<SessionSync>,
    feedback: Feedback,
    voice: VoiceListener,
    joined: bool,
}

impl AudienceSession {
    /// Look the session up by share code (any spelling) and register presence
    pub async fn join(context: &LiveContext, code: &str, author: Author) -> SessionResult<Self> {
        let registry = SessionRegistry::new(Arc::clone(&context.store));
        let session = registry.find_session_by_code(code).await?;

        let sync = Arc::new(SessionSync::new(Arc::clone(&context.store)));
        sync.join_session(&session.id).await?;

        let voice = VoiceListener::new(
            Arc::clone(&context.store),
            Arc::clone(&context.connector),
            &session.id,
            &author.user_id,
            &session.host_id,
            context.config.voice.clone(),
        );

        tracing::info!("{} joined session {}", author.user_name, session.id);

        Ok(Self {
            feedback: Feedback::new(Arc::clone(&context.store), context.config.feedback.clone()),
            session,
            author,
            sync,
            voice,
            joined: true,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    /// Session as it was when joined
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub async fn subscribe<F>(&self, on_change: F) -> SessionResult<SubscriptionHandle>
    where
        F: Fn(Session) + Send + 'static,
    {
        self.sync.subscribe_session(self.session_id(), on_change).await
    }

    // -------------------------------------------------------------------------
    // Feedback
    // -------------------------------------------------------------------------

    pub async fn comment(&self, text: &str) -> SessionResult<String> {
        self.feedback
            .post_comment(self.session_id(), &self.author, text)
            .await
    }

    pub async fn toggle_like(&self, comment_id: &str) -> SessionResult<bool> {
        self.feedback
            .toggle_comment_like(self.session_id(), comment_id, &self.author.user_id)
            .await
    }

    pub async fn comments(&self) -> SessionResult<Vec<Comment>> {
        self.feedback.list_comments(self.session_id()).await
    }

    pub async fn subscribe_comments<F>(&self, on_comment: F) -> SessionResult<SubscriptionHandle>
    where
        F: Fn(Comment, ChangeKind) + Send + 'static,
    {
        self.feedback
            .subscribe_comments(self.session_id(), on_comment)
            .await
    }

    pub async fn react(&self, kind: ReactionType) -> SessionResult<String> {
        self.feedback.post_reaction(self.session_id(), kind).await
    }

    pub async fn subscribe_reactions<F>(&self, on_reaction: F) -> SessionResult<SubscriptionHandle>
    where
        F: Fn(Reaction) + Send + 'static,
    {
        self.feedback
            .subscribe_reactions(self.session_id(), on_reaction)
            .await
    }

    // -------------------------------------------------------------------------
    // Voice
    // -------------------------------------------------------------------------

    pub async fn listen(&self) -> VoiceResult<()> {
        self.voice.request_voice().await
    }

    pub fn stop_listening(&self) {
        self.voice.stop()
    }

    pub fn voice(&self) -> &VoiceListener {
        &self.voice
    }

    pub fn host_audio(&self) -> Option<SharedTrack> {
        self.voice.remote_track()
    }

    /// Drop presence. Voice is torn down even if the store write fails.
    pub async fn leave(&mut self) -> SessionResult<()> {
        self.voice.stop();
        if !self.joined {
            return Ok(());
        }
        self.sync.leave_session(self.session_id()).await?;
        self.joined = false;
        tracing::info!("{} left session {}", self.author.user_name, self.session.id);
        Ok(())
    }
}
