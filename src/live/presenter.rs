//! Presenter side of a live session

use super::LiveContext;
use crate::media::SharedTrack;
use crate::recorder::{CaptureOptions, MicrophoneSource};
use crate::session::code::join_url;
use crate::session::schema::{Comment, Reaction, Session};
use crate::session::{
    Annotator, CreatedSession, Feedback, SessionRegistry, SessionResult, SessionSync,
    SubscriptionHandle,
};
use crate::store::ChangeKind;
use crate::voice::{VoiceHost, VoiceResult};
use std::sync::Arc;

/// The single writer of a live session
pub struct PresenterSession {
    created: CreatedSession,
    host_id: String,
    share_base_url: String,
    registry: SessionRegistry,
    sync: Arc<SessionSync>,
    feedback: Feedback,
    annotator: Annotator,
    voice: VoiceHost,
}

impl PresenterSession {
    /// Create the session document and prepare every presenter component
    pub async fn go_live(
        context: &LiveContext,
        design_ref: &str,
        host_id: &str,
        host_name: &str,
    ) -> SessionResult<Self> {
        let registry = SessionRegistry::new(Arc::clone(&context.store));
        let created = registry
            .create_session(design_ref, host_id, host_name)
            .await?;

        let sync = Arc::new(SessionSync::new(Arc::clone(&context.store)));
        let annotator = Annotator::new(
            Arc::clone(&sync),
            created.session_id.clone(),
            &context.config.sync,
        );
        let voice = VoiceHost::new(
            Arc::clone(&context.store),
            Arc::clone(&context.devices),
            Arc::clone(&context.connector),
            &created.session_id,
            host_id,
            context.config.voice.clone(),
        );

        tracing::info!(
            "{} is live with {} (code {})",
            host_name,
            design_ref,
            created.display_code()
        );

        Ok(Self {
            host_id: host_id.to_string(),
            share_base_url: context.config.share.base_url.clone(),
            feedback: Feedback::new(Arc::clone(&context.store), context.config.feedback.clone()),
            created,
            registry,
            sync,
            annotator,
            voice,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.created.session_id
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    /// Canonical unspaced share code
    pub fn code(&self) -> &str {
        &self.created.code
    }

    pub fn display_code(&self) -> String {
        self.created.display_code()
    }

    pub fn join_url(&self) -> String {
        join_url(&self.share_base_url, &self.created.code)
    }

    pub async fn session(&self) -> SessionResult<Session> {
        self.registry.get_session(self.session_id()).await
    }

    /// The presenter's own view of the document
    pub async fn subscribe<F>(&self, on_change: F) -> SessionResult<SubscriptionHandle>
    where
        F: Fn(Session) + Send + 'static,
    {
        self.sync.subscribe_session(self.session_id(), on_change).await
    }

    pub async fn set_active_slide(&self, index: u32) -> SessionResult<()> {
        self.sync.set_active_slide(self.session_id(), index).await
    }

    /// Pointer and stroke publishing
    pub fn annotator(&mut self) -> &mut Annotator {
        &mut self.annotator
    }

    // -------------------------------------------------------------------------
    // Feedback
    // -------------------------------------------------------------------------

    pub async fn subscribe_comments<F>(&self, on_comment: F) -> SessionResult<SubscriptionHandle>
    where
        F: Fn(Comment, ChangeKind) + Send + 'static,
    {
        self.feedback
            .subscribe_comments(self.session_id(), on_comment)
            .await
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

    pub async fn start_voice(&self, device_id: Option<String>) -> VoiceResult<SharedTrack> {
        self.voice.start_microphone(device_id).await
    }

    pub async fn stop_voice(&self) {
        self.voice.stop_microphone().await
    }

    pub fn voice(&self) -> &VoiceHost {
        &self.voice
    }

    /// Capture options for recording this session. While voice is live the
    /// recorder borrows its microphone instead of opening a second one.
    pub fn recording_options(&self, system_audio: bool) -> CaptureOptions {
        let microphone = match self.voice.microphone_track() {
            Some(track) => MicrophoneSource::Shared(track),
            None => MicrophoneSource::Device(None),
        };
        CaptureOptions {
            microphone,
            system_audio,
        }
    }

    /// End the broadcast. Voice teardown happens first and regardless of
    /// whether the session write succeeds.
    pub async fn end(&self) -> SessionResult<()> {
        self.voice.stop_microphone().await;

        let result = self.registry.end_session(self.session_id()).await;
        match &result {
            Ok(()) => tracing::info!("Session {} ended by presenter", self.session_id()),
            Err(e) => tracing::error!("Failed to end session {}: {}", self.session_id(), e),
        }
        result
    }
}
