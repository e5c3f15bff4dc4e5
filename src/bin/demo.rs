//! In-memory walk-through of a live session: go live, join by code, annotate,
//! comment, react, end.

use anyhow::{Context, Result};
use async_trait::async_trait;
use slidecast::media::{
    DeviceInfo, DisplayRequest, MediaDevices, MediaError, MediaResult, MediaStream,
    UserMediaRequest,
};
use slidecast::session::schema::{Author, Path, Point, ReactionType, Tool};
use slidecast::store::memory::MemoryStore;
use slidecast::voice::{PeerConnection, PeerConnector, PeerEvent, VoiceError, VoiceResult};
use slidecast::{AudienceSession, LiveContext, PresenterSession, SlidecastConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// No capture hardware in the demo
struct NoDevices;

#[async_trait]
impl MediaDevices for NoDevices {
    async fn enumerate_devices(&self) -> MediaResult<Vec<DeviceInfo>> {
        Ok(Vec::new())
    }

    async fn get_display_media(&self, _request: &DisplayRequest) -> MediaResult<MediaStream> {
        Err(MediaError::DeviceNotFound("no display in demo".to_string()))
    }

    async fn get_user_media(&self, _request: &UserMediaRequest) -> MediaResult<MediaStream> {
        Err(MediaError::DeviceNotFound("no microphone in demo".to_string()))
    }
}

/// No peer transport in the demo
struct NoTransport;

#[async_trait]
impl PeerConnector for NoTransport {
    async fn connect(
        &self,
        _peer_id: &str,
        _events: mpsc::UnboundedSender<PeerEvent>,
    ) -> VoiceResult<Arc<dyn PeerConnection>> {
        Err(VoiceError::Negotiation("no transport in demo".to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    slidecast::init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => SlidecastConfig::load(std::path::Path::new(&path))
            .with_context(|| format!("loading config from {}", path))?,
        None => SlidecastConfig::default(),
    };
    config.validate().context("invalid config")?;

    let context = LiveContext::new(
        Arc::new(MemoryStore::new()),
        Arc::new(NoDevices),
        Arc::new(NoTransport),
        config,
    );

    let mut presenter = PresenterSession::go_live(&context, "deck-quarterly", "host-1", "Ada")
        .await
        .context("going live")?;
    println!("Live! Share code: {}", presenter.display_code());
    println!("Join link: {}", presenter.join_url());

    let _reactions = presenter
        .subscribe_reactions(|reaction| println!("  {} reaction", reaction.kind.emoji()))
        .await?;
    let _comments = presenter
        .subscribe_comments(|comment, _| println!("  {} says: {}", comment.user_name, comment.text))
        .await?;

    // Viewers type the code however they like
    let typed = presenter.code().to_lowercase();
    let mut viewer = AudienceSession::join(&context, &typed, Author::new("viewer-1", "Grace"))
        .await
        .context("joining by code")?;
    println!("Grace joined session {}", viewer.session_id());

    presenter.set_active_slide(1).await?;
    let annotator = presenter.annotator();
    annotator
        .begin_stroke("slide-2", Path::new(Tool::Pen, "#ff3366", 4.0, 1.0), Point::new(10.0, 10.0))
        .await;
    annotator.extend_stroke(Point::new(30.0, 25.0)).await;
    annotator.extend_stroke(Point::new(55.0, 40.0)).await;
    annotator.end_stroke().await?;

    let comment_id = viewer.comment("Great slide!").await?;
    viewer.toggle_like(&comment_id).await?;
    viewer.react(ReactionType::Clap).await?;

    if let Err(e) = presenter.start_voice(None).await {
        println!("Voice unavailable: {}", e);
    }

    // Let the subscription tasks print
    tokio::time::sleep(Duration::from_millis(50)).await;

    let session = presenter.session().await?;
    println!(
        "Slide {} | {} viewer(s) | {} stroke(s) on slide-2",
        session.active_slide_index + 1,
        session.visible_viewer_count(),
        session.slide_drawings("slide-2").len()
    );

    viewer.leave().await?;
    presenter.end().await?;
    println!("Session ended");

    Ok(())
}
