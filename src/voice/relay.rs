//! Host and listener sides of the voice relay
//!
//! Each participant watches the signal log from `now - window` and acts only
//! on signals addressed to it. Answers, candidates and lifecycle broadcasts
//! written before the participant started listening are stale and skipped;
//! the host still honors recent voice requests so viewers that asked before
//! the microphone went live get an offer.

use super::peer::{PeerConnection, PeerConnector, PeerEvent, PeerEventKind, PeerState, PeerTable};
use super::signal::{send_signal, IceCandidate, SessionDescription, Signal, SignalMessage, SignalType};
use super::{VoiceError, VoiceResult};
use crate::config::VoiceConfig;
use crate::media::{MediaDevices, OwnedTrack, SharedTrack, TrackKind, UserMediaRequest};
use crate::session::schema::signals_collection;
use crate::store::{ChangeKind, DocumentStore, Query};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// =============================================================================
// Host
// =============================================================================

/// Broadcasts the host microphone to every viewer that asks for it
pub struct VoiceHost {
    inner: Arc<HostInner>,
}

struct HostInner {
    store: Arc<dyn DocumentStore>,
    devices: Arc<dyn MediaDevices>,
    connector: Arc<dyn PeerConnector>,
    session_id: String,
    host_id: String,
    config: VoiceConfig,
    microphone: Mutex<Option<OwnedTrack>>,
    peers: Mutex<PeerTable>,
    events: Mutex<Option<mpsc::UnboundedSender<PeerEvent>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Held across start and stop; one microphone at a time
    lifecycle: tokio::sync::Mutex<()>,
}

impl VoiceHost {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        devices: Arc<dyn MediaDevices>,
        connector: Arc<dyn PeerConnector>,
        session_id: &str,
        host_id: &str,
        config: VoiceConfig,
    ) -> Self {
        Self {
            inner: Arc::new(HostInner {
                store,
                devices,
                connector,
                session_id: session_id.to_string(),
                host_id: host_id.to_string(),
                config,
                microphone: Mutex::new(None),
                peers: Mutex::new(PeerTable::default()),
                events: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Acquire the microphone and start answering voice requests.
    ///
    /// The host owns the track; the returned handle can be shared (e.g. with
    /// the recorder) but not stopped. Calling this while live returns the
    /// current track. If the returned future is dropped before it completes,
    /// everything acquired so far is released.
    pub async fn start_microphone(&self, device_id: Option<String>) -> VoiceResult<SharedTrack> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if let Some(track) = self.microphone_track() {
            return Ok(track);
        }

        let inner = &self.inner;
        let stream = inner
            .devices
            .get_user_media(&UserMediaRequest::microphone(device_id))
            .await?;
        let mut tracks = stream.into_tracks();
        let index = tracks
            .iter()
            .position(|t| t.kind() == TrackKind::Audio)
            .ok_or(VoiceError::NoMicrophone)?;
        let track = tracks.swap_remove(index);
        // Anything else the platform handed back is not ours to keep
        drop(tracks);

        let shared = track.share();
        *inner.microphone.lock() = Some(track);
        let mut pending = PendingStart::new(inner);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        *inner.events.lock() = Some(events_tx);
        let started_at = Utc::now();

        let handler = Arc::clone(inner);
        let listener = spawn_signal_listener(
            &inner.store,
            &inner.session_id,
            &inner.host_id,
            inner.config.signal_window(),
            move |signal| {
                let inner = Arc::clone(&handler);
                async move { inner.handle_signal(signal, started_at).await }
            },
        )
        .await?;

        let handler = Arc::clone(inner);
        let pump = spawn_event_pump(events_rx, move |event| {
            let inner = Arc::clone(&handler);
            async move { inner.handle_event(event).await }
        });
        inner.tasks.lock().extend([listener, pump]);
        if inner.microphone.lock().is_none() {
            // shutdown() ran while the listener was being set up
            return Err(VoiceError::Negotiation("voice stopped while starting".to_string()));
        }
        pending.complete();

        tracing::info!(
            "Voice live for session {} on track {}",
            inner.session_id,
            shared.id()
        );

        if let Err(e) = send_signal(
            inner.store.as_ref(),
            &inner.session_id,
            &SignalMessage::voice_ready(&inner.host_id),
        )
        .await
        {
            tracing::warn!("Failed to announce voice for {}: {}", inner.session_id, e);
        }

        Ok(shared)
    }

    /// Stop broadcasting: release the microphone, tell viewers, drop every peer
    pub async fn stop_microphone(&self) {
        let stopped = {
            let _lifecycle = self.inner.lifecycle.lock().await;
            self.inner.teardown()
        };
        if !stopped {
            return;
        }

        if let Err(e) = send_signal(
            self.inner.store.as_ref(),
            &self.inner.session_id,
            &SignalMessage::voice_stopped(&self.inner.host_id),
        )
        .await
        {
            tracing::debug!("Voice-stopped signal not delivered: {}", e);
        }
    }

    /// Local teardown only; never touches the store
    pub fn shutdown(&self) {
        self.inner.teardown();
    }

    pub fn microphone_track(&self) -> Option<SharedTrack> {
        self.inner.live_microphone()
    }

    pub fn is_live(&self) -> bool {
        self.microphone_track().is_some()
    }

    pub fn peer_count(&self) -> usize {
        self.inner.peers.lock().open_count()
    }

    pub fn peer_state(&self, viewer_id: &str) -> Option<PeerState> {
        self.inner.peers.lock().state(viewer_id)
    }
}

impl Drop for VoiceHost {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

/// Releases a half-started microphone unless the start ran to completion
struct PendingStart<'a> {
    inner: &'a HostInner,
    done: bool,
}

impl<'a> PendingStart<'a> {
    fn new(inner: &'a HostInner) -> Self {
        Self { inner, done: false }
    }

    fn complete(&mut self) {
        self.done = true;
    }
}

impl Drop for PendingStart<'_> {
    fn drop(&mut self) {
        if !self.done {
            tracing::debug!("Voice start for {} did not finish", self.inner.session_id);
            self.inner.teardown();
        }
    }
}

impl HostInner {
    /// Stop the microphone, close all peers, stop listening. Returns whether
    /// a microphone was held.
    fn teardown(&self) -> bool {
        let microphone = self.microphone.lock().take();
        let had_microphone = microphone.is_some();
        if let Some(track) = microphone {
            track.stop();
        }

        let closed = self.peers.lock().close_all();
        *self.events.lock() = None;
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        if had_microphone || closed > 0 {
            tracing::info!(
                "Voice stopped for session {} ({} peers closed)",
                self.session_id,
                closed
            );
        }
        had_microphone
    }

    fn live_microphone(&self) -> Option<SharedTrack> {
        self.microphone
            .lock()
            .as_ref()
            .filter(|track| track.is_live())
            .map(OwnedTrack::share)
    }

    async fn handle_signal(&self, signal: Signal, started_at: DateTime<Utc>) {
        let viewer_id = signal.message.from_id.as_str();
        match signal.message.kind {
            SignalType::ViewerRequestVoice => self.on_request(viewer_id).await,
            SignalType::ViewerVoiceAnswer if signal.created_at >= started_at => {
                self.on_answer(viewer_id, signal.message.answer.as_ref())
                    .await
            }
            SignalType::ViewerIceCandidate if signal.created_at >= started_at => {
                self.on_candidate(viewer_id, signal.message.candidate.as_ref())
                    .await
            }
            kind => tracing::trace!("Host ignoring {:?} from {}", kind, viewer_id),
        }
    }

    async fn on_request(&self, viewer_id: &str) {
        let microphone = match self.live_microphone() {
            Some(track) => track,
            None => {
                tracing::debug!("Voice request from {} while microphone is off", viewer_id);
                return;
            }
        };
        if self.peers.lock().is_open(viewer_id) {
            tracing::debug!("Duplicate voice request from {}", viewer_id);
            return;
        }

        let events = self.events.lock().clone();
        let events = match events {
            Some(events) => events,
            None => return,
        };
        let connection = match self.connector.connect(viewer_id, events).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!("Could not create peer for {}: {}", viewer_id, e);
                return;
            }
        };

        let inserted = self.peers.lock().insert(viewer_id, Arc::clone(&connection));
        if let Err(rejected) = inserted {
            // Lost a race with another request from the same viewer
            rejected.close();
            return;
        }

        if let Err(e) = self.offer(viewer_id, &microphone, connection).await {
            tracing::warn!("Voice offer to {} failed: {}", viewer_id, e);
            self.peers.lock().close(viewer_id);
        }
    }

    async fn offer(
        &self,
        viewer_id: &str,
        microphone: &SharedTrack,
        connection: Arc<dyn PeerConnection>,
    ) -> VoiceResult<()> {
        connection.add_track(microphone).await?;
        let offer = connection.create_offer().await?;

        if !self.peers.lock().advance(viewer_id, PeerState::Offered) {
            return Err(VoiceError::Negotiation(format!(
                "peer {} closed before offer was sent",
                viewer_id
            )));
        }

        send_signal(
            self.store.as_ref(),
            &self.session_id,
            &SignalMessage::offer(&self.host_id, viewer_id, offer),
        )
        .await?;
        tracing::debug!("Sent voice offer to {}", viewer_id);
        Ok(())
    }

    async fn on_answer(&self, viewer_id: &str, answer: Option<&SessionDescription>) {
        let answer = match answer {
            Some(answer) => answer,
            None => {
                tracing::warn!("Answer from {} has no description", viewer_id);
                return;
            }
        };

        let connection = {
            let mut peers = self.peers.lock();
            if !peers.advance(viewer_id, PeerState::Answered) {
                tracing::debug!(
                    "Ignoring answer from {} in state {:?}",
                    viewer_id,
                    peers.state(viewer_id)
                );
                return;
            }
            peers.connection(viewer_id)
        };

        if let Some(connection) = connection {
            if let Err(e) = connection.set_remote_description(answer).await {
                tracing::warn!("Could not apply answer from {}: {}", viewer_id, e);
                self.peers.lock().close(viewer_id);
            }
        }
    }

    async fn on_candidate(&self, viewer_id: &str, candidate: Option<&IceCandidate>) {
        let connection = self.peers.lock().connection(viewer_id);
        match (connection, candidate) {
            (Some(connection), Some(candidate)) => {
                if let Err(e) = connection.add_ice_candidate(candidate).await {
                    tracing::debug!("Dropped candidate from {}: {}", viewer_id, e);
                }
            }
            _ => tracing::trace!("Ignoring candidate from unknown peer {}", viewer_id),
        }
    }

    async fn handle_event(&self, event: PeerEvent) {
        let viewer_id = event.peer_id.as_str();
        match event.kind {
            PeerEventKind::IceCandidate(candidate) => {
                if !self.peers.lock().is_open(viewer_id) {
                    return;
                }
                let message = SignalMessage::host_candidate(&self.host_id, viewer_id, candidate);
                if let Err(e) = send_signal(self.store.as_ref(), &self.session_id, &message).await {
                    tracing::debug!("Candidate for {} not delivered: {}", viewer_id, e);
                }
            }
            PeerEventKind::Connected => {
                if self.peers.lock().advance(viewer_id, PeerState::Connected) {
                    tracing::info!("Voice connected to {}", viewer_id);
                }
            }
            PeerEventKind::Disconnected => {
                self.peers.lock().close(viewer_id);
                tracing::info!("Voice peer {} disconnected", viewer_id);
            }
            PeerEventKind::RemoteTrack(_) => {}
        }
    }
}

// =============================================================================
// Listener
// =============================================================================

/// Receives the host's voice on the viewer side
pub struct VoiceListener {
    inner: Arc<ListenerInner>,
}

struct ListenerInner {
    store: Arc<dyn DocumentStore>,
    connector: Arc<dyn PeerConnector>,
    session_id: String,
    viewer_id: String,
    host_id: String,
    config: VoiceConfig,
    wants_audio: AtomicBool,
    peers: Mutex<PeerTable>,
    remote_track: Mutex<Option<SharedTrack>>,
    events: Mutex<Option<mpsc::UnboundedSender<PeerEvent>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl VoiceListener {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        connector: Arc<dyn PeerConnector>,
        session_id: &str,
        viewer_id: &str,
        host_id: &str,
        config: VoiceConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ListenerInner {
                store,
                connector,
                session_id: session_id.to_string(),
                viewer_id: viewer_id.to_string(),
                host_id: host_id.to_string(),
                config,
                wants_audio: AtomicBool::new(false),
                peers: Mutex::new(PeerTable::default()),
                remote_track: Mutex::new(None),
                events: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Ask the host for audio. If the host is not live yet, the request is
    /// repeated when it announces itself.
    pub async fn request_voice(&self) -> VoiceResult<()> {
        let inner = &self.inner;
        inner.wants_audio.store(true, Ordering::SeqCst);

        if inner.tasks.lock().is_empty() {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            *inner.events.lock() = Some(events_tx);
            let started_at = Utc::now();

            let handler = Arc::clone(inner);
            let listener = spawn_signal_listener(
                &inner.store,
                &inner.session_id,
                &inner.viewer_id,
                inner.config.signal_window(),
                move |signal| {
                    let inner = Arc::clone(&handler);
                    async move {
                        if signal.created_at >= started_at {
                            inner.handle_signal(signal).await;
                        }
                    }
                },
            )
            .await?;

            let handler = Arc::clone(inner);
            let pump = spawn_event_pump(events_rx, move |event| {
                let inner = Arc::clone(&handler);
                async move { inner.handle_event(event).await }
            });
            inner.tasks.lock().extend([listener, pump]);
        }

        inner.send_request().await
    }

    /// Stop listening and close the connection to the host
    pub fn stop(&self) {
        self.inner.teardown();
    }

    /// Remote audio for playback, once connected
    pub fn remote_track(&self) -> Option<SharedTrack> {
        self.inner.remote_track.lock().clone()
    }

    pub fn state(&self) -> Option<PeerState> {
        self.inner.peers.lock().state(&self.inner.host_id)
    }

    pub fn is_receiving(&self) -> bool {
        self.state() == Some(PeerState::Connected)
    }
}

impl Drop for VoiceListener {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

impl ListenerInner {
    fn teardown(&self) {
        self.wants_audio.store(false, Ordering::SeqCst);
        self.close_peer();
        *self.events.lock() = None;
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    fn close_peer(&self) {
        self.peers.lock().close(&self.host_id);
        *self.remote_track.lock() = None;
    }

    async fn send_request(&self) -> VoiceResult<()> {
        send_signal(
            self.store.as_ref(),
            &self.session_id,
            &SignalMessage::request_voice(&self.viewer_id, &self.host_id),
        )
        .await?;
        tracing::debug!("{} requested voice from {}", self.viewer_id, self.host_id);
        Ok(())
    }

    async fn handle_signal(&self, signal: Signal) {
        if signal.message.from_id != self.host_id {
            return;
        }
        match signal.message.kind {
            SignalType::HostVoiceOffer => match signal.message.offer.as_ref() {
                Some(offer) => self.on_offer(offer).await,
                None => tracing::warn!("Offer from {} has no description", self.host_id),
            },
            SignalType::HostIceCandidate => {
                let connection = self.peers.lock().connection(&self.host_id);
                if let (Some(connection), Some(candidate)) =
                    (connection, signal.message.candidate.as_ref())
                {
                    if let Err(e) = connection.add_ice_candidate(candidate).await {
                        tracing::debug!("Dropped host candidate: {}", e);
                    }
                }
            }
            SignalType::HostVoiceReady => {
                let open = self.peers.lock().is_open(&self.host_id);
                if self.wants_audio.load(Ordering::SeqCst) && !open {
                    if let Err(e) = self.send_request().await {
                        tracing::warn!("Voice re-request failed: {}", e);
                    }
                }
            }
            SignalType::HostVoiceStopped => {
                self.close_peer();
                tracing::info!("Host {} stopped voice", self.host_id);
            }
            kind => tracing::trace!("Listener ignoring {:?}", kind),
        }
    }

    async fn on_offer(&self, offer: &SessionDescription) {
        if !self.wants_audio.load(Ordering::SeqCst) {
            return;
        }
        // A new offer replaces whatever connection we had
        self.close_peer();

        let events = self.events.lock().clone();
        let events = match events {
            Some(events) => events,
            None => return,
        };
        let connection = match self.connector.connect(&self.host_id, events).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!("Could not create peer for host: {}", e);
                return;
            }
        };
        let inserted = self.peers.lock().insert(&self.host_id, Arc::clone(&connection));
        if let Err(rejected) = inserted {
            rejected.close();
            return;
        }

        if let Err(e) = self.answer(offer, connection).await {
            tracing::warn!("Answering voice offer failed: {}", e);
            self.close_peer();
        }
    }

    async fn answer(
        &self,
        offer: &SessionDescription,
        connection: Arc<dyn PeerConnection>,
    ) -> VoiceResult<()> {
        connection.set_remote_description(offer).await?;
        self.peers.lock().advance(&self.host_id, PeerState::Offered);

        let answer = connection.create_answer().await?;
        if !self.peers.lock().advance(&self.host_id, PeerState::Answered) {
            return Err(VoiceError::Negotiation(
                "connection closed before answer was sent".to_string(),
            ));
        }

        send_signal(
            self.store.as_ref(),
            &self.session_id,
            &SignalMessage::answer(&self.viewer_id, &self.host_id, answer),
        )
        .await?;
        Ok(())
    }

    async fn handle_event(&self, event: PeerEvent) {
        match event.kind {
            PeerEventKind::IceCandidate(candidate) => {
                let message =
                    SignalMessage::viewer_candidate(&self.viewer_id, &self.host_id, candidate);
                if let Err(e) = send_signal(self.store.as_ref(), &self.session_id, &message).await {
                    tracing::debug!("Candidate for host not delivered: {}", e);
                }
            }
            PeerEventKind::Connected => {
                if self.peers.lock().advance(&self.host_id, PeerState::Connected) {
                    tracing::info!("{} receiving voice", self.viewer_id);
                }
            }
            PeerEventKind::RemoteTrack(track) => {
                *self.remote_track.lock() = Some(track);
            }
            PeerEventKind::Disconnected => self.close_peer(),
        }
    }
}

// =============================================================================
// Tasks
// =============================================================================

async fn spawn_signal_listener<F, Fut>(
    store: &Arc<dyn DocumentStore>,
    session_id: &str,
    participant_id: &str,
    window: chrono::Duration,
    on_signal: F,
) -> VoiceResult<JoinHandle<()>>
where
    F: Fn(Signal) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let query = Query::new().created_after(Utc::now() - window);
    let mut watch = store.watch(&signals_collection(session_id), query).await?;
    let participant_id = participant_id.to_string();

    Ok(tokio::spawn(async move {
        while let Some(change) = watch.next().await {
            if change.kind != ChangeKind::Added {
                continue;
            }
            match change.doc.decode::<Signal>() {
                Ok(signal) if signal.is_for(&participant_id) => on_signal(signal).await,
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping undecodable signal: {}", e),
            }
        }
    }))
}

fn spawn_event_pump<F, Fut>(mut events: mpsc::UnboundedReceiver<PeerEvent>, on_event: F) -> JoinHandle<()>
where
    F: Fn(PeerEvent) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            on_event(event).await;
        }
    })
}
