//! Scripted platform fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use slidecast::config::SlidecastConfig;
use slidecast::live::LiveContext;
use slidecast::media::{
    ChunkSender, CombinedStream, DeviceInfo, DeviceKind, DisplayRequest, EncoderFactory,
    MediaDevices, MediaEncoder, MediaError, MediaResult, MediaStream, MediaTrack, MixInput,
    AudioMixer, OwnedTrack, SharedTrack, TrackKind, UserMediaRequest,
};
use slidecast::store::{
    DocumentStore, DocumentWatch, Document, Fields, MemoryStore, Query, QueryWatch, StoreResult,
};
use slidecast::voice::{
    IceCandidate, PeerConnection, PeerConnector, PeerEvent, PeerEventKind, SdpType,
    SessionDescription, VoiceResult,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// =============================================================================
// Tracks
// =============================================================================

#[derive(Debug)]
pub struct FakeTrack {
    id: String,
    kind: TrackKind,
    live: AtomicBool,
}

impl FakeTrack {
    pub fn new(id: &str, kind: TrackKind) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
            live: AtomicBool::new(true),
        })
    }

    pub fn live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl MediaTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }
    fn kind(&self) -> TrackKind {
        self.kind
    }
    fn label(&self) -> &str {
        &self.id
    }
    fn is_live(&self) -> bool {
        self.live()
    }
    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

/// An owned track plus a handle to check it from the outside
pub fn owned_track(id: &str, kind: TrackKind) -> (OwnedTrack, Arc<FakeTrack>) {
    let track = FakeTrack::new(id, kind);
    (OwnedTrack::new(track.clone()), track)
}

// =============================================================================
// Devices
// =============================================================================

#[derive(Default)]
pub struct FakeDevices {
    pub deny_display: AtomicBool,
    pub deny_microphone: AtomicBool,
    /// Screen capture carries a system audio track when asked for one
    pub system_audio_available: AtomicBool,
    pub devices: Vec<DeviceInfo>,
    issued: Mutex<Vec<Arc<FakeTrack>>>,
    pub microphone_requests: Mutex<Vec<UserMediaRequest>>,
    /// How long the permission prompt takes to answer
    pub user_media_delay: Mutex<Duration>,
}

impl FakeDevices {
    pub fn new() -> Self {
        Self {
            system_audio_available: AtomicBool::new(true),
            devices: vec![
                DeviceInfo {
                    id: "default".to_string(),
                    label: "MacBook Pro Microphone".to_string(),
                    kind: DeviceKind::AudioInput,
                    is_default: true,
                },
                DeviceInfo {
                    id: "bt-1".to_string(),
                    label: "AirPods Pro".to_string(),
                    kind: DeviceKind::AudioInput,
                    is_default: false,
                },
            ],
            ..Default::default()
        }
    }

    pub fn denying_display() -> Self {
        let devices = Self::new();
        devices.deny_display.store(true, Ordering::SeqCst);
        devices
    }

    fn issue(&self, id: &str, kind: TrackKind) -> OwnedTrack {
        let mut issued = self.issued.lock();
        let track = FakeTrack::new(&format!("{}-{}", id, issued.len()), kind);
        issued.push(track.clone());
        OwnedTrack::new(track)
    }

    pub fn issued(&self) -> Vec<Arc<FakeTrack>> {
        self.issued.lock().clone()
    }

    pub fn live_tracks(&self) -> usize {
        self.issued.lock().iter().filter(|t| t.live()).count()
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn enumerate_devices(&self) -> MediaResult<Vec<DeviceInfo>> {
        Ok(self.devices.clone())
    }

    async fn get_display_media(&self, request: &DisplayRequest) -> MediaResult<MediaStream> {
        if self.deny_display.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied("screen share refused".to_string()));
        }
        let mut tracks = vec![self.issue("screen", TrackKind::Video)];
        if request.system_audio && self.system_audio_available.load(Ordering::SeqCst) {
            tracks.push(self.issue("system-audio", TrackKind::Audio));
        }
        Ok(MediaStream::new(tracks))
    }

    async fn get_user_media(&self, request: &UserMediaRequest) -> MediaResult<MediaStream> {
        self.microphone_requests.lock().push(request.clone());
        let delay = *self.user_media_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.deny_microphone.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied("microphone refused".to_string()));
        }
        Ok(MediaStream::new(vec![self.issue("mic", TrackKind::Audio)]))
    }
}

// =============================================================================
// Mixer
// =============================================================================

#[derive(Default)]
pub struct FakeMixer {
    pub fail: AtomicBool,
    /// Input count of every mix call
    pub calls: Mutex<Vec<usize>>,
    pub outputs: Mutex<Vec<Arc<FakeTrack>>>,
}

#[async_trait]
impl AudioMixer for FakeMixer {
    async fn mix(&self, inputs: &[MixInput]) -> MediaResult<OwnedTrack> {
        self.calls.lock().push(inputs.len());
        if self.fail.load(Ordering::SeqCst) {
            return Err(MediaError::Mixing("audio graph unavailable".to_string()));
        }
        let (owned, handle) = owned_track("mixed", TrackKind::Audio);
        self.outputs.lock().push(handle);
        Ok(owned)
    }
}

// =============================================================================
// Encoder
// =============================================================================

#[derive(Default)]
pub struct EncoderLog {
    pub calls: Mutex<Vec<&'static str>>,
    pub track_count: AtomicUsize,
}

struct FakeEncoder {
    log: Arc<EncoderLog>,
    chunks: Option<ChunkSender>,
}

#[async_trait]
impl MediaEncoder for FakeEncoder {
    async fn start(&mut self, _timeslice: Duration, chunks: ChunkSender) -> MediaResult<()> {
        self.log.calls.lock().push("start");
        let _ = chunks.send(b"HEAD".to_vec());
        self.chunks = Some(chunks);
        Ok(())
    }

    async fn pause(&mut self) -> MediaResult<()> {
        self.log.calls.lock().push("pause");
        Ok(())
    }

    async fn resume(&mut self) -> MediaResult<()> {
        self.log.calls.lock().push("resume");
        Ok(())
    }

    async fn stop(&mut self) -> MediaResult<()> {
        self.log.calls.lock().push("stop");
        if let Some(chunks) = self.chunks.take() {
            let _ = chunks.send(b"TAIL".to_vec());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeEncoders {
    pub created: Mutex<Vec<Arc<EncoderLog>>>,
}

impl FakeEncoders {
    pub fn last(&self) -> Option<Arc<EncoderLog>> {
        self.created.lock().last().cloned()
    }
}

impl EncoderFactory for FakeEncoders {
    fn create(&self, stream: &CombinedStream, _mime_type: &str) -> MediaResult<Box<dyn MediaEncoder>> {
        let log = Arc::new(EncoderLog::default());
        log.track_count.store(stream.track_count(), Ordering::SeqCst);
        self.created.lock().push(log.clone());
        Ok(Box::new(FakeEncoder { log, chunks: None }))
    }
}

// =============================================================================
// Peers
// =============================================================================

pub struct FakePeer {
    pub remote_id: String,
    pub tracks: Mutex<Vec<SharedTrack>>,
    pub remote_descriptions: Mutex<Vec<SessionDescription>>,
    pub candidates: Mutex<Vec<IceCandidate>>,
    closed: AtomicBool,
    events: mpsc::UnboundedSender<PeerEvent>,
}

impl FakePeer {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Simulate the transport reporting something
    pub fn emit(&self, kind: PeerEventKind) {
        let _ = self.events.send(PeerEvent {
            peer_id: self.remote_id.clone(),
            kind,
        });
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    async fn add_track(&self, track: &SharedTrack) -> VoiceResult<()> {
        self.tracks.lock().push(track.clone());
        Ok(())
    }

    async fn create_offer(&self) -> VoiceResult<SessionDescription> {
        Ok(SessionDescription {
            kind: SdpType::Offer,
            sdp: format!("v=0 offer for {}", self.remote_id),
        })
    }

    async fn create_answer(&self) -> VoiceResult<SessionDescription> {
        Ok(SessionDescription {
            kind: SdpType::Answer,
            sdp: format!("v=0 answer to {}", self.remote_id),
        })
    }

    async fn set_remote_description(&self, description: &SessionDescription) -> VoiceResult<()> {
        self.remote_descriptions.lock().push(description.clone());
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> VoiceResult<()> {
        self.candidates.lock().push(candidate.clone());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeConnector {
    pub peers: Mutex<Vec<Arc<FakePeer>>>,
}

impl FakeConnector {
    pub fn count(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn last(&self) -> Option<Arc<FakePeer>> {
        self.peers.lock().last().cloned()
    }

    pub fn peers_for(&self, remote_id: &str) -> Vec<Arc<FakePeer>> {
        self.peers
            .lock()
            .iter()
            .filter(|p| p.remote_id == remote_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PeerConnector for FakeConnector {
    async fn connect(
        &self,
        peer_id: &str,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> VoiceResult<Arc<dyn PeerConnection>> {
        let peer = Arc::new(FakePeer {
            remote_id: peer_id.to_string(),
            tracks: Mutex::new(Vec::new()),
            remote_descriptions: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            events,
        });
        self.peers.lock().push(peer.clone());
        Ok(peer)
    }
}

pub fn candidate(n: u32) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{} 1 udp 2122260223 10.0.0.{} 5000{} typ host", n, n, n),
        sdp_mid: Some("0".to_string()),
        sdp_m_line_index: Some(0),
    }
}

// =============================================================================
// Store
// =============================================================================

/// A store whose query subscriptions take a while to open
pub struct SlowWatchStore {
    pub inner: Arc<MemoryStore>,
    pub watch_delay: Duration,
}

#[async_trait]
impl DocumentStore for SlowWatchStore {
    async fn create(&self, collection: &str, fields: Fields) -> StoreResult<String> {
        self.inner.create(collection, fields).await
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields, merge: bool) -> StoreResult<()> {
        self.inner.set(collection, id, fields, merge).await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        self.inner.update(collection, id, fields).await
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.inner.get(collection, id).await
    }

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        self.inner.query(collection, query).await
    }

    async fn append(&self, collection: &str, fields: Fields) -> StoreResult<String> {
        self.inner.append(collection, fields).await
    }

    async fn increment_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> StoreResult<()> {
        self.inner.increment_field(collection, id, field, delta).await
    }

    async fn subscribe(&self, collection: &str, id: &str) -> StoreResult<DocumentWatch> {
        self.inner.subscribe(collection, id).await
    }

    async fn watch(&self, collection: &str, query: Query) -> StoreResult<QueryWatch> {
        tokio::time::sleep(self.watch_delay).await;
        self.inner.watch(collection, query).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub devices: Arc<FakeDevices>,
    pub connector: Arc<FakeConnector>,
    pub context: LiveContext,
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let devices = Arc::new(FakeDevices::new());
    let connector = Arc::new(FakeConnector::default());
    let context = LiveContext::new(
        store.clone(),
        devices.clone(),
        connector.clone(),
        SlidecastConfig::default(),
    );
    Harness {
        store,
        devices,
        connector,
        context,
    }
}

/// Poll `condition` until it holds, giving spawned tasks time to run
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
