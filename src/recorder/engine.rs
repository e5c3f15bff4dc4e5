//! Recording engine
//!
//! Drives one local recording through its phases: acquire screen and
//! microphone, count down, mix audio into a single track, encode in time
//! slices, finalize with a progress signal and expose the artifact.
//!
//! Capture tracks acquired here are owned by the engine and stopped when the
//! recording finalizes or is aborted. A microphone handed in as a shared track
//! (the live voice relay's) is only referenced and keeps running.

use super::artifact::{artifact_file_name, RecordingArtifact};
use super::state::{CaptureOptions, MicrophoneSource, RecordingPhase, RecordingSegment};
use super::{RecordingError, RecordingResult};
use crate::config::RecorderConfig;
use crate::media::{
    plan_mix, preferred_microphone, AudioMixer, CombinedStream, DeviceList, DisplayRequest,
    EncoderFactory, MediaDevices, MediaEncoder, MediaStream, OwnedTrack, SharedTrack,
    UserMediaRequest,
};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Events emitted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingEvent {
    PhaseChanged(RecordingPhase),
    /// Countdown number being shown (3, 2, 1)
    Countdown(u32),
    /// Elapsed recording time in whole seconds
    Tick(u64),
    /// Finalization progress, 0-100, monotonic
    Progress(u8),
    /// Non-fatal problem (mixing fell back to video-only, encoder finalize failed)
    Error(String),
}

/// Streams acquired by `prepare`
struct Captures {
    screen: MediaStream,
    /// Acquired by the engine, stopped by it
    microphone: Option<MediaStream>,
    /// Borrowed from another owner, never stopped here
    shared_microphone: Option<SharedTrack>,
}

impl Captures {
    fn microphone_track(&self) -> Option<SharedTrack> {
        self.microphone
            .as_ref()
            .and_then(MediaStream::first_audio)
            .or_else(|| self.shared_microphone.clone())
    }

    fn release(self) {
        self.screen.stop_all();
        if let Some(microphone) = self.microphone {
            microphone.stop_all();
        }
        if let Some(shared) = self.shared_microphone {
            tracing::debug!("Leaving shared microphone {} running", shared.id());
        }
    }
}

#[derive(Default)]
struct EngineState {
    phase: RecordingPhase,
    /// Bumped on every prepare/abort so stale async continuations bail out
    generation: u64,
    captures: Option<Captures>,
    mixed_audio: Option<OwnedTrack>,
    ticker: Option<JoinHandle<()>>,
    collector: Option<JoinHandle<()>>,
    chunks: Vec<Vec<u8>>,
    elapsed_seconds: u64,
    progress: u8,
    segments: Vec<RecordingSegment>,
    artifact: Option<RecordingArtifact>,
}

struct Shared {
    devices: Arc<dyn MediaDevices>,
    mixer: Arc<dyn AudioMixer>,
    encoders: Arc<dyn EncoderFactory>,
    config: RecorderConfig,
    state: Mutex<EngineState>,
    /// Held across encoder calls; serializes start/pause/resume/stop
    encoder: tokio::sync::Mutex<Option<Box<dyn MediaEncoder>>>,
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl Shared {
    fn emit(&self, event: RecordingEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Apply a transition if legal; illegal ones are ignored
    fn transition(&self, state: &mut EngineState, to: RecordingPhase) -> bool {
        if !state.phase.can_transition(to) {
            tracing::debug!("Ignoring transition {:?} -> {:?}", state.phase, to);
            return false;
        }
        tracing::info!("Recording phase {:?} -> {:?}", state.phase, to);
        state.phase = to;
        self.emit(RecordingEvent::PhaseChanged(to));
        true
    }
}

/// Local recording state machine
#[derive(Clone)]
pub struct RecordingEngine {
    shared: Arc<Shared>,
}

impl RecordingEngine {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        mixer: Arc<dyn AudioMixer>,
        encoders: Arc<dyn EncoderFactory>,
        config: RecorderConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            shared: Arc::new(Shared {
                devices,
                mixer,
                encoders,
                config,
                state: Mutex::new(EngineState::default()),
                encoder: tokio::sync::Mutex::new(None),
                event_tx,
            }),
        }
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.shared.event_tx.subscribe()
    }

    pub fn phase(&self) -> RecordingPhase {
        self.shared.state.lock().phase
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.shared.state.lock().elapsed_seconds
    }

    pub fn progress(&self) -> u8 {
        self.shared.state.lock().progress
    }

    /// Chunks received from the encoder so far
    pub fn chunk_count(&self) -> usize {
        self.shared.state.lock().chunks.len()
    }

    pub fn is_prepared(&self) -> bool {
        self.shared.state.lock().captures.is_some()
    }

    pub fn segments(&self) -> Vec<RecordingSegment> {
        self.shared.state.lock().segments.clone()
    }

    pub fn artifact(&self) -> Option<RecordingArtifact> {
        self.shared.state.lock().artifact.clone()
    }

    /// Cameras and microphones for the setup screen
    pub async fn enumerate_devices(&self) -> RecordingResult<DeviceList> {
        let devices = self.shared.devices.enumerate_devices().await?;
        Ok(DeviceList::from_devices(devices))
    }

    /// Acquire the screen and, if requested and available, a microphone.
    ///
    /// Does not start the timer or the encoder. If the screen share is
    /// refused the phase stays `setup` and nothing is held open.
    pub async fn prepare(&self, options: CaptureOptions) -> RecordingResult<()> {
        let generation = {
            let mut state = self.shared.state.lock();
            if state.phase != RecordingPhase::Setup {
                return Err(RecordingError::Busy(state.phase));
            }
            let previous = state.captures.take();
            state.generation += 1;
            let generation = state.generation;
            drop(state);

            if let Some(previous) = previous {
                tracing::debug!("Releasing previously prepared captures");
                previous.release();
            }
            generation
        };

        let request = DisplayRequest {
            system_audio: options.system_audio,
        };
        let screen = match self.shared.devices.get_display_media(&request).await {
            Ok(screen) => screen,
            Err(e) => {
                tracing::warn!("Screen capture unavailable: {}", e);
                return Err(e.into());
            }
        };
        if screen.first_video().is_none() {
            screen.stop_all();
            return Err(RecordingError::NoVideoTrack);
        }

        let (microphone, shared_microphone) = match options.microphone {
            MicrophoneSource::None => (None, None),
            MicrophoneSource::Shared(track) => (None, Some(track)),
            MicrophoneSource::Device(device_id) => {
                let device_id = match device_id {
                    Some(id) => Some(id),
                    None => self.preferred_microphone_id().await,
                };
                match self
                    .shared
                    .devices
                    .get_user_media(&UserMediaRequest::microphone(device_id))
                    .await
                {
                    Ok(stream) => (Some(stream), None),
                    Err(e) => {
                        tracing::warn!("Microphone unavailable, recording without it: {}", e);
                        (None, None)
                    }
                }
            }
        };

        let captures = Captures {
            screen,
            microphone,
            shared_microphone,
        };

        let mut state = self.shared.state.lock();
        if state.generation != generation || state.phase != RecordingPhase::Setup {
            drop(state);
            captures.release();
            tracing::info!("Prepare aborted before completion");
            return Err(RecordingError::Aborted);
        }
        state.captures = Some(captures);

        tracing::info!("Recording prepared");
        Ok(())
    }

    /// Run the countdown, then start the encoder.
    ///
    /// No-op unless the engine is in `setup` with prepared captures.
    pub async fn start(&self) -> RecordingResult<()> {
        let generation = {
            let mut state = self.shared.state.lock();
            if state.phase != RecordingPhase::Setup {
                tracing::debug!("Start ignored in {:?}", state.phase);
                return Ok(());
            }
            if state.captures.is_none() {
                return Err(RecordingError::NotPrepared);
            }
            self.shared.transition(&mut state, RecordingPhase::Countdown);
            state.generation
        };

        for n in (1..=self.shared.config.countdown_seconds).rev() {
            if !self.is_current(generation, RecordingPhase::Countdown) {
                return Ok(());
            }
            self.shared.emit(RecordingEvent::Countdown(n));
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        self.begin_recording(generation).await
    }

    async fn begin_recording(&self, generation: u64) -> RecordingResult<()> {
        let mut slot = self.shared.encoder.lock().await;

        let (video, microphone, system_audio) = {
            let state = self.shared.state.lock();
            if state.generation != generation || state.phase != RecordingPhase::Countdown {
                return Ok(());
            }
            let Some(captures) = state.captures.as_ref() else {
                return Err(RecordingError::NotPrepared);
            };
            (
                captures.screen.first_video(),
                captures.microphone_track(),
                captures.screen.first_audio(),
            )
        };

        let Some(video) = video else {
            self.fail_start(generation);
            return Err(RecordingError::NoVideoTrack);
        };

        let plan = plan_mix(
            microphone.as_ref(),
            system_audio.as_ref(),
            &self.shared.config,
        );
        let mixed_audio = if plan.is_empty() {
            tracing::info!("No audio sources, recording video only");
            None
        } else {
            match self.shared.mixer.mix(&plan).await {
                Ok(track) => {
                    tracing::debug!("Mixed {} audio source(s) into {}", plan.len(), track.id());
                    Some(track)
                }
                Err(e) => {
                    tracing::warn!("Audio mixing failed, recording video only: {}", e);
                    self.shared.emit(RecordingEvent::Error(e.to_string()));
                    None
                }
            }
        };

        let combined = CombinedStream {
            video,
            audio: mixed_audio.as_ref().map(OwnedTrack::share),
        };
        let mut encoder = match self
            .shared
            .encoders
            .create(&combined, &self.shared.config.mime_type)
        {
            Ok(encoder) => encoder,
            Err(e) => {
                self.fail_start(generation);
                return Err(e.into());
            }
        };

        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        if let Err(e) = encoder
            .start(self.shared.config.timeslice(), chunk_tx)
            .await
        {
            self.fail_start(generation);
            return Err(e.into());
        }

        let aborted = {
            let mut state = self.shared.state.lock();
            if state.generation != generation || state.phase != RecordingPhase::Countdown {
                true
            } else {
                state.mixed_audio = mixed_audio;
                state.chunks.clear();
                state.elapsed_seconds = 0;
                state.progress = 0;
                state.artifact = None;
                state.segments = vec![RecordingSegment::new(0)];
                state.collector = Some(self.spawn_collector(chunk_rx));
                state.ticker = Some(self.spawn_ticker(generation));
                self.shared.transition(&mut state, RecordingPhase::Recording);
                false
            }
        };

        if aborted {
            tracing::info!("Recording aborted during start, discarding encoder");
            if let Err(e) = encoder.stop().await {
                tracing::debug!("Encoder stop after abort failed: {}", e);
            }
            return Ok(());
        }
        *slot = Some(encoder);

        tracing::info!(
            "Recording started ({} track(s))",
            combined.track_count()
        );
        Ok(())
    }

    /// Suspend the encoder and the elapsed timer. No-op unless recording.
    pub async fn pause(&self) -> RecordingResult<()> {
        let mut slot = self.shared.encoder.lock().await;
        if self.phase() != RecordingPhase::Recording {
            tracing::debug!("Pause ignored in {:?}", self.phase());
            return Ok(());
        }
        if let Some(encoder) = slot.as_mut() {
            encoder.pause().await?;
        }

        let mut state = self.shared.state.lock();
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
        if let Some(segment) = state.segments.last_mut() {
            segment.end();
        }
        self.shared.transition(&mut state, RecordingPhase::Paused);
        Ok(())
    }

    /// Resume after a pause. No-op unless paused.
    pub async fn resume(&self) -> RecordingResult<()> {
        let mut slot = self.shared.encoder.lock().await;
        if self.phase() != RecordingPhase::Paused {
            tracing::debug!("Resume ignored in {:?}", self.phase());
            return Ok(());
        }
        if let Some(encoder) = slot.as_mut() {
            encoder.resume().await?;
        }

        let mut state = self.shared.state.lock();
        let index = state.segments.len();
        state.segments.push(RecordingSegment::new(index));
        state.ticker = Some(self.spawn_ticker(state.generation));
        self.shared.transition(&mut state, RecordingPhase::Recording);
        Ok(())
    }

    /// Finalize the recording and produce the artifact.
    ///
    /// Returns `None` (and does nothing) unless recording or paused. Owned
    /// capture tracks are stopped; shared ones are left running.
    pub async fn stop(&self) -> RecordingResult<Option<RecordingArtifact>> {
        let mut slot = self.shared.encoder.lock().await;

        let collector = {
            let mut state = self.shared.state.lock();
            if !state.phase.is_capturing() {
                tracing::debug!("Stop ignored in {:?}", state.phase);
                return Ok(None);
            }
            if let Some(ticker) = state.ticker.take() {
                ticker.abort();
            }
            if let Some(segment) = state.segments.last_mut() {
                segment.end();
            }
            state.progress = 0;
            self.shared.transition(&mut state, RecordingPhase::Processing);
            state.collector.take()
        };

        if let Some(mut encoder) = slot.take() {
            if let Err(e) = encoder.stop().await {
                tracing::error!("Encoder finalize failed, keeping received chunks: {}", e);
                self.shared.emit(RecordingEvent::Error(e.to_string()));
            }
        }
        drop(slot);

        if let Some(collector) = collector {
            if let Err(e) = collector.await {
                tracing::warn!("Chunk collector ended abnormally: {}", e);
            }
        }

        let (captures, mixed_audio) = {
            let mut state = self.shared.state.lock();
            (state.captures.take(), state.mixed_audio.take())
        };
        if let Some(captures) = captures {
            captures.release();
        }
        drop(mixed_audio);

        let steps = self.shared.config.processing_steps.max(1);
        for step in 1..=steps {
            tokio::time::sleep(self.shared.config.processing_step()).await;
            let percent = (step * 100 / steps) as u8;
            self.shared.state.lock().progress = percent;
            self.shared.emit(RecordingEvent::Progress(percent));
        }

        let config = &self.shared.config;
        let mut state = self.shared.state.lock();
        let chunks = std::mem::take(&mut state.chunks);
        let artifact = RecordingArtifact::from_chunks(
            chunks,
            &config.mime_type,
            artifact_file_name(&config.file_prefix, config.file_extension(), Utc::now()),
            state.elapsed_seconds,
            state.segments.len(),
        );
        state.artifact = Some(artifact.clone());
        self.shared.transition(&mut state, RecordingPhase::Done);

        tracing::info!(
            "Recording finished: {} bytes, {}s, {} segment(s)",
            artifact.size(),
            artifact.duration_seconds,
            artifact.segment_count
        );
        Ok(Some(artifact))
    }

    /// Drop the finished artifact and go back to `setup`. No-op unless done.
    pub fn discard(&self) {
        let mut state = self.shared.state.lock();
        if state.phase != RecordingPhase::Done {
            tracing::debug!("Discard ignored in {:?}", state.phase);
            return;
        }
        state.artifact = None;
        state.chunks.clear();
        state.segments.clear();
        state.elapsed_seconds = 0;
        state.progress = 0;
        self.shared.transition(&mut state, RecordingPhase::Setup);
    }

    /// Cancel a recording that has not started yet.
    ///
    /// Releases prepared captures synchronously and invalidates any prepare
    /// or countdown still in flight.
    pub fn abort(&self) {
        let captures = {
            let mut state = self.shared.state.lock();
            match state.phase {
                RecordingPhase::Setup => {}
                RecordingPhase::Countdown => {
                    self.shared.transition(&mut state, RecordingPhase::Setup);
                }
                phase => {
                    tracing::debug!("Abort ignored in {:?}", phase);
                    return;
                }
            }
            state.generation += 1;
            state.captures.take()
        };

        if let Some(captures) = captures {
            captures.release();
            tracing::info!("Recording aborted, captures released");
        }
    }

    fn is_current(&self, generation: u64, phase: RecordingPhase) -> bool {
        let state = self.shared.state.lock();
        state.generation == generation && state.phase == phase
    }

    /// Tear down after a failed start and return to `setup`
    fn fail_start(&self, generation: u64) {
        let captures = {
            let mut state = self.shared.state.lock();
            if state.generation != generation || state.phase != RecordingPhase::Countdown {
                return;
            }
            self.shared.transition(&mut state, RecordingPhase::Setup);
            state.mixed_audio.take();
            state.captures.take()
        };
        if let Some(captures) = captures {
            captures.release();
        }
    }

    async fn preferred_microphone_id(&self) -> Option<String> {
        match self.shared.devices.enumerate_devices().await {
            Ok(devices) => preferred_microphone(&devices).map(|d| d.id.clone()),
            Err(e) => {
                tracing::debug!("Device enumeration failed, using platform default: {}", e);
                None
            }
        }
    }

    fn spawn_collector(&self, mut chunk_rx: mpsc::UnboundedReceiver<Vec<u8>>) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            while let Some(chunk) = chunk_rx.recv().await {
                if !chunk.is_empty() {
                    shared.state.lock().chunks.push(chunk);
                }
            }
        })
    }

    fn spawn_ticker(&self, generation: u64) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let period = Duration::from_secs(1);
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                let elapsed = {
                    let mut state = shared.state.lock();
                    if state.generation != generation || state.phase != RecordingPhase::Recording {
                        break;
                    }
                    state.elapsed_seconds += 1;
                    state.elapsed_seconds
                };
                shared.emit(RecordingEvent::Tick(elapsed));
            }
        })
    }
}
