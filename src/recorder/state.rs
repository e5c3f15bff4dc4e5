//! Recording state management
//!
//! Defines the recording phase machine and segment tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current phase of the recorder
///
/// `setup -> countdown -> recording <-> paused -> processing -> done -> setup`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingPhase {
    /// Device selection; nothing is being captured by the encoder
    #[default]
    Setup,
    /// Cosmetic 3-2-1 before the encoder starts
    Countdown,
    Recording,
    Paused,
    /// Encoder finalization
    Processing,
    /// Artifact ready for download
    Done,
}

impl RecordingPhase {
    /// Whether moving from `self` to `to` is a legal transition
    pub fn can_transition(self, to: RecordingPhase) -> bool {
        use RecordingPhase::*;
        matches!(
            (self, to),
            (Setup, Countdown)
                | (Countdown, Recording)
                | (Countdown, Setup)
                | (Recording, Paused)
                | (Paused, Recording)
                | (Recording, Processing)
                | (Paused, Processing)
                | (Processing, Done)
                | (Done, Setup)
        )
    }

    /// Whether the encoder is running (or suspended) in this phase
    pub fn is_capturing(self) -> bool {
        matches!(self, RecordingPhase::Recording | RecordingPhase::Paused)
    }
}

/// One uninterrupted stretch of recording
///
/// A new segment is opened each time recording starts or resumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSegment {
    /// Segment index (0, 1, 2, ...)
    pub index: usize,

    pub started_at: DateTime<Utc>,

    pub ended_at: Option<DateTime<Utc>>,
}

impl RecordingSegment {
    /// Open a segment starting now
    pub fn new(index: usize) -> Self {
        Self {
            index,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Close the segment
    pub fn end(&mut self) {
        if self.ended_at.is_none() {
            self.ended_at = Some(Utc::now());
        }
    }

    pub fn duration_ms(&self) -> i64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0)
    }
}

/// Where the microphone for a recording comes from
#[derive(Debug, Clone, Default)]
pub enum MicrophoneSource {
    /// Record without a microphone
    #[default]
    None,
    /// Acquire a device (the preferred one when `None`); the recorder owns it
    Device(Option<String>),
    /// Reuse a track owned by someone else (e.g. the live voice relay)
    Shared(crate::media::SharedTrack),
}

/// Options for preparing a recording
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    pub microphone: MicrophoneSource,

    /// Ask the screen capture for system audio
    pub system_audio: bool,
}
