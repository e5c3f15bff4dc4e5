//! Recording system module
//!
//! Local screen recording, independent of the network layer:
//! - `state`: the phase machine and segment tracking
//! - `engine`: capture, mix, encode and finalize
//! - `artifact`: the downloadable result

pub mod artifact;
pub mod engine;
pub mod state;

pub use artifact::RecordingArtifact;
pub use engine::{RecordingEngine, RecordingEvent};
pub use state::{CaptureOptions, MicrophoneSource, RecordingPhase, RecordingSegment};

use crate::media::MediaError;
use thiserror::Error;

/// Recording errors
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Screen capture has no video track")]
    NoVideoTrack,

    #[error("Nothing prepared; call prepare first")]
    NotPrepared,

    #[error("Recorder busy in phase {0:?}")]
    Busy(RecordingPhase),

    #[error("Recording start aborted")]
    Aborted,
}

pub type RecordingResult<T> = Result<T, RecordingError>;
