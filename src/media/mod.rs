//! Media capture abstractions
//!
//! Platform-agnostic traits for capture devices, audio mixing and encoding,
//! plus the track ownership model shared by the recorder and the voice relay.

pub mod devices;
pub mod encoder;
pub mod mixer;
pub mod stream;
pub mod track;

pub use devices::{
    preferred_microphone, DeviceInfo, DeviceKind, DeviceList, DisplayRequest, MediaDevices,
    UserMediaRequest,
};
pub use encoder::{ChunkSender, EncoderFactory, MediaEncoder};
pub use mixer::{plan_mix, AudioMixer, MixInput, MixSource};
pub use stream::{CombinedStream, MediaStream};
pub use track::{MediaTrack, OwnedTrack, SharedTrack, TrackKind};

use thiserror::Error;

/// Media errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Mixing error: {0}")]
    Mixing(String),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

pub type MediaResult<T> = Result<T, MediaError>;
