//! Voice relay module
//!
//! One-to-many microphone audio from the host to viewers. Negotiation runs
//! over the session's append-only `signals` collection:
//! - `signal`: wire format and addressing
//! - `peer`: the peer connection seam and per-viewer negotiation state
//! - `relay`: host and listener sides of the protocol

pub mod peer;
pub mod relay;
pub mod signal;

pub use peer::{PeerConnection, PeerConnector, PeerEvent, PeerEventKind, PeerState};
pub use relay::{VoiceHost, VoiceListener};
pub use signal::{IceCandidate, SdpType, SessionDescription, Signal, SignalMessage, SignalType};

use crate::media::MediaError;
use crate::store::StoreError;
use thiserror::Error;

/// Voice relay errors
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Microphone capture returned no audio track")]
    NoMicrophone,

    #[error("Negotiation failed: {0}")]
    Negotiation(String),
}

pub type VoiceResult<T> = Result<T, VoiceError>;
