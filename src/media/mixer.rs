//! Audio mixing
//!
//! Every audio source feeding a recording is routed through one mixing graph
//! into a single destination track, so the encoder always sees at most one
//! audio track however many sources exist.

use super::track::{OwnedTrack, SharedTrack};
use super::MediaResult;
use crate::config::RecorderConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MixSource {
    Microphone,
    SystemAudio,
}

/// One source connected into the graph
#[derive(Debug, Clone)]
pub struct MixInput {
    pub source: MixSource,
    pub track: SharedTrack,
    pub gain: f32,
}

/// Decide which sources go into the mix and at what gain.
///
/// Empty when neither source carries audio (video-only recording).
pub fn plan_mix(
    microphone: Option<&SharedTrack>,
    system_audio: Option<&SharedTrack>,
    config: &RecorderConfig,
) -> Vec<MixInput> {
    let mut inputs = Vec::with_capacity(2);
    if let Some(track) = microphone.filter(|t| t.is_live()) {
        inputs.push(MixInput {
            source: MixSource::Microphone,
            track: track.clone(),
            gain: config.mic_gain,
        });
    }
    if let Some(track) = system_audio.filter(|t| t.is_live()) {
        inputs.push(MixInput {
            source: MixSource::SystemAudio,
            track: track.clone(),
            gain: config.system_audio_gain,
        });
    }
    inputs
}

/// Platform audio graph
#[async_trait]
pub trait AudioMixer: Send + Sync {
    /// Connect all inputs into one destination and return its track.
    ///
    /// Stopping the returned track tears the graph down; the input tracks are
    /// left untouched.
    async fn mix(&self, inputs: &[MixInput]) -> MediaResult<OwnedTrack>;
}
