//! Runtime configuration
//!
//! Every tunable (throttle rates, expiry windows, recorder timings) lives here
//! with a sensible default, so an empty or missing config file is valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Sync
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub pointer_max_per_second: u32,
    pub stroke_max_per_second: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pointer_max_per_second: 20,
            stroke_max_per_second: 5,
        }
    }
}

impl SyncConfig {
    pub fn pointer_interval(&self) -> Duration {
        per_second_interval(self.pointer_max_per_second)
    }

    pub fn stroke_interval(&self) -> Duration {
        per_second_interval(self.stroke_max_per_second)
    }
}

fn per_second_interval(rate: u32) -> Duration {
    Duration::from_millis(1000 / u64::from(rate.max(1)))
}

// =============================================================================
// Feedback
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedbackConfig {
    /// Reactions older than this are never delivered
    pub reaction_expiry_ms: u64,
    /// How long a delivered reaction stays in the view
    pub reaction_display_ms: u64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            reaction_expiry_ms: 10_000,
            reaction_display_ms: 3_000,
        }
    }
}

impl FeedbackConfig {
    pub fn reaction_expiry(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.reaction_expiry_ms as i64)
    }

    pub fn reaction_display(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.reaction_display_ms as i64)
    }
}

// =============================================================================
// Voice
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoiceConfig {
    /// Only signals newer than `now - window` are replayed to a listener
    pub signal_window_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            signal_window_ms: 60_000,
        }
    }
}

impl VoiceConfig {
    pub fn signal_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.signal_window_ms as i64)
    }
}

// =============================================================================
// Recorder
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    pub countdown_seconds: u32,
    /// Encoder chunk slice
    pub timeslice_ms: u64,
    pub mic_gain: f32,
    pub system_audio_gain: f32,
    pub processing_steps: u32,
    pub processing_step_ms: u64,
    pub mime_type: String,
    pub file_prefix: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            countdown_seconds: 3,
            timeslice_ms: 1_000,
            mic_gain: 1.0,
            system_audio_gain: 0.7,
            processing_steps: 10,
            processing_step_ms: 50,
            mime_type: "video/webm".to_string(),
            file_prefix: "recording".to_string(),
        }
    }
}

impl RecorderConfig {
    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms)
    }

    pub fn processing_step(&self) -> Duration {
        Duration::from_millis(self.processing_step_ms)
    }

    /// File extension derived from the container mime type
    pub fn file_extension(&self) -> &str {
        match self.mime_type.split(';').next().unwrap_or_default() {
            "video/mp4" => "mp4",
            "video/x-matroska" => "mkv",
            _ => "webm",
        }
    }
}

// =============================================================================
// Share
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShareConfig {
    pub base_url: String,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            base_url: "https://slidecast.app/join".to_string(),
        }
    }
}

// =============================================================================
// Root
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlidecastConfig {
    pub sync: SyncConfig,
    pub feedback: FeedbackConfig,
    pub voice: VoiceConfig,
    pub recorder: RecorderConfig,
    pub share: ShareConfig,
}

impl SlidecastConfig {
    /// Load configuration from a JSON file
    ///
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;

        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.pointer_max_per_second == 0 || self.sync.stroke_max_per_second == 0 {
            return Err(ConfigError::Invalid(
                "throttle rates must be greater than zero".to_string(),
            ));
        }
        if self.recorder.timeslice_ms == 0 {
            return Err(ConfigError::Invalid(
                "recorder timeslice must be greater than zero".to_string(),
            ));
        }
        for (name, gain) in [
            ("micGain", self.recorder.mic_gain),
            ("systemAudioGain", self.recorder.system_audio_gain),
        ] {
            if !(0.0..=2.0).contains(&gain) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within 0.0..=2.0, got {}",
                    name, gain
                )));
            }
        }
        Ok(())
    }
}
