//! Capture device access
//!
//! Platform-agnostic contract for enumerating devices and acquiring screen and
//! microphone streams. Acquisition is asynchronous and may be refused.

use super::stream::MediaStream;
use super::MediaResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    AudioInput,
    AudioOutput,
    VideoInput,
}

/// Information about a capture device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Unique device ID
    pub id: String,

    /// Human-readable label (may be empty before permission is granted)
    pub label: String,

    pub kind: DeviceKind,

    /// Whether this is the platform default device
    pub is_default: bool,
}

/// Devices grouped for a setup screen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceList {
    pub cameras: Vec<DeviceInfo>,
    pub microphones: Vec<DeviceInfo>,
}

impl DeviceList {
    pub fn from_devices(devices: Vec<DeviceInfo>) -> Self {
        let mut list = Self::default();
        for device in devices {
            match device.kind {
                DeviceKind::VideoInput => list.cameras.push(device),
                DeviceKind::AudioInput => list.microphones.push(device),
                DeviceKind::AudioOutput => {}
            }
        }
        list
    }

    pub fn preferred_microphone(&self) -> Option<&DeviceInfo> {
        preferred_microphone(&self.microphones)
    }
}

/// Screen capture request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayRequest {
    /// Ask for system/tab audio alongside the screen
    pub system_audio: bool,
}

/// Microphone/camera request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserMediaRequest {
    pub audio_device_id: Option<String>,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl UserMediaRequest {
    pub fn microphone(device_id: Option<String>) -> Self {
        Self {
            audio_device_id: device_id,
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn enumerate_devices(&self) -> MediaResult<Vec<DeviceInfo>>;

    /// Acquire a screen-capture stream; `PermissionDenied` if the user refuses
    async fn get_display_media(&self, request: &DisplayRequest) -> MediaResult<MediaStream>;

    /// Acquire a microphone stream
    async fn get_user_media(&self, request: &UserMediaRequest) -> MediaResult<MediaStream>;
}

/// Label fragments of wireless/headset microphones
const HEADSET_HINTS: &[&str] = &[
    "bluetooth",
    "airpods",
    "headset",
    "hands-free",
    "handsfree",
    "wireless",
    "buds",
    "bose",
    "jabra",
];

/// Pick a microphone: prefer a Bluetooth/wireless headset, else the default
/// device, else the first one.
pub fn preferred_microphone(devices: &[DeviceInfo]) -> Option<&DeviceInfo> {
    let inputs = || devices.iter().filter(|d| d.kind == DeviceKind::AudioInput);

    inputs()
        .find(|d| {
            let label = d.label.to_lowercase();
            HEADSET_HINTS.iter().any(|hint| label.contains(hint))
        })
        .or_else(|| inputs().find(|d| d.is_default || d.id == "default"))
        .or_else(|| inputs().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mic(id: &str, label: &str, is_default: bool) -> DeviceInfo {
        DeviceInfo {
            id: id.to_string(),
            label: label.to_string(),
            kind: DeviceKind::AudioInput,
            is_default,
        }
    }

    #[test]
    fn test_prefers_headset() {
        let devices = vec![
            mic("default", "Default - MacBook Pro Microphone", true),
            mic("bt", "Sam's AirPods Pro (Bluetooth)", false),
        ];
        assert_eq!(preferred_microphone(&devices).unwrap().id, "bt");
    }

    #[test]
    fn test_falls_back_to_default() {
        let devices = vec![
            mic("usb", "USB Audio", false),
            mic("builtin", "Built-in Microphone", true),
        ];
        assert_eq!(preferred_microphone(&devices).unwrap().id, "builtin");
    }

    #[test]
    fn test_ignores_outputs_and_handles_empty() {
        let devices = vec![DeviceInfo {
            id: "spk".to_string(),
            label: "Bluetooth Speaker".to_string(),
            kind: DeviceKind::AudioOutput,
            is_default: true,
        }];
        assert!(preferred_microphone(&devices).is_none());
        assert!(DeviceList::from_devices(devices).microphones.is_empty());
    }
}
