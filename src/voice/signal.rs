//! Voice negotiation signals
//!
//! Signals are appended to the session's `signals` collection and read back by
//! every participant; each one keeps only what is addressed to it.

use super::VoiceResult;
use crate::session::schema::signals_collection;
use crate::store::{to_fields, DocumentStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recipient id for signals meant for every viewer
pub const BROADCAST: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalType {
    ViewerRequestVoice,
    HostVoiceOffer,
    ViewerVoiceAnswer,
    HostIceCandidate,
    ViewerIceCandidate,
    HostVoiceReady,
    HostVoiceStopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_m_line_index: Option<u16>,
}

/// Signal body as written to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalMessage {
    #[serde(rename = "type")]
    pub kind: SignalType,
    pub from_id: String,
    pub to_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<IceCandidate>,
}

impl SignalMessage {
    fn new(kind: SignalType, from_id: &str, to_id: &str) -> Self {
        Self {
            kind,
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            offer: None,
            answer: None,
            candidate: None,
        }
    }

    pub fn request_voice(viewer_id: &str, host_id: &str) -> Self {
        Self::new(SignalType::ViewerRequestVoice, viewer_id, host_id)
    }

    pub fn offer(host_id: &str, viewer_id: &str, offer: SessionDescription) -> Self {
        Self {
            offer: Some(offer),
            ..Self::new(SignalType::HostVoiceOffer, host_id, viewer_id)
        }
    }

    pub fn answer(viewer_id: &str, host_id: &str, answer: SessionDescription) -> Self {
        Self {
            answer: Some(answer),
            ..Self::new(SignalType::ViewerVoiceAnswer, viewer_id, host_id)
        }
    }

    pub fn host_candidate(host_id: &str, viewer_id: &str, candidate: IceCandidate) -> Self {
        Self {
            candidate: Some(candidate),
            ..Self::new(SignalType::HostIceCandidate, host_id, viewer_id)
        }
    }

    pub fn viewer_candidate(viewer_id: &str, host_id: &str, candidate: IceCandidate) -> Self {
        Self {
            candidate: Some(candidate),
            ..Self::new(SignalType::ViewerIceCandidate, viewer_id, host_id)
        }
    }

    pub fn voice_ready(host_id: &str) -> Self {
        Self::new(SignalType::HostVoiceReady, host_id, BROADCAST)
    }

    pub fn voice_stopped(host_id: &str) -> Self {
        Self::new(SignalType::HostVoiceStopped, host_id, BROADCAST)
    }
}

/// A signal read back from the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub message: SignalMessage,
}

impl Signal {
    /// Whether `participant_id` should act on this signal
    pub fn is_for(&self, participant_id: &str) -> bool {
        self.message.from_id != participant_id
            && (self.message.to_id == participant_id || self.message.to_id == BROADCAST)
    }
}

/// Append a signal to the session's negotiation log
pub async fn send_signal(
    store: &dyn DocumentStore,
    session_id: &str,
    message: &SignalMessage,
) -> VoiceResult<String> {
    let fields = to_fields(message)?;
    let id = store.append(&signals_collection(session_id), fields).await?;
    tracing::trace!(
        "Signal {:?} {} -> {} ({})",
        message.kind,
        message.from_id,
        message.to_id,
        id
    );
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        let message = SignalMessage::request_voice("viewer-1", "host-1");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "viewer-request-voice");
        assert_eq!(json["fromId"], "viewer-1");
        assert_eq!(json["toId"], "host-1");
        assert!(json.get("offer").is_none());
    }

    #[test]
    fn test_candidate_field_names() {
        let candidate = IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        };
        let json = serde_json::to_value(&candidate).unwrap();
        assert_eq!(json["sdpMid"], "0");
        assert_eq!(json["sdpMLineIndex"], 0);
    }

    #[test]
    fn test_addressing() {
        let signal = Signal {
            id: "s1".to_string(),
            created_at: Utc::now(),
            message: SignalMessage::voice_ready("host-1"),
        };
        assert!(signal.is_for("viewer-1"));
        assert!(!signal.is_for("host-1"));

        let direct = Signal {
            message: SignalMessage::request_voice("viewer-1", "host-1"),
            ..signal
        };
        assert!(direct.is_for("host-1"));
        assert!(!direct.is_for("viewer-2"));
    }
}
