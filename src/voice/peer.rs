//! Peer connection seam
//!
//! The platform supplies the actual transport through [`PeerConnector`]; the
//! relay only tracks negotiation state per remote participant.

use super::signal::{IceCandidate, SessionDescription};
use super::VoiceResult;
use crate::media::SharedTrack;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Negotiation progress of one peer connection
///
/// `created -> offered -> answered -> connected`, any state `-> closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Created,
    /// Offer created (host) or received (listener)
    Offered,
    /// Answer applied (host) or sent (listener)
    Answered,
    Connected,
    Closed,
}

impl PeerState {
    pub fn can_transition(self, to: PeerState) -> bool {
        use PeerState::*;
        match (self, to) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Created, Offered) | (Offered, Answered) | (Answered, Connected) => true,
            _ => false,
        }
    }
}

/// Something the transport reports for a peer
#[derive(Debug, Clone)]
pub struct PeerEvent {
    pub peer_id: String,
    pub kind: PeerEventKind,
}

#[derive(Debug, Clone)]
pub enum PeerEventKind {
    /// A local ICE candidate that must reach the remote side
    IceCandidate(IceCandidate),
    Connected,
    /// Remote audio arrived (listener side)
    RemoteTrack(SharedTrack),
    Disconnected,
}

/// One peer connection
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn add_track(&self, track: &SharedTrack) -> VoiceResult<()>;

    /// Create an offer and install it as the local description
    async fn create_offer(&self) -> VoiceResult<SessionDescription>;

    /// Create an answer and install it as the local description
    async fn create_answer(&self) -> VoiceResult<SessionDescription>;

    async fn set_remote_description(&self, description: &SessionDescription) -> VoiceResult<()>;

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> VoiceResult<()>;

    /// Tear down the transport; must be safe to call more than once
    fn close(&self);
}

/// Creates peer connections. Events for the new peer are tagged with
/// `peer_id` and pushed to `events`.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(
        &self,
        peer_id: &str,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> VoiceResult<Arc<dyn PeerConnection>>;
}

pub(crate) struct PeerRecord {
    pub connection: Arc<dyn PeerConnection>,
    pub state: PeerState,
}

/// Peer connections keyed by remote participant id
#[derive(Default)]
pub(crate) struct PeerTable {
    peers: HashMap<String, PeerRecord>,
}

impl PeerTable {
    /// Live (not closed) connection for `peer_id`
    pub fn connection(&self, peer_id: &str) -> Option<Arc<dyn PeerConnection>> {
        self.peers
            .get(peer_id)
            .filter(|record| record.state != PeerState::Closed)
            .map(|record| record.connection.clone())
    }

    pub fn state(&self, peer_id: &str) -> Option<PeerState> {
        self.peers.get(peer_id).map(|record| record.state)
    }

    pub fn is_open(&self, peer_id: &str) -> bool {
        matches!(self.state(peer_id), Some(state) if state != PeerState::Closed)
    }

    /// Register a fresh connection. Returns it back if an open one already exists.
    pub fn insert(
        &mut self,
        peer_id: &str,
        connection: Arc<dyn PeerConnection>,
    ) -> Result<(), Arc<dyn PeerConnection>> {
        if self.is_open(peer_id) {
            return Err(connection);
        }
        self.peers.insert(
            peer_id.to_string(),
            PeerRecord {
                connection,
                state: PeerState::Created,
            },
        );
        Ok(())
    }

    /// Apply a guarded transition; returns whether it happened
    pub fn advance(&mut self, peer_id: &str, to: PeerState) -> bool {
        match self.peers.get_mut(peer_id) {
            Some(record) if record.state.can_transition(to) => {
                record.state = to;
                true
            }
            _ => false,
        }
    }

    /// Close and forget one peer
    pub fn close(&mut self, peer_id: &str) {
        if let Some(record) = self.peers.remove(peer_id) {
            record.connection.close();
        }
    }

    pub fn close_all(&mut self) -> usize {
        let count = self.peers.len();
        for (_, record) in self.peers.drain() {
            record.connection.close();
        }
        count
    }

    pub fn open_count(&self) -> usize {
        self.peers
            .values()
            .filter(|record| record.state != PeerState::Closed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::signal::SdpType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingPeer {
        closes: AtomicUsize,
    }

    #[async_trait]
    impl PeerConnection for CountingPeer {
        async fn add_track(&self, _track: &SharedTrack) -> VoiceResult<()> {
            Ok(())
        }
        async fn create_offer(&self) -> VoiceResult<SessionDescription> {
            Ok(SessionDescription {
                kind: SdpType::Offer,
                sdp: String::new(),
            })
        }
        async fn create_answer(&self) -> VoiceResult<SessionDescription> {
            Ok(SessionDescription {
                kind: SdpType::Answer,
                sdp: String::new(),
            })
        }
        async fn set_remote_description(&self, _d: &SessionDescription) -> VoiceResult<()> {
            Ok(())
        }
        async fn add_ice_candidate(&self, _c: &IceCandidate) -> VoiceResult<()> {
            Ok(())
        }
        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_state_transitions() {
        use PeerState::*;
        assert!(Created.can_transition(Offered));
        assert!(Offered.can_transition(Answered));
        assert!(Answered.can_transition(Connected));
        assert!(Connected.can_transition(Closed));
        assert!(!Answered.can_transition(Answered));
        assert!(!Created.can_transition(Answered));
        assert!(!Closed.can_transition(Offered));
    }

    #[test]
    fn test_second_insert_rejected_while_open() {
        let mut table = PeerTable::default();
        let first = Arc::new(CountingPeer::default());
        let second = Arc::new(CountingPeer::default());

        assert!(table.insert("v1", first.clone()).is_ok());
        assert!(table.insert("v1", second).is_err());
        assert_eq!(table.open_count(), 1);

        assert!(table.advance("v1", PeerState::Offered));
        assert!(table.advance("v1", PeerState::Answered));
        // A second answer must not be applied
        assert!(!table.advance("v1", PeerState::Answered));

        table.close("v1");
        assert_eq!(first.closes.load(Ordering::SeqCst), 1);
        assert!(table.connection("v1").is_none());
    }

    #[test]
    fn test_close_all() {
        let mut table = PeerTable::default();
        let peers: Vec<_> = (0..3).map(|_| Arc::new(CountingPeer::default())).collect();
        for (i, peer) in peers.iter().enumerate() {
            let _ = table.insert(&format!("v{}", i), peer.clone());
        }

        assert_eq!(table.close_all(), 3);
        assert_eq!(table.open_count(), 0);
        assert!(peers.iter().all(|p| p.closes.load(Ordering::SeqCst) == 1));
    }
}
