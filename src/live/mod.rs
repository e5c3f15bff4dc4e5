//! Live session facades
//!
//! Tie the registry, synchronizer, feedback and voice relay together for the
//! two roles of a broadcast: one presenter writing, many viewers reading.

mod audience;
mod presenter;

pub use audience::AudienceSession;
pub use presenter::PresenterSession;

use crate::config::SlidecastConfig;
use crate::media::MediaDevices;
use crate::store::DocumentStore;
use crate::voice::PeerConnector;
use std::sync::Arc;

/// Platform collaborators shared by both roles
#[derive(Clone)]
pub struct LiveContext {
    pub store: Arc<dyn DocumentStore>,
    pub devices: Arc<dyn MediaDevices>,
    pub connector: Arc<dyn PeerConnector>,
    pub config: SlidecastConfig,
}

impl LiveContext {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        devices: Arc<dyn MediaDevices>,
        connector: Arc<dyn PeerConnector>,
        config: SlidecastConfig,
    ) -> Self {
        Self {
            store,
            devices,
            connector,
            config,
        }
    }
}
