//! Slidecast - live slide broadcasting, made simple.
//!
//! Core of a live presentation system: session registry and synchronizer
//! (slides, annotations, presence, comments, reactions), a one-to-many voice
//! relay negotiated over a shared document store, and a local screen
//! recording engine. Platform media, peer transport, slide rendering and the
//! hosted store are consumed through traits.

pub mod config;
pub mod live;
pub mod media;
pub mod recorder;
pub mod render;
pub mod session;
pub mod store;
pub mod utils;
pub mod voice;

pub use config::SlidecastConfig;
pub use live::{AudienceSession, LiveContext, PresenterSession};
pub use utils::{AppError, AppResult, ErrorResponse};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the tracing subscriber. `RUST_LOG` overrides the default filter.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_tracing() {
    let installed = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slidecast=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Starting Slidecast v{}", env!("CARGO_PKG_VERSION"));
    }
}
