//! Live session module
//!
//! - `registry`: create, look up and end sessions by share code
//! - `sync`: presenter intent and viewer presence on the session document
//! - `drawing`: throttled pointer and stroke publishing, committed drawings
//! - `feedback`: comments and reactions

pub mod code;
pub mod drawing;
pub mod feedback;
pub mod registry;
pub mod schema;
pub mod sync;
pub mod throttle;

pub use drawing::Annotator;
pub use feedback::{Feedback, ReactionFeed};
pub use registry::{CreatedSession, SessionRegistry};
pub use schema::{Author, Comment, Drawings, Path, Point, Reaction, ReactionType, Session, Tool};
pub use sync::SessionSync;

use crate::store::StoreError;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Comment text is empty")]
    EmptyComment,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// A running subscription. Dropping it (or calling `unsubscribe`) stops delivery.
pub struct SubscriptionHandle {
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn unsubscribe(self) {
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
