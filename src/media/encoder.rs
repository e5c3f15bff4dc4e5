//! Media encoder contract
//!
//! An encoder consumes a combined stream and emits time-sliced chunks over a
//! channel while running. Stopping flushes the last chunk and closes the
//! channel, which is how the recorder knows every chunk has arrived.

use super::stream::CombinedStream;
use super::MediaResult;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

pub type ChunkSender = mpsc::UnboundedSender<Vec<u8>>;

#[async_trait]
pub trait MediaEncoder: Send {
    /// Begin encoding, emitting a chunk roughly every `timeslice`
    async fn start(&mut self, timeslice: Duration, chunks: ChunkSender) -> MediaResult<()>;

    async fn pause(&mut self) -> MediaResult<()>;

    async fn resume(&mut self) -> MediaResult<()>;

    /// Finalize: emit any buffered data, then drop the chunk sender
    async fn stop(&mut self) -> MediaResult<()>;
}

pub trait EncoderFactory: Send + Sync {
    fn create(&self, stream: &CombinedStream, mime_type: &str) -> MediaResult<Box<dyn MediaEncoder>>;
}
