//! The log source trait — abstract interface over the container engine.
//!
//! `client.rs` provides the real bollard-backed implementation; `fake.rs`
//! provides a scripted test double. Object-safe thanks to `Pin<Box<…>>`
//! returns so implementations can live behind `Arc<dyn LogSource>`.

use std::pin::Pin;

use bytes::Bytes;
use thiserror::Error;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use super::inventory::ContainerInfo;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Docker connection failed: {0}")]
    ConnectionFailed(String),
    #[error("container source unavailable: {0}")]
    Unavailable(String),
    #[error("Bollard error: {0}")]
    Bollard(#[from] bollard::errors::Error),
}

/// Raw byte chunks from one container's multiplexed log stream.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, SourceError>> + Send>>;

/// Unified async interface over the container engine.
pub trait LogSource: Send + Sync {
    /// Snapshot of currently-running containers.
    fn list_running(
        &self,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<ContainerInfo>, SourceError>> + Send + '_>>;

    /// Open a follow-mode byte stream for one container (stdout + stderr,
    /// tail from the most recent lines, engine timestamps disabled).
    ///
    /// The stream terminates on cancellation, on container stop (EOF), or on
    /// unrecoverable I/O. Fails with [`SourceError::Unavailable`] when the
    /// container is absent or the daemon is unreachable.
    fn stream_logs<'a>(
        &'a self,
        container_id: &'a str,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<ChunkStream, SourceError>> + Send + 'a>>;
}
