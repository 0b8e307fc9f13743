//! Fake — test double for the container log source.
//!
//! Provides a deterministic [`FakeSource`] that implements [`LogSource`]
//! from in-memory state. Useful for unit-testing the pipeline, supervisor,
//! and hub without a running Docker daemon.

use std::collections::HashMap;
use std::pin::Pin;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::inventory::ContainerInfo;
use super::source::{ChunkStream, LogSource, SourceError};

/// A canned container: its metadata plus scripted raw log chunks.
#[derive(Clone, Debug)]
struct FakeContainer {
    info: ContainerInfo,
    chunks: Vec<Bytes>,
    /// Keep the stream open (pending) after the scripted chunks, until the
    /// pipeline's token is cancelled. When false the stream ends (EOF).
    hold_open: bool,
}

/// A fake log source for deterministic testing.
pub struct FakeSource {
    containers: Mutex<HashMap<String, FakeContainer>>,
    /// When set, `list_running` fails with this error message.
    list_failure: Mutex<Option<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            containers: Mutex::new(HashMap::new()),
            list_failure: Mutex::new(None),
        }
    }

    /// Seed a running container.
    pub fn add_container(&self, info: ContainerInfo) {
        self.containers.lock().insert(
            info.id.clone(),
            FakeContainer {
                info,
                chunks: Vec::new(),
                hold_open: true,
            },
        );
    }

    /// Script the raw chunks a container's stream will yield.
    pub fn set_chunks(&self, container_id: &str, chunks: Vec<Bytes>, hold_open: bool) {
        if let Some(c) = self.containers.lock().get_mut(container_id) {
            c.chunks = chunks;
            c.hold_open = hold_open;
        }
    }

    /// Remove a container (it disappears from the next discovery tick).
    pub fn remove_container(&self, container_id: &str) {
        self.containers.lock().remove(container_id);
    }

    /// Make `list_running` fail until cleared with `None`.
    pub fn set_list_failure(&self, message: Option<&str>) {
        *self.list_failure.lock() = message.map(str::to_string);
    }
}

impl Default for FakeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSource for FakeSource {
    fn list_running(
        &self,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<ContainerInfo>, SourceError>> + Send + '_>>
    {
        Box::pin(async move {
            if let Some(msg) = self.list_failure.lock().clone() {
                return Err(SourceError::ConnectionFailed(msg));
            }
            let mut infos: Vec<ContainerInfo> = self
                .containers
                .lock()
                .values()
                .map(|c| c.info.clone())
                .collect();
            infos.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(infos)
        })
    }

    fn stream_logs<'a>(
        &'a self,
        container_id: &'a str,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<ChunkStream, SourceError>> + Send + 'a>>
    {
        Box::pin(async move {
            let container = self
                .containers
                .lock()
                .get(container_id)
                .cloned()
                .ok_or_else(|| SourceError::Unavailable(container_id.to_string()))?;

            let stream = async_stream::stream! {
                for chunk in container.chunks {
                    yield Ok::<bytes::Bytes, SourceError>(chunk);
                }
                if container.hold_open {
                    cancel.cancelled().await;
                }
            };
            Ok(Box::pin(stream) as ChunkStream)
        })
    }
}
