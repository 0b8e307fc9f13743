//! Per-container ingestion pipeline: source stream → frame demuxer → line
//! assembler → parser → fan-in channel.
//!
//! One task per container; no internal parallelism, so parse order equals
//! source order. Cancellation drains the assembler before exit.

pub mod assembler;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::docker::{demux, LogSource};
use crate::metrics::PipelineMetrics;
use crate::parser::LogEntry;
use assembler::LineAssembler;

/// One parsed entry on its way to the store and the hub.
#[derive(Debug)]
pub struct IngestEvent {
    pub container_id: String,
    pub entry: LogEntry,
}

/// Drive one container's log stream until EOF, error, or cancellation.
pub async fn run(
    source: Arc<dyn LogSource>,
    container_id: String,
    fan_in: mpsc::Sender<IngestEvent>,
    metrics: Arc<PipelineMetrics>,
    cancel: CancellationToken,
) {
    let mut stream = match source.stream_logs(&container_id, cancel.clone()).await {
        Ok(stream) => stream,
        Err(e) => {
            // The supervisor re-opens on its next discovery tick if the
            // container is still alive.
            warn!(container_id = %container_id, error = %e, "failed to open log stream");
            return;
        }
    };

    let mut asm = LineAssembler::new(metrics.clone());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => {
                    metrics.ingest.chunks_demuxed.fetch_add(1, Ordering::Relaxed);
                    let payload = demux::strip_frame_headers(&bytes);
                    for entry in asm.feed(&payload) {
                        if !emit(&fan_in, &container_id, entry, &metrics).await {
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(container_id = %container_id, error = %e, "log stream error");
                    break;
                }
                None => {
                    debug!(container_id = %container_id, "log stream ended");
                    break;
                }
            }
        }
    }

    // Drain: trailing partial line and any buffered multi-line entry.
    for entry in asm.finish() {
        if !emit(&fan_in, &container_id, entry, &metrics).await {
            return;
        }
    }
}

async fn emit(
    fan_in: &mpsc::Sender<IngestEvent>,
    container_id: &str,
    entry: LogEntry,
    metrics: &PipelineMetrics,
) -> bool {
    metrics.ingest.entries_parsed.fetch_add(1, Ordering::Relaxed);
    fan_in
        .send(IngestEvent {
            container_id: container_id.to_string(),
            entry,
        })
        .await
        .is_ok()
}
