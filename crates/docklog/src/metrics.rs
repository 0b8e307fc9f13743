//! Diagnostic counters.
//!
//! Lock-free atomics, incremented from the hot paths and exposed as a JSON
//! snapshot on `/api/metrics`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct IngestMetrics {
    pub chunks_demuxed: AtomicU64,
    pub entries_parsed: AtomicU64,
    /// Lines over the per-line size cap, dropped before parsing.
    pub lines_dropped_oversize: AtomicU64,
}

#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    pub batches_sent: AtomicU64,
    /// Messages dropped because a subscriber's buffer or outbound was full.
    pub messages_dropped_slow: AtomicU64,
}

#[derive(Debug, Default)]
pub struct SystemMetrics {
    pub docker_consecutive_failures: AtomicU64,
    pub pipelines_started: AtomicU64,
    pub pipelines_stopped: AtomicU64,
}

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub ingest: IngestMetrics,
    pub delivery: DeliveryMetrics,
    pub system: SystemMetrics,
}

/// Point-in-time copy of every counter, for the metrics endpoint.
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub chunks_demuxed: u64,
    pub entries_parsed: u64,
    pub lines_dropped_oversize: u64,
    pub batches_sent: u64,
    pub messages_dropped_slow: u64,
    pub docker_consecutive_failures: u64,
    pub pipelines_started: u64,
    pub pipelines_stopped: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            chunks_demuxed: self.ingest.chunks_demuxed.load(Ordering::Relaxed),
            entries_parsed: self.ingest.entries_parsed.load(Ordering::Relaxed),
            lines_dropped_oversize: self.ingest.lines_dropped_oversize.load(Ordering::Relaxed),
            batches_sent: self.delivery.batches_sent.load(Ordering::Relaxed),
            messages_dropped_slow: self.delivery.messages_dropped_slow.load(Ordering::Relaxed),
            docker_consecutive_failures: self.system.docker_consecutive_failures.load(Ordering::Relaxed),
            pipelines_started: self.system.pipelines_started.load(Ordering::Relaxed),
            pipelines_stopped: self.system.pipelines_stopped.load(Ordering::Relaxed),
        }
    }
}
