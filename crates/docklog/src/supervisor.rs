//! Container discovery and pipeline lifecycle.
//!
//! A periodic tick lists running containers, diffs them against the live
//! pipeline set, starts pipelines for new containers and cancels pipelines
//! for vanished ones. The inventory cache is refreshed with upsert+retain so
//! it is never empty mid-update, and a container-set snapshot is broadcast
//! whenever the set changes. On daemon errors the previous inventory is kept
//! (stale beats empty); the pipeline for a failed container is simply
//! re-opened on a later tick.
//!
//! A single fan-in consumer owns the store/hub/sql ordering for every
//! parsed entry.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::docker::ContainerInfo;
use crate::pipeline::{self, IngestEvent};
use crate::sql::SqlRecord;
use crate::state::SharedState;
use crate::store::StoredMessage;

const LIST_TIMEOUT: Duration = Duration::from_secs(5);
const FAN_IN_CAPACITY: usize = 1_024;

struct PipelineHandle {
    generation: u64,
    cancel: CancellationToken,
}

pub struct Supervisor {
    state: SharedState,
    pipelines: Arc<DashMap<String, PipelineHandle>>,
    fan_in: mpsc::Sender<IngestEvent>,
    next_generation: AtomicU64,
}

impl Supervisor {
    pub fn new(state: SharedState) -> Self {
        let (tx, rx) = mpsc::channel(FAN_IN_CAPACITY);
        tokio::spawn(fan_in_loop(state.clone(), rx));
        Self {
            state,
            pipelines: Arc::new(DashMap::new()),
            fan_in: tx,
            next_generation: AtomicU64::new(0),
        }
    }

    /// Discovery loop. Runs until the root shutdown token is cancelled.
    pub async fn run(self) {
        let interval_secs = self.state.config.discovery_interval_secs;
        info!(interval_secs, "starting container discovery");

        let mut interval = time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut consecutive_failures: u64 = 0;

        loop {
            tokio::select! {
                _ = self.state.shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            match time::timeout(LIST_TIMEOUT, self.state.source.list_running()).await {
                Ok(Ok(containers)) => {
                    consecutive_failures = 0;
                    self.sync(containers);
                }
                Ok(Err(e)) => {
                    consecutive_failures += 1;
                    error!(attempt = consecutive_failures, error = %e, "container listing failed");
                }
                Err(_) => {
                    consecutive_failures += 1;
                    warn!(
                        attempt = consecutive_failures,
                        timeout_secs = LIST_TIMEOUT.as_secs(),
                        "container listing timed out"
                    );
                }
            }
            self.state
                .metrics
                .system
                .docker_consecutive_failures
                .store(consecutive_failures, Ordering::Relaxed);
        }

        info!("discovery stopped, cancelling container pipelines");
        for entry in self.pipelines.iter() {
            entry.value().cancel.cancel();
        }
    }

    /// Diff the observed container set against the live pipelines.
    fn sync(&self, containers: Vec<ContainerInfo>) {
        let active_ids: HashSet<String> = containers.iter().map(|c| c.id.clone()).collect();
        let mut changed = false;

        // Upsert + retain keeps the cache populated throughout the update.
        for container in &containers {
            let previous = self
                .state
                .inventory
                .insert(container.id.clone(), container.clone());
            if previous.as_ref() != Some(container) {
                changed = true;
            }
        }
        let before = self.state.inventory.len();
        self.state.inventory.retain(|id, _| active_ids.contains(id));
        if self.state.inventory.len() != before {
            changed = true;
        }

        for container in &containers {
            if !self.pipelines.contains_key(&container.id) {
                self.start_pipeline(container);
            }
        }
        for entry in self.pipelines.iter() {
            if !active_ids.contains(entry.key()) {
                entry.value().cancel.cancel();
            }
        }

        if changed {
            self.state
                .hub
                .broadcast_containers(&self.state.container_snapshot());
        }
    }

    fn start_pipeline(&self, container: &ContainerInfo) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = self.state.shutdown.child_token();
        self.pipelines.insert(
            container.id.clone(),
            PipelineHandle {
                generation,
                cancel: cancel.clone(),
            },
        );
        self.state
            .metrics
            .system
            .pipelines_started
            .fetch_add(1, Ordering::Relaxed);
        info!(container_id = %container.id, name = %container.name, "starting log pipeline");

        let source = self.state.source.clone();
        let metrics = self.state.metrics.clone();
        let fan_in = self.fan_in.clone();
        let pipelines = self.pipelines.clone();
        let container_id = container.id.clone();
        tokio::spawn(async move {
            pipeline::run(source, container_id.clone(), fan_in, metrics.clone(), cancel).await;
            // Only remove our own registration — a restarted pipeline may
            // already occupy this id.
            pipelines.remove_if(&container_id, |_, handle| handle.generation == generation);
            metrics
                .system
                .pipelines_stopped
                .fetch_add(1, Ordering::Relaxed);
        });
    }
}

/// The single fan-in consumer: every parsed entry becomes a stored message,
/// feeds the SQL aggregator, lands in the store, and is offered to the hub.
async fn fan_in_loop(state: SharedState, mut rx: mpsc::Receiver<IngestEvent>) {
    while let Some(event) = rx.recv().await {
        if let Some(record) = SqlRecord::from_entry(&event.entry) {
            state.sql.observe(&record);
        }
        let msg = Arc::new(StoredMessage::new(
            event.container_id,
            event.entry,
            Utc::now(),
        ));
        state.store.add(msg.clone());
        state.hub.offer(&msg);
    }
}
