//! The indexed in-memory log store.
//!
//! A bounded, concurrent, multi-indexed collection of [`StoredMessage`]
//! values: insertion-order main list (newest at the head), a per-container
//! index, and a per-(field, value) index, all guarded by a single
//! readers-writer lock. Composite queries anchor on the smallest applicable
//! index; eviction runs on every add and on retention-policy changes.

pub mod message;
pub mod retention;
mod ring;

pub use message::{StoredMessage, FIELD_LEVEL, FIELD_RAW};
pub use retention::{RetentionPolicy, TIME_RETENTION_FLOOR};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::filter::FilterSpec;
use ring::Ring;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Default per-container count bound when no explicit retention is set.
    pub max_per_container: usize,
    /// Global wall-clock age bound, applied regardless of container policy.
    pub max_age: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_per_container: 10_000,
            max_age: None,
        }
    }
}

#[derive(Default)]
struct StoreInner {
    ring: Ring,
    retention: HashMap<String, RetentionPolicy>,
}

pub struct LogStore {
    inner: RwLock<StoreInner>,
    config: StoreConfig,
}

impl LogStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            config,
        }
    }

    /// Insert a message and apply eviction. O(1) plus evicted nodes.
    pub fn add(&self, msg: Arc<StoredMessage>) {
        let container_id = msg.container_id.clone();
        let now = Utc::now();
        let mut inner = self.inner.write();
        inner.ring.insert(msg);
        self.enforce_container(&mut inner, &container_id, now);
        self.enforce_global_age(&mut inner, now);
    }

    pub fn len(&self) -> usize {
        self.inner.read().ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_by_container(&self, container_id: &str) -> usize {
        self.inner.read().ring.container_len(container_id)
    }

    /// Replace a container's retention policy; applies immediately.
    pub fn set_retention(&self, container_id: &str, policy: RetentionPolicy) {
        let now = Utc::now();
        let mut inner = self.inner.write();
        inner.retention.insert(container_id.to_string(), policy);
        self.enforce_container(&mut inner, container_id, now);
    }

    /// Up to `limit` most-recent messages matching the spec, newest-first.
    ///
    /// Anchors on the single container list when the spec names exactly one
    /// container; otherwise on the smallest field-value list when field
    /// filters are present (an absent pair short-circuits to empty); then on
    /// the union of the named container lists; and finally on the main list.
    pub fn filter(&self, spec: &FilterSpec, limit: usize) -> Vec<Arc<StoredMessage>> {
        let inner = self.inner.read();
        let ring = &inner.ring;

        if spec.containers.len() == 1 {
            let container_id = spec.containers.iter().next().unwrap();
            let head = ring.container_list(container_id).and_then(|l| l.head);
            return collect(ring, head, |idx| ring.next_in_container(idx), spec, limit);
        }

        if !spec.field_filters.is_empty() {
            let mut anchor: Option<(&(String, String), ring::IndexList)> = None;
            for pair in &spec.field_filters {
                match ring.field_list(&pair.0, &pair.1) {
                    // Any absent pair means nothing can match.
                    None => return Vec::new(),
                    Some(list) => {
                        if anchor.as_ref().map_or(true, |(_, best)| list.len < best.len) {
                            anchor = Some((pair, list));
                        }
                    }
                }
            }
            let (pair, list) = anchor.unwrap();
            return collect(
                ring,
                list.head,
                |idx| ring.next_in_field(idx, &pair.0, &pair.1),
                spec,
                limit,
            );
        }

        if spec.containers.len() > 1 {
            // Union of container lists, merged newest-first by insertion seq.
            let mut candidates: Vec<(u64, Arc<StoredMessage>)> = Vec::new();
            for container_id in &spec.containers {
                let mut cur = ring.container_list(container_id).and_then(|l| l.head);
                let mut taken = 0;
                while let Some(idx) = cur {
                    if taken >= limit {
                        break;
                    }
                    let msg = ring.msg(idx);
                    if spec.is_match(msg) {
                        candidates.push((ring.seq(idx), msg.clone()));
                        taken += 1;
                    }
                    cur = ring.next_in_container(idx);
                }
            }
            candidates.sort_by(|a, b| b.0.cmp(&a.0));
            return candidates.into_iter().take(limit).map(|(_, m)| m).collect();
        }

        collect(ring, ring.main_head(), |idx| ring.next_in_main(idx), spec, limit)
    }

    fn enforce_container(&self, inner: &mut StoreInner, container_id: &str, now: DateTime<Utc>) {
        match inner.retention.get(container_id).copied() {
            Some(RetentionPolicy::Time(window_secs)) => {
                let cutoff = now - chrono::Duration::seconds(window_secs as i64);
                while inner.ring.container_len(container_id) > TIME_RETENTION_FLOOR {
                    let tail = match inner.ring.container_list(container_id).and_then(|l| l.tail) {
                        Some(idx) => idx,
                        None => break,
                    };
                    if inner.ring.msg(tail).timestamp >= cutoff {
                        break;
                    }
                    inner.ring.remove(tail);
                }
            }
            policy => {
                let max = match policy {
                    Some(RetentionPolicy::Count(n)) => n,
                    _ => self.config.max_per_container,
                };
                while inner.ring.container_len(container_id) > max {
                    let tail = match inner.ring.container_list(container_id).and_then(|l| l.tail) {
                        Some(idx) => idx,
                        None => break,
                    };
                    inner.ring.remove(tail);
                }
            }
        }
    }

    fn enforce_global_age(&self, inner: &mut StoreInner, now: DateTime<Utc>) {
        let Some(max_age) = self.config.max_age else {
            return;
        };
        let cutoff = now - chrono::Duration::from_std(max_age).unwrap_or_default();
        while let Some(tail) = inner.ring.main_tail() {
            if inner.ring.msg(tail).timestamp >= cutoff {
                break;
            }
            inner.ring.remove(tail);
        }
    }
}

/// Walk a list from `head` via `next`, applying the spec, newest-first.
fn collect<F>(
    ring: &Ring,
    head: Option<usize>,
    next: F,
    spec: &FilterSpec,
    limit: usize,
) -> Vec<Arc<StoredMessage>>
where
    F: Fn(usize) -> Option<usize>,
{
    let mut out = Vec::new();
    let mut cur = head;
    while let Some(idx) = cur {
        if out.len() >= limit {
            break;
        }
        let msg = ring.msg(idx);
        if spec.is_match(msg) {
            out.push(msg.clone());
        }
        cur = next(idx);
    }
    out
}
