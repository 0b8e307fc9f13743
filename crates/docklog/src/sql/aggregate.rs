//! Per-request query aggregation and N+1 flagging.

use std::collections::{BTreeSet, HashMap, VecDeque};

use parking_lot::Mutex;
use serde::Serialize;

use super::SqlRecord;

/// A fingerprint is flagged as N+1 when it occurs more than this many times
/// within one request scope.
pub const N_PLUS_ONE_THRESHOLD: usize = 5;

/// Upper bound on tracked request scopes; oldest scopes are dropped first.
const MAX_SCOPES: usize = 1_000;

#[derive(Debug, Clone)]
struct QueryStats {
    count: usize,
    sum_duration_ms: f64,
    min_duration_ms: Option<f64>,
    max_duration_ms: Option<f64>,
    example_statement: String,
    normalized: String,
    tables: BTreeSet<String>,
    operations: BTreeSet<String>,
}

/// Aggregated view of one query shape within a request scope.
#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub fingerprint: String,
    pub normalized: String,
    pub example_statement: String,
    pub count: usize,
    pub sum_duration_ms: f64,
    pub min_duration_ms: Option<f64>,
    pub max_duration_ms: Option<f64>,
    pub avg_duration_ms: f64,
    pub tables: Vec<String>,
    pub operations: Vec<String>,
    pub n_plus_one: bool,
}

#[derive(Default)]
struct Scopes {
    by_request: HashMap<String, HashMap<String, QueryStats>>,
    /// Insertion order of scopes, for bounded memory.
    order: VecDeque<String>,
}

/// Groups SQL records by fingerprint within each request scope.
#[derive(Default)]
pub struct QueryAggregator {
    scopes: Mutex<Scopes>,
}

impl QueryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record into its scope. Records without a request id are
    /// grouped under the empty scope.
    pub fn observe(&self, record: &SqlRecord) {
        let scope_key = record.request_id.clone().unwrap_or_default();
        let mut scopes = self.scopes.lock();

        if !scopes.by_request.contains_key(&scope_key) {
            scopes.order.push_back(scope_key.clone());
            while scopes.order.len() > MAX_SCOPES {
                if let Some(evicted) = scopes.order.pop_front() {
                    scopes.by_request.remove(&evicted);
                }
            }
        }

        let stats = scopes
            .by_request
            .entry(scope_key)
            .or_default()
            .entry(record.fingerprint.clone())
            .or_insert_with(|| QueryStats {
                count: 0,
                sum_duration_ms: 0.0,
                min_duration_ms: None,
                max_duration_ms: None,
                example_statement: record.raw.clone(),
                normalized: record.normalized.clone(),
                tables: BTreeSet::new(),
                operations: BTreeSet::new(),
            });

        stats.count += 1;
        if let Some(d) = record.duration_ms {
            stats.sum_duration_ms += d;
            stats.min_duration_ms = Some(stats.min_duration_ms.map_or(d, |m| m.min(d)));
            stats.max_duration_ms = Some(stats.max_duration_ms.map_or(d, |m| m.max(d)));
        }
        if let Some(table) = &record.table {
            stats.tables.insert(table.clone());
        }
        if let Some(op) = &record.operation {
            stats.operations.insert(op.clone());
        }
    }

    /// Aggregates for one request scope, heaviest total duration first.
    pub fn report(&self, request_id: &str) -> Vec<QueryReport> {
        let scopes = self.scopes.lock();
        let Some(by_fingerprint) = scopes.by_request.get(request_id) else {
            return Vec::new();
        };
        let mut reports: Vec<QueryReport> = by_fingerprint
            .iter()
            .map(|(fp, stats)| QueryReport {
                fingerprint: fp.clone(),
                normalized: stats.normalized.clone(),
                example_statement: stats.example_statement.clone(),
                count: stats.count,
                sum_duration_ms: stats.sum_duration_ms,
                min_duration_ms: stats.min_duration_ms,
                max_duration_ms: stats.max_duration_ms,
                avg_duration_ms: if stats.count > 0 {
                    stats.sum_duration_ms / stats.count as f64
                } else {
                    0.0
                },
                tables: stats.tables.iter().cloned().collect(),
                operations: stats.operations.iter().cloned().collect(),
                n_plus_one: stats.count > N_PLUS_ONE_THRESHOLD,
            })
            .collect();
        reports.sort_by(|a, b| {
            b.sum_duration_ms
                .partial_cmp(&a.sum_duration_ms)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        reports
    }

    /// Number of tracked scopes.
    pub fn scope_count(&self) -> usize {
        self.scopes.lock().by_request.len()
    }
}
