use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;
use crate::docker::{ContainerInfo, LogSource};
use crate::hub::Hub;
use crate::metrics::PipelineMetrics;
use crate::sql::QueryAggregator;
use crate::store::LogStore;

/// Shared application state.
pub struct AppState {
    pub source: Arc<dyn LogSource>,
    /// Container inventory cache, refreshed by the supervisor tick.
    pub inventory: DashMap<String, ContainerInfo>,
    pub store: Arc<LogStore>,
    pub hub: Arc<Hub>,
    pub sql: Arc<QueryAggregator>,
    pub metrics: Arc<PipelineMetrics>,
    pub config: MonitorConfig,
    /// Root cancellation token; cancelling it shuts the whole service down.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(source: Arc<dyn LogSource>, config: MonitorConfig) -> SharedState {
        let metrics = Arc::new(PipelineMetrics::new());
        let store = Arc::new(LogStore::new(config.store_config()));
        let hub = Hub::new(store.clone(), config.hub_config(), metrics.clone());
        Arc::new(AppState {
            source,
            inventory: DashMap::new(),
            store,
            hub,
            sql: Arc::new(QueryAggregator::new()),
            metrics,
            config,
            shutdown: CancellationToken::new(),
        })
    }

    /// Resolve container names to short ids against the current inventory.
    pub fn resolve_container_names(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter_map(|name| {
                self.inventory
                    .iter()
                    .find(|entry| &entry.value().name == name)
                    .map(|entry| entry.key().clone())
            })
            .collect()
    }

    /// Current container set, sorted by name for stable snapshots.
    pub fn container_snapshot(&self) -> Vec<ContainerInfo> {
        let mut containers: Vec<ContainerInfo> =
            self.inventory.iter().map(|e| e.value().clone()).collect();
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        containers
    }
}

pub type SharedState = Arc<AppState>;
