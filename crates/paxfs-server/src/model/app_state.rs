//! Application state shared across handlers

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use paxfs_common::{PaxfsError, PaxfsResult};
use paxfs_consistency::{ReplicaCoordinator, ReplicaGroup};

use super::config::Configuration;

pub struct AppState {
    pub configuration: Configuration,
    pub group: Arc<ReplicaGroup>,
    /// Set when the Prometheus recorder is installed
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        configuration: Configuration,
        group: Arc<ReplicaGroup>,
        prometheus: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            configuration,
            group,
            prometheus,
        }
    }

    /// Coordinator client calls are routed to; `NotLeader` when none is designated
    pub fn leader(&self) -> PaxfsResult<Arc<ReplicaCoordinator>> {
        self.group.leader().ok_or(PaxfsError::NotLeader)
    }
}
