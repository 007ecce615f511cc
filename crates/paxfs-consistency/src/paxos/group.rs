// Replica group
// A set of replicas sharing one in-process quorum, with externally driven leadership

use std::sync::Arc;

use paxfs_common::{PaxfsError, PaxfsResult};
use parking_lot::RwLock;
use tracing::info;

use super::config::PaxosConfig;
use super::consensus::{ConsensusClient, LocalQuorum};
use super::coordinator::{ReplicaCoordinator, ReplicaStatus};
use super::log_store::MemoryLogStore;
use super::node::ReplicaNode;
use super::replica_state::Role;

pub struct ReplicaGroup {
    quorum: Arc<LocalQuorum>,
    nodes: Vec<ReplicaNode>,
    /// Replica designated leader by the last `elect`
    leader: RwLock<Option<u64>>,
}

impl ReplicaGroup {
    /// Group whose replicas keep their logs in memory
    pub fn in_memory(config: PaxosConfig) -> PaxfsResult<Self> {
        Self::build(config, false)
    }

    /// Group whose replicas keep their logs in RocksDB under `config.data_dir`
    pub fn persistent(config: PaxosConfig) -> PaxfsResult<Self> {
        config
            .ensure_dirs()
            .map_err(|e| PaxfsError::Storage(e.to_string()))?;
        Self::build(config, true)
    }

    fn build(config: PaxosConfig, persistent: bool) -> PaxfsResult<Self> {
        if config.replica_count == 0 {
            return Err(PaxfsError::Config(
                "replica_count must be at least 1".to_string(),
            ));
        }

        let quorum = Arc::new(if persistent {
            LocalQuorum::open_persistent(&config)?
        } else {
            LocalQuorum::new(config.replica_count)
        });
        let mut nodes = Vec::with_capacity(config.replica_count);
        for replica_id in 0..config.replica_count as u64 {
            let consensus: Arc<dyn ConsensusClient> = quorum.clone();
            let node = if persistent {
                ReplicaNode::open_persistent(replica_id, config.clone(), consensus)?
            } else {
                ReplicaNode::open(
                    replica_id,
                    config.clone(),
                    consensus,
                    Arc::new(MemoryLogStore::new()),
                )?
            };
            nodes.push(node);
        }

        info!(
            replicas = config.replica_count,
            quorum = config.quorum_size(),
            persistent,
            "Replica group created"
        );
        Ok(Self {
            quorum,
            nodes,
            leader: RwLock::new(None),
        })
    }

    /// Start every replica's apply engine
    pub fn start(&self) {
        for node in &self.nodes {
            node.start();
        }
    }

    /// Transfer leadership to `replica_id`, deposing the previous leader first
    pub async fn elect(&self, replica_id: u64) -> PaxfsResult<Role> {
        let node = self.node(replica_id).ok_or_else(|| {
            PaxfsError::Config(format!("unknown replica {}", replica_id))
        })?;

        let previous = self.leader.write().replace(replica_id);
        if let Some(previous) = previous.filter(|id| *id != replica_id) {
            if let Some(old) = self.node(previous) {
                old.coordinator().on_deposed();
            }
        }

        let role = node.coordinator().on_elected().await?;
        info!(replica_id, role = %role, "Leadership assigned");
        Ok(role)
    }

    /// Depose the current leader without electing a new one
    pub fn depose(&self) -> Option<u64> {
        let previous = self.leader.write().take()?;
        if let Some(node) = self.node(previous) {
            node.coordinator().on_deposed();
        }
        Some(previous)
    }

    pub fn leader_id(&self) -> Option<u64> {
        *self.leader.read()
    }

    /// Coordinator of the designated leader, whether or not it has caught up
    pub fn leader(&self) -> Option<Arc<ReplicaCoordinator>> {
        self.leader_id()
            .and_then(|id| self.node(id))
            .map(|node| node.coordinator())
    }

    pub fn node(&self, replica_id: u64) -> Option<&ReplicaNode> {
        self.nodes.iter().find(|node| node.replica_id() == replica_id)
    }

    pub fn nodes(&self) -> &[ReplicaNode] {
        &self.nodes
    }

    pub fn statuses(&self) -> Vec<ReplicaStatus> {
        self.nodes
            .iter()
            .map(|node| node.coordinator().status())
            .collect()
    }

    pub fn quorum(&self) -> &Arc<LocalQuorum> {
        &self.quorum
    }

    pub fn set_acceptor_up(&self, index: usize, up: bool) -> PaxfsResult<()> {
        self.quorum.set_acceptor_up(index, up)
    }

    /// Stop every apply engine
    pub async fn shutdown(&self) {
        for node in &self.nodes {
            node.shutdown().await;
        }
    }
}
