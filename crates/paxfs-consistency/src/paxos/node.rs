// Replica node
// Wires storage, consensus, the apply engine and the coordinator of one replica

use std::sync::Arc;

use paxfs_common::PaxfsError;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::client_set::ReplicaClientSet;
use super::config::PaxosConfig;
use super::consensus::ConsensusClient;
use super::coordinator::ReplicaCoordinator;
use super::engine::ApplyEngine;
use super::log_store::{LogStore, RocksLogStore};
use super::replica_state::ReplicaState;
use crate::namespace::NamespaceState;

/// State shared by the apply engine and the coordinator of one replica
pub struct ReplicaContext {
    pub replica_id: u64,
    pub config: PaxosConfig,
    pub consensus: Arc<dyn ConsensusClient>,
    pub log: Arc<dyn LogStore>,
    /// Written only by the apply engine, one instance at a time
    pub namespace: RwLock<NamespaceState>,
    pub state: ReplicaState,
    pub clients: ReplicaClientSet,
    /// Wakes the apply engine ahead of its next poll
    pub wake: Notify,
}

impl ReplicaContext {
    pub fn new(
        replica_id: u64,
        config: PaxosConfig,
        consensus: Arc<dyn ConsensusClient>,
        log: Arc<dyn LogStore>,
    ) -> Self {
        Self {
            replica_id,
            config,
            consensus,
            log,
            namespace: RwLock::new(NamespaceState::new()),
            state: ReplicaState::new(replica_id),
            clients: ReplicaClientSet::new(),
            wake: Notify::new(),
        }
    }
}

/// One replica: recovered state, a coordinator, and an apply engine task
pub struct ReplicaNode {
    ctx: Arc<ReplicaContext>,
    coordinator: Arc<ReplicaCoordinator>,
    shutdown: watch::Sender<bool>,
    engine: Mutex<Option<ApplyEngine>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReplicaNode {
    /// Open a replica over `log`, restoring its namespace from snapshot and replay.
    ///
    /// The apply engine is not running until `start` is called.
    pub fn open(
        replica_id: u64,
        config: PaxosConfig,
        consensus: Arc<dyn ConsensusClient>,
        log: Arc<dyn LogStore>,
    ) -> Result<Self, PaxfsError> {
        let ctx = Arc::new(ReplicaContext::new(replica_id, config, consensus, log));
        let engine = ApplyEngine::new(Arc::clone(&ctx));
        engine.recover()?;

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            coordinator: Arc::new(ReplicaCoordinator::new(Arc::clone(&ctx))),
            ctx,
            shutdown,
            engine: Mutex::new(Some(engine)),
            handle: Mutex::new(None),
        })
    }

    /// Open a replica backed by RocksDB under `config.replica_dir(replica_id)`
    pub fn open_persistent(
        replica_id: u64,
        config: PaxosConfig,
        consensus: Arc<dyn ConsensusClient>,
    ) -> Result<Self, PaxfsError> {
        let dir = config.replica_dir(replica_id);
        std::fs::create_dir_all(&dir).map_err(|e| PaxfsError::Storage(e.to_string()))?;
        let log = Arc::new(RocksLogStore::open(&dir)?);
        info!(replica_id, dir = %dir.display(), "Opened replica storage");
        Self::open(replica_id, config, consensus, log)
    }

    /// Spawn the apply engine; returns `false` if it was already started
    pub fn start(&self) -> bool {
        let Some(engine) = self.engine.lock().take() else {
            return false;
        };
        let handle = tokio::spawn(engine.run(self.shutdown.subscribe()));
        *self.handle.lock() = Some(handle);
        true
    }

    /// Stop the apply engine and wait for it to exit
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(replica_id = self.ctx.replica_id, error = %e, "Apply engine task failed");
            }
        }
    }

    pub fn replica_id(&self) -> u64 {
        self.ctx.replica_id
    }

    pub fn coordinator(&self) -> Arc<ReplicaCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Copy of the locally applied namespace
    pub fn namespace(&self) -> NamespaceState {
        self.ctx.namespace.read().clone()
    }

    pub fn last_applied(&self) -> u64 {
        self.ctx.state.last_applied()
    }

    /// Wait until at least `instance` is applied; `false` on timeout
    pub async fn wait_applied(&self, instance: u64, timeout: std::time::Duration) -> bool {
        let mut applied = self.ctx.state.subscribe_applied();
        tokio::time::timeout(timeout, applied.wait_for(|current| *current >= instance))
            .await
            .is_ok_and(|result| result.is_ok())
    }
}

impl Drop for ReplicaNode {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
