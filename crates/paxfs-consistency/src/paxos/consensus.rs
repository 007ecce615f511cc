//! Consensus primitive
//!
//! `ConsensusClient` is the agreement service the replicas sit on: it assigns
//! each proposal a gap-free log instance agreed by a quorum of acceptors.
//! `LocalQuorum` is an in-process implementation over `n` acceptors that can
//! individually be taken down and brought back, which is enough to exercise
//! quorum loss, leader changes and catch-up inside one process. Each acceptor
//! keeps its votes in a `LogStore`, so a RocksDB-backed quorum resumes its
//! numbering after a restart.

use std::sync::Arc;

use async_trait::async_trait;
use paxfs_common::PaxfsError;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::command::{LogEntry, Proposal};
use super::config::PaxosConfig;
use super::log_store::{LogStore, MemoryLogStore, RocksLogStore};

/// Agreement on the committed log
#[async_trait]
pub trait ConsensusClient: Send + Sync {
    /// Agree on `proposal` at the next free instance and return the chosen entry.
    ///
    /// The chosen value at the returned instance may belong to another proposer
    /// if it won the slot; callers compare proposal ids.
    async fn agree(&self, proposal: Proposal) -> Result<LogEntry, PaxfsError>;

    /// Highest committed instance, 0 when nothing is committed
    async fn highest_committed(&self) -> Result<u64, PaxfsError>;

    /// Up to `limit` committed entries starting at instance `from`
    async fn fetch(&self, from: u64, limit: usize) -> Result<Vec<LogEntry>, PaxfsError>;

    /// Commit frontier notifications
    fn subscribe(&self) -> watch::Receiver<u64>;
}

struct Acceptor {
    up: bool,
    /// Chosen values in instance order
    votes: Arc<dyn LogStore>,
}

impl Acceptor {
    fn len(&self) -> u64 {
        self.votes.last_index()
    }
}

struct Acceptors {
    members: Vec<Acceptor>,
}

impl Acceptors {
    fn quorum(&self) -> usize {
        self.members.len() / 2 + 1
    }

    fn live(&self) -> usize {
        self.members.iter().filter(|a| a.up).count()
    }

    fn ensure_quorum(&self) -> Result<(), PaxfsError> {
        if self.live() < self.quorum() {
            return Err(PaxfsError::NoQuorum);
        }
        Ok(())
    }

    /// Index of the live acceptor holding the longest vote log
    fn freshest(&self) -> Option<usize> {
        self.members
            .iter()
            .enumerate()
            .filter(|(_, a)| a.up)
            .max_by_key(|(_, a)| a.len())
            .map(|(idx, _)| idx)
    }

    /// Bring every live acceptor up to the freshest live one; returns its length
    fn catch_up(&mut self) -> Result<u64, PaxfsError> {
        let Some(source) = self.freshest() else {
            return Ok(0);
        };
        let chosen = Arc::clone(&self.members[source].votes);
        let target = chosen.last_index();
        for acceptor in self.members.iter_mut().filter(|a| a.up) {
            let len = acceptor.len();
            if len < target {
                let missing = chosen.entries(len + 1, (target - len) as usize)?;
                acceptor.votes.append(&missing)?;
            }
        }
        Ok(target)
    }
}

/// In-process majority quorum of acceptors
pub struct LocalQuorum {
    acceptors: Mutex<Acceptors>,
    committed: watch::Sender<u64>,
}

impl LocalQuorum {
    /// Group of `size` acceptors with in-memory vote logs, all up
    pub fn new(size: usize) -> Self {
        let stores = (0..size)
            .map(|_| Arc::new(MemoryLogStore::new()) as Arc<dyn LogStore>)
            .collect();
        Self::with_stores(stores)
    }

    /// Acceptors over existing vote logs, all up.
    ///
    /// The commit frontier resumes at the longest stored log.
    pub fn with_stores(stores: Vec<Arc<dyn LogStore>>) -> Self {
        let frontier = stores.iter().map(|s| s.last_index()).max().unwrap_or(0);
        let members = stores
            .into_iter()
            .map(|votes| Acceptor { up: true, votes })
            .collect();
        let (committed, _) = watch::channel(frontier);
        Self {
            acceptors: Mutex::new(Acceptors { members }),
            committed,
        }
    }

    /// Acceptors whose votes are kept in RocksDB under `config.acceptor_dir`
    pub fn open_persistent(config: &PaxosConfig) -> Result<Self, PaxfsError> {
        let mut stores: Vec<Arc<dyn LogStore>> = Vec::with_capacity(config.replica_count);
        for index in 0..config.replica_count {
            let dir = config.acceptor_dir(index);
            std::fs::create_dir_all(&dir).map_err(|e| PaxfsError::Storage(e.to_string()))?;
            stores.push(Arc::new(RocksLogStore::open(&dir)?));
        }
        let quorum = Self::with_stores(stores);
        info!(
            acceptors = config.replica_count,
            committed = *quorum.committed.borrow(),
            "Opened acceptor vote logs"
        );
        Ok(quorum)
    }

    pub fn size(&self) -> usize {
        self.acceptors.lock().members.len()
    }

    pub fn live_acceptors(&self) -> usize {
        self.acceptors.lock().live()
    }

    /// Mark an acceptor up or down; a returning acceptor catches up before voting
    pub fn set_acceptor_up(&self, index: usize, up: bool) -> Result<(), PaxfsError> {
        let mut acceptors = self.acceptors.lock();
        let size = acceptors.members.len();
        let acceptor = acceptors.members.get_mut(index).ok_or_else(|| {
            PaxfsError::Config(format!("acceptor {} out of range (group of {})", index, size))
        })?;
        if acceptor.up == up {
            return Ok(());
        }
        acceptor.up = up;
        if up {
            acceptors.catch_up()?;
        }
        info!(
            acceptor = index,
            up,
            live = acceptors.live(),
            quorum = acceptors.quorum(),
            "Acceptor state changed"
        );
        Ok(())
    }
}

#[async_trait]
impl ConsensusClient for LocalQuorum {
    async fn agree(&self, proposal: Proposal) -> Result<LogEntry, PaxfsError> {
        let entry = {
            let mut acceptors = self.acceptors.lock();
            if let Err(e) = acceptors.ensure_quorum() {
                warn!(
                    proposal = %proposal.id,
                    live = acceptors.live(),
                    "Proposal rejected, no quorum of acceptors"
                );
                return Err(e);
            }
            let entry = LogEntry {
                instance: acceptors.catch_up()? + 1,
                proposal,
            };
            for acceptor in acceptors.members.iter().filter(|a| a.up) {
                acceptor.votes.append(std::slice::from_ref(&entry))?;
            }
            entry
        };

        debug!(
            instance = entry.instance,
            proposal = %entry.proposal.id,
            op = entry.proposal.command.op_type(),
            "Value chosen"
        );
        self.committed.send_replace(entry.instance);
        Ok(entry)
    }

    async fn highest_committed(&self) -> Result<u64, PaxfsError> {
        let mut acceptors = self.acceptors.lock();
        acceptors.ensure_quorum()?;
        acceptors.catch_up()
    }

    async fn fetch(&self, from: u64, limit: usize) -> Result<Vec<LogEntry>, PaxfsError> {
        let mut acceptors = self.acceptors.lock();
        acceptors.ensure_quorum()?;
        acceptors.catch_up()?;
        let Some(source) = acceptors.freshest() else {
            return Ok(Vec::new());
        };
        acceptors.members[source].votes.entries(from.max(1), limit)
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.committed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paxos::command::{PaxosCommand, ProposalId};

    fn proposal(replica_id: u64, sequence: u64) -> Proposal {
        Proposal {
            id: ProposalId {
                replica_id,
                sequence,
            },
            command: PaxosCommand::Noop,
        }
    }

    #[tokio::test]
    async fn test_agree_assigns_gap_free_instances() {
        let quorum = LocalQuorum::new(3);
        let mut rx = quorum.subscribe();

        let first = quorum.agree(proposal(0, 1)).await.unwrap();
        let second = quorum.agree(proposal(1, 1)).await.unwrap();
        assert_eq!(first.instance, 1);
        assert_eq!(second.instance, 2);
        assert_eq!(second.proposal.id.replica_id, 1);

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 2);
        assert_eq!(quorum.highest_committed().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_no_quorum_without_majority() {
        let quorum = LocalQuorum::new(3);
        quorum.set_acceptor_up(0, false).unwrap();
        assert!(quorum.agree(proposal(0, 1)).await.is_ok());

        quorum.set_acceptor_up(1, false).unwrap();
        assert_eq!(quorum.live_acceptors(), 1);
        assert_eq!(
            quorum.agree(proposal(0, 2)).await,
            Err(PaxfsError::NoQuorum)
        );
        assert_eq!(quorum.highest_committed().await, Err(PaxfsError::NoQuorum));
        assert_eq!(quorum.fetch(1, 10).await, Err(PaxfsError::NoQuorum));
    }

    #[tokio::test]
    async fn test_returning_acceptor_catches_up() {
        let quorum = LocalQuorum::new(3);
        quorum.set_acceptor_up(2, false).unwrap();
        quorum.agree(proposal(0, 1)).await.unwrap();
        quorum.agree(proposal(0, 2)).await.unwrap();

        // the two voters go down, the stale one returns with a fresh peer
        quorum.set_acceptor_up(2, true).unwrap();
        quorum.set_acceptor_up(0, false).unwrap();
        let entry = quorum.agree(proposal(1, 1)).await.unwrap();
        assert_eq!(entry.instance, 3);

        let log = quorum.fetch(1, 10).await.unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].proposal, proposal(0, 1));
        assert_eq!(log[2].proposal, proposal(1, 1));
    }

    #[tokio::test]
    async fn test_fetch_window() {
        let quorum = LocalQuorum::new(1);
        for seq in 1..=5 {
            quorum.agree(proposal(0, seq)).await.unwrap();
        }
        let window = quorum.fetch(2, 2).await.unwrap();
        assert_eq!(
            window.iter().map(|e| e.instance).collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert!(quorum.fetch(6, 10).await.unwrap().is_empty());
    }

    #[test]
    fn test_acceptor_out_of_range() {
        let quorum = LocalQuorum::new(3);
        assert!(matches!(
            quorum.set_acceptor_up(3, false),
            Err(PaxfsError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_quorum_resumes_from_stored_votes() {
        let stores: Vec<Arc<dyn LogStore>> = (0..3)
            .map(|_| Arc::new(MemoryLogStore::new()) as Arc<dyn LogStore>)
            .collect();
        {
            let quorum = LocalQuorum::with_stores(stores.clone());
            quorum.agree(proposal(0, 1)).await.unwrap();
            quorum.agree(proposal(0, 2)).await.unwrap();
        }

        let quorum = LocalQuorum::with_stores(stores);
        assert_eq!(*quorum.subscribe().borrow(), 2);
        assert_eq!(quorum.highest_committed().await.unwrap(), 2);
        let entry = quorum.agree(proposal(0, 1)).await.unwrap();
        assert_eq!(entry.instance, 3);
        assert_eq!(quorum.fetch(1, 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_persistent_votes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = PaxosConfig::new(3, 0, dir.path().to_path_buf());
        {
            let quorum = LocalQuorum::open_persistent(&config).unwrap();
            quorum.set_acceptor_up(2, false).unwrap();
            quorum.agree(proposal(0, 1)).await.unwrap();
            quorum.agree(proposal(1, 1)).await.unwrap();
        }

        // acceptor 2 missed both votes and is brought level on first use
        let quorum = LocalQuorum::open_persistent(&config).unwrap();
        assert_eq!(quorum.highest_committed().await.unwrap(), 2);
        let entry = quorum.agree(proposal(0, 2)).await.unwrap();
        assert_eq!(entry.instance, 3);

        let log = quorum.fetch(1, 10).await.unwrap();
        assert_eq!(log[1].proposal, proposal(1, 1));
        assert_eq!(log[2].proposal, proposal(0, 2));
    }
}
