// Apply engine
// The single serialization point of a replica: pulls committed entries from
// consensus into the local log and applies them in instance order

use std::sync::Arc;

use paxfs_common::PaxfsError;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::command::LogEntry;
use super::metrics;
use super::node::ReplicaContext;

/// Applied instances between sweeps of unclaimed outcomes
const PRUNE_INTERVAL: u64 = 64;

pub struct ApplyEngine {
    ctx: Arc<ReplicaContext>,
}

impl ApplyEngine {
    pub fn new(ctx: Arc<ReplicaContext>) -> Self {
        Self { ctx }
    }

    /// Restore the latest snapshot and replay the local log after it.
    ///
    /// Returns the last applied instance.
    pub fn recover(&self) -> Result<u64, PaxfsError> {
        let ctx = &self.ctx;
        if let Some(snapshot) = ctx.log.load_snapshot()? {
            let applied = snapshot.last_applied();
            let last_index = ctx.log.last_index();
            if applied > last_index {
                return Err(PaxfsError::Storage(format!(
                    "snapshot at instance {} is ahead of the log ({})",
                    applied, last_index
                )));
            }
            *ctx.namespace.write() = snapshot;
            ctx.state.advance_applied(applied);
            info!(
                replica_id = ctx.replica_id,
                applied, "Restored namespace snapshot"
            );
        }

        // no caller of this process is waiting on replayed instances
        let replayed = self.apply_log(false)?;
        let last_applied = ctx.state.last_applied();
        info!(
            replica_id = ctx.replica_id,
            replayed, last_applied, "Replica recovered"
        );
        Ok(last_applied)
    }

    /// Drive the engine until `shutdown` flips to `true` or a fatal error halts it
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let ctx = Arc::clone(&self.ctx);
        let mut commits = ctx.consensus.subscribe();
        info!(replica_id = ctx.replica_id, "Apply engine started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.step().await {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    warn!(replica_id = ctx.replica_id, error = %e, "Log sync deferred");
                }
                Err(e) => {
                    self.halt(&e);
                    break;
                }
            }

            tokio::select! {
                Ok(()) = commits.changed() => {}
                _ = ctx.wake.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(ctx.config.sync_interval()) => {}
            }
        }

        info!(replica_id = ctx.replica_id, "Apply engine stopped");
    }

    /// One round: sync the log from consensus, then apply everything unapplied
    pub async fn step(&self) -> Result<(), PaxfsError> {
        let synced = self.sync_log().await;
        // entries already appended are applied even if the sync stopped early
        self.apply_pending()?;
        metrics::set_pending_proposals(self.ctx.replica_id, self.ctx.clients.pending());
        synced.map(|_| ())
    }

    /// Append committed entries beyond the local log; returns how many were appended
    async fn sync_log(&self) -> Result<usize, PaxfsError> {
        let ctx = &self.ctx;
        let batch = ctx.config.fetch_batch_size.max(1);
        let mut appended = 0;

        loop {
            let from = ctx.log.last_index() + 1;
            let entries = ctx.consensus.fetch(from, batch).await?;
            if entries.is_empty() {
                break;
            }

            // a gap or duplicate fails here and is fatal
            ctx.log.append(&entries)?;
            appended += entries.len();
            if entries.len() < batch {
                break;
            }
        }

        if appended > 0 {
            debug!(
                replica_id = ctx.replica_id,
                appended,
                last_index = ctx.log.last_index(),
                "Synced committed entries"
            );
        }
        Ok(appended)
    }

    /// Apply every local entry beyond the last applied instance
    pub fn apply_pending(&self) -> Result<usize, PaxfsError> {
        self.apply_log(true)
    }

    /// Apply the unapplied tail of the local log; `hold_unclaimed` keeps
    /// outcomes of local proposals for callers that register late
    fn apply_log(&self, hold_unclaimed: bool) -> Result<usize, PaxfsError> {
        let ctx = &self.ctx;
        let batch = ctx.config.fetch_batch_size.max(1);
        let mut applied = 0;

        while ctx.state.last_applied() < ctx.log.last_index() {
            let entries = ctx.log.entries(ctx.state.last_applied() + 1, batch)?;
            if entries.is_empty() {
                return Err(PaxfsError::Storage(format!(
                    "log reports last index {} but has no entry after {}",
                    ctx.log.last_index(),
                    ctx.state.last_applied()
                )));
            }
            for entry in &entries {
                self.apply_entry(entry, hold_unclaimed)?;
                applied += 1;
            }
        }
        Ok(applied)
    }

    fn apply_entry(&self, entry: &LogEntry, hold_unclaimed: bool) -> Result<(), PaxfsError> {
        let ctx = &self.ctx;
        let instance = entry.instance;
        let expected = ctx.state.last_applied() + 1;
        if instance != expected {
            return Err(PaxfsError::Internal(format!(
                "log gap: expected instance {}, found {}",
                expected, instance
            )));
        }

        let outcome = ctx
            .namespace
            .write()
            .apply(instance, &entry.proposal.command)
            .map_err(|violation| PaxfsError::Internal(violation.to_string()))?;
        ctx.state.advance_applied(instance);
        metrics::record_applied(ctx.replica_id, instance);

        debug!(
            replica_id = ctx.replica_id,
            instance,
            proposal = %entry.proposal.id,
            op = entry.proposal.command.op_type(),
            outcome = outcome.label(),
            "Applied instance"
        );

        let local = entry.proposal.id.replica_id == ctx.replica_id;
        ctx.clients
            .resolve(instance, entry.proposal.id, outcome, hold_unclaimed && local);
        ctx.state.on_applied(instance);

        let threshold = ctx.config.snapshot_threshold;
        if threshold > 0 && instance % threshold == 0 {
            let snapshot = ctx.namespace.read().clone();
            ctx.log.save_snapshot(&snapshot)?;
            info!(replica_id = ctx.replica_id, instance, "Namespace snapshot saved");
        }

        if instance % PRUNE_INTERVAL == 0 && instance > ctx.config.unclaimed_window {
            ctx.clients
                .prune_unclaimed_below(instance - ctx.config.unclaimed_window);
        }
        Ok(())
    }

    /// Stop applying for good: step down and fail every waiting caller
    fn halt(&self, cause: &PaxfsError) {
        let ctx = &self.ctx;
        error!(
            replica_id = ctx.replica_id,
            last_applied = ctx.state.last_applied(),
            error = %cause,
            "Fatal apply error, halting replica"
        );
        ctx.state.halt();
        let aborted = ctx.clients.abort_all(PaxfsError::Internal(format!(
            "replica {} halted: {}",
            ctx.replica_id, cause
        )));
        if aborted > 0 {
            warn!(replica_id = ctx.replica_id, aborted, "Aborted pending proposals");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paxos::command::{CommandOutcome, PaxosCommand, Proposal, ProposalId};
    use crate::paxos::config::PaxosConfig;
    use crate::paxos::consensus::{ConsensusClient, LocalQuorum};
    use crate::paxos::log_store::{LogStore, MemoryLogStore};

    fn proposal_id(replica_id: u64, sequence: u64) -> ProposalId {
        ProposalId {
            replica_id,
            sequence,
        }
    }

    fn proposal(replica_id: u64, sequence: u64, command: PaxosCommand) -> Proposal {
        Proposal {
            id: proposal_id(replica_id, sequence),
            command,
        }
    }

    fn create(path: &str, is_dir: bool) -> PaxosCommand {
        PaxosCommand::Create {
            path: path.to_string(),
            is_dir,
        }
    }

    fn context(
        quorum: Arc<LocalQuorum>,
        log: Arc<dyn LogStore>,
        config: PaxosConfig,
    ) -> Arc<ReplicaContext> {
        Arc::new(ReplicaContext::new(0, config, quorum, log))
    }

    #[tokio::test]
    async fn test_step_applies_committed_entries() {
        let quorum = Arc::new(LocalQuorum::new(3));
        quorum.agree(proposal(1, 1, create("/a", true))).await.unwrap();
        quorum.agree(proposal(1, 2, create("/a/b", false))).await.unwrap();

        let log: Arc<dyn LogStore> = Arc::new(MemoryLogStore::new());
        let ctx = context(quorum, Arc::clone(&log), PaxosConfig::default());
        let engine = ApplyEngine::new(Arc::clone(&ctx));

        engine.step().await.unwrap();
        assert_eq!(ctx.state.last_applied(), 2);
        assert_eq!(log.last_index(), 2);
        assert_eq!(ctx.namespace.read().get("/a/b").unwrap().instance_number, 2);
    }

    #[tokio::test]
    async fn test_local_outcome_held_for_late_waiter() {
        let quorum = Arc::new(LocalQuorum::new(1));
        quorum.agree(proposal(0, 1, create("/a", true))).await.unwrap();
        quorum.agree(proposal(7, 1, create("/b", true))).await.unwrap();

        let ctx = context(
            quorum,
            Arc::new(MemoryLogStore::new()),
            PaxosConfig::default(),
        );
        ApplyEngine::new(Arc::clone(&ctx)).step().await.unwrap();

        let mut local = ctx.clients.register(1, proposal_id(0, 1));
        assert_eq!(
            local.try_recv().unwrap(),
            Ok(CommandOutcome::Applied { instance: 1 })
        );
        let mut remote = ctx.clients.register(2, proposal_id(7, 1));
        assert!(remote.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_snapshot_every_threshold() {
        let quorum = Arc::new(LocalQuorum::new(1));
        for (seq, path) in ["/a", "/b", "/c"].iter().enumerate() {
            quorum
                .agree(proposal(0, seq as u64 + 1, create(path, false)))
                .await
                .unwrap();
        }

        let log: Arc<dyn LogStore> = Arc::new(MemoryLogStore::new());
        let config = PaxosConfig {
            snapshot_threshold: 2,
            ..PaxosConfig::default()
        };
        let ctx = context(quorum, Arc::clone(&log), config);
        ApplyEngine::new(ctx).step().await.unwrap();

        let snapshot = log.load_snapshot().unwrap().unwrap();
        assert_eq!(snapshot.last_applied(), 2);
        assert!(snapshot.get("/b").is_some());
        assert!(snapshot.get("/c").is_none());
    }

    #[tokio::test]
    async fn test_recover_from_snapshot_and_log() {
        let quorum = Arc::new(LocalQuorum::new(1));
        for (seq, path) in ["/a", "/b", "/c"].iter().enumerate() {
            quorum
                .agree(proposal(0, seq as u64 + 1, create(path, false)))
                .await
                .unwrap();
        }
        let log: Arc<dyn LogStore> = Arc::new(MemoryLogStore::new());
        let config = PaxosConfig {
            snapshot_threshold: 2,
            ..PaxosConfig::default()
        };
        let first = context(Arc::clone(&quorum), Arc::clone(&log), config.clone());
        ApplyEngine::new(Arc::clone(&first)).step().await.unwrap();

        assert_eq!(first.clients.unclaimed(), 3);

        let second = context(quorum, Arc::clone(&log), config);
        let applied = ApplyEngine::new(Arc::clone(&second)).recover().unwrap();
        assert_eq!(applied, 3);
        assert_eq!(*second.namespace.read(), *first.namespace.read());

        // replayed outcomes belong to the previous run and are not held
        assert_eq!(second.clients.unclaimed(), 0);
        let mut late = second.clients.register(1, proposal_id(0, 1));
        assert!(late.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invariant_violation_halts() {
        let quorum = Arc::new(LocalQuorum::new(1));
        let log: Arc<dyn LogStore> = Arc::new(MemoryLogStore::new());
        let ctx = context(Arc::clone(&quorum), log, PaxosConfig::default());

        // state already past the log: the next entry is a duplicate
        ctx.namespace
            .write()
            .apply(1, &PaxosCommand::Noop)
            .unwrap();
        quorum.agree(proposal(0, 1, PaxosCommand::Noop)).await.unwrap();

        ctx.state.begin_catch_up(0);
        let waiter = ctx.clients.register(9, proposal_id(0, 9));

        let (_tx, rx) = watch::channel(false);
        ApplyEngine::new(Arc::clone(&ctx)).run(rx).await;

        assert!(ctx.state.is_halted());
        assert!(!ctx.state.is_leader_and_initialized());
        assert!(matches!(waiter.await.unwrap(), Err(PaxfsError::Internal(_))));
    }

    #[tokio::test]
    async fn test_no_quorum_is_transient() {
        let quorum = Arc::new(LocalQuorum::new(3));
        quorum.agree(proposal(1, 1, create("/a", true))).await.unwrap();
        quorum.set_acceptor_up(0, false).unwrap();
        quorum.set_acceptor_up(1, false).unwrap();

        let ctx = context(
            Arc::clone(&quorum),
            Arc::new(MemoryLogStore::new()),
            PaxosConfig::default(),
        );
        let engine = ApplyEngine::new(Arc::clone(&ctx));
        assert_eq!(engine.step().await, Err(PaxfsError::NoQuorum));
        assert!(!ctx.state.is_halted());

        quorum.set_acceptor_up(0, true).unwrap();
        engine.step().await.unwrap();
        assert_eq!(ctx.state.last_applied(), 1);
    }
}
