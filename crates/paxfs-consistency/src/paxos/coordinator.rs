//! Replica coordinator
//!
//! Serves the `NamespaceService` contract on one replica. Mutations are
//! prechecked against local state, agreed through consensus, and answered once
//! the apply engine has applied their instance. Reads are served from locally
//! applied state on the initialized leader only.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use paxfs_common::{PaxfsError, PaxfsResult, validate_path};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::command::{CommandOutcome, LogEntry, PaxosCommand, Proposal, ProposalId};
use super::metrics;
use super::node::ReplicaContext;
use super::replica_state::Role;
use crate::namespace::{LockHolder, NamespaceService, NodeMeta};

/// Point-in-time view of a replica
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaStatus {
    pub replica_id: u64,
    #[serde(flatten)]
    pub role: Role,
    pub leader_and_initialized: bool,
    pub last_applied: u64,
    pub log_length: u64,
    pub halted: bool,
    pub pending_proposals: usize,
}

fn error_label(error: &PaxfsError) -> &'static str {
    match error {
        PaxfsError::NotLeader => "not_leader",
        PaxfsError::NoQuorum => "no_quorum",
        PaxfsError::Timeout { .. } => "timeout",
        PaxfsError::Storage(_) | PaxfsError::Config(_) | PaxfsError::Internal(_) => "error",
        _ => "rejected",
    }
}

fn unexpected(command: &str, outcome: CommandOutcome) -> PaxfsError {
    PaxfsError::Internal(format!("unexpected outcome {:?} for {}", outcome, command))
}

pub struct ReplicaCoordinator {
    ctx: Arc<ReplicaContext>,
    sequence: AtomicU64,
}

impl ReplicaCoordinator {
    pub fn new(ctx: Arc<ReplicaContext>) -> Self {
        Self {
            ctx,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn replica_id(&self) -> u64 {
        self.ctx.replica_id
    }

    /// Elected by the external leadership signal: catch up to the commit
    /// frontier, then serve.
    pub async fn on_elected(&self) -> PaxfsResult<Role> {
        if self.ctx.state.is_halted() {
            return Err(PaxfsError::Internal(format!(
                "replica {} is halted",
                self.ctx.replica_id
            )));
        }
        let target = self.ctx.consensus.highest_committed().await?;
        let role = self.ctx.state.begin_catch_up(target);
        self.ctx.wake.notify_one();
        Ok(role)
    }

    /// Leadership lost: stop serving and fail every waiting caller with `NotLeader`
    pub fn on_deposed(&self) -> usize {
        let changed = self.ctx.state.step_down();
        let aborted = self.ctx.clients.abort_all(PaxfsError::NotLeader);
        if changed || aborted > 0 {
            info!(
                replica_id = self.ctx.replica_id,
                aborted, "Replica deposed"
            );
        }
        aborted
    }

    pub fn status(&self) -> ReplicaStatus {
        let state = &self.ctx.state;
        ReplicaStatus {
            replica_id: self.ctx.replica_id,
            role: state.role(),
            leader_and_initialized: state.is_leader_and_initialized(),
            last_applied: state.last_applied(),
            log_length: self.ctx.log.last_index(),
            halted: state.is_halted(),
            pending_proposals: self.ctx.clients.pending(),
        }
    }

    fn ensure_leader(&self) -> PaxfsResult<()> {
        if self.ctx.state.is_leader_and_initialized() {
            Ok(())
        } else {
            Err(PaxfsError::NotLeader)
        }
    }

    /// Submit `command` and wait for its applied outcome
    async fn execute(&self, command: PaxosCommand) -> PaxfsResult<CommandOutcome> {
        let result = self.submit(command).await;
        metrics::record_proposal(match &result {
            Ok(outcome) => outcome.label(),
            Err(e) => error_label(e),
        });
        result
    }

    async fn submit(&self, command: PaxosCommand) -> PaxfsResult<CommandOutcome> {
        self.ensure_leader()?;
        if let Some(path) = command.path() {
            validate_path(path)?;
        }

        let precheck = self.ctx.namespace.read().precheck(&command);
        if let Some(outcome) = precheck {
            debug!(
                replica_id = self.ctx.replica_id,
                op = command.op_type(),
                outcome = outcome.label(),
                "Decided without consensus"
            );
            return Ok(outcome);
        }

        let proposal = Proposal {
            id: ProposalId {
                replica_id: self.ctx.replica_id,
                sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            },
            command,
        };
        let id = proposal.id;
        let instance = self.propose(proposal).await?;

        let mut rx = self.ctx.clients.register(instance, id);
        self.ctx.wake.notify_one();

        // leadership may have been lost before the waiter existed
        if !self.ctx.state.is_leader_and_initialized() {
            return match rx.try_recv() {
                Ok(resolution) => resolution,
                Err(_) => {
                    self.ctx.clients.abandon(instance);
                    Err(PaxfsError::NotLeader)
                }
            };
        }

        match tokio::time::timeout(self.ctx.config.proposal_timeout(), rx).await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(_)) => Err(PaxfsError::Internal(format!(
                "waiter for instance {} dropped",
                instance
            ))),
            Err(_) => {
                self.ctx.clients.abandon(instance);
                warn!(
                    replica_id = self.ctx.replica_id,
                    instance, "Timed out waiting for apply"
                );
                Err(PaxfsError::Timeout { instance })
            }
        }
    }

    /// A chosen instance the local log already holds must carry the same proposal.
    ///
    /// A mismatch means consensus handed out an instance this replica has
    /// already applied for something else, so the outcome would be wrong.
    fn check_local_slot(&self, entry: &LogEntry) -> PaxfsResult<()> {
        if entry.instance > self.ctx.log.last_index() {
            return Ok(());
        }
        let local = self.ctx.log.entries(entry.instance, 1)?;
        match local.first() {
            Some(local)
                if local.instance == entry.instance && local.proposal.id == entry.proposal.id =>
            {
                Ok(())
            }
            other => {
                error!(
                    replica_id = self.ctx.replica_id,
                    instance = entry.instance,
                    chosen = %entry.proposal.id,
                    local = ?other.map(|e| e.proposal.id),
                    "Consensus chose an instance already taken in the local log"
                );
                Err(PaxfsError::Internal(format!(
                    "instance {} is already taken in the local log",
                    entry.instance
                )))
            }
        }
    }

    /// Agree on `proposal`, re-proposing while other proposals win our slot
    async fn propose(&self, proposal: Proposal) -> PaxfsResult<u64> {
        let attempts = self.ctx.config.max_proposal_attempts.max(1);
        for attempt in 1..=attempts {
            let entry = self.ctx.consensus.agree(proposal.clone()).await?;
            if entry.proposal.id == proposal.id {
                self.check_local_slot(&entry)?;
                return Ok(entry.instance);
            }

            debug!(
                replica_id = self.ctx.replica_id,
                instance = entry.instance,
                ours = %proposal.id,
                winner = %entry.proposal.id,
                attempt,
                "Slot taken by another proposal"
            );
            self.ctx.wake.notify_one();
            self.ensure_leader()?;
        }

        warn!(
            replica_id = self.ctx.replica_id,
            proposal = %proposal.id,
            attempts, "Proposal kept losing its slot"
        );
        Err(PaxfsError::NoQuorum)
    }
}

#[async_trait]
impl NamespaceService for ReplicaCoordinator {
    async fn check_and_create(&self, path: &str, is_dir: bool) -> PaxfsResult<u64> {
        let command = PaxosCommand::Create {
            path: path.to_string(),
            is_dir,
        };
        match self.execute(command).await? {
            CommandOutcome::Applied { instance } => Ok(instance),
            CommandOutcome::Rejected(reason) => Err(reason.into_error(path)),
            other => Err(unexpected("create", other)),
        }
    }

    async fn check_and_open(&self, path: &str) -> PaxfsResult<u64> {
        self.ensure_leader()?;
        self.ctx
            .namespace
            .read()
            .open(path)
            .map_err(|reason| reason.into_error(path))
    }

    async fn check_and_delete(&self, path: &str, instance_number: u64) -> PaxfsResult<()> {
        let command = PaxosCommand::Delete {
            path: path.to_string(),
            expected_instance: instance_number,
        };
        match self.execute(command).await? {
            CommandOutcome::Applied { .. } => Ok(()),
            CommandOutcome::Rejected(reason) => Err(reason.into_error(path)),
            other => Err(unexpected("delete", other)),
        }
    }

    async fn check_and_read(
        &self,
        path: &str,
        instance_number: u64,
    ) -> PaxfsResult<(Vec<u8>, NodeMeta)> {
        self.ensure_leader()?;
        self.ctx
            .namespace
            .read()
            .read(path, instance_number)
            .map_err(|reason| reason.into_error(path))
    }

    async fn check_and_update(
        &self,
        path: &str,
        instance_number: u64,
        content: Vec<u8>,
    ) -> PaxfsResult<u64> {
        let command = PaxosCommand::Update {
            path: path.to_string(),
            expected_instance: instance_number,
            content,
        };
        match self.execute(command).await? {
            CommandOutcome::Applied { instance } => Ok(instance),
            CommandOutcome::Rejected(reason) => Err(reason.into_error(path)),
            other => Err(unexpected("update", other)),
        }
    }

    async fn test_and_set_lock_owner(
        &self,
        path: &str,
        instance_number: u64,
        client_id: &str,
    ) -> PaxfsResult<bool> {
        let command = PaxosCommand::AcquireLock {
            path: path.to_string(),
            expected_instance: instance_number,
            client_id: client_id.to_string(),
        };
        match self.execute(command).await? {
            CommandOutcome::Applied { .. } => Ok(true),
            CommandOutcome::LockHeld { owner } => {
                debug!(path, client_id, owner, "Lock held by another client");
                Ok(false)
            }
            CommandOutcome::Rejected(reason) => Err(reason.into_error(path)),
            other => Err(unexpected("acquire lock", other)),
        }
    }

    async fn reset_lock_owner(&self, path: &str, instance_number: u64) -> PaxfsResult<bool> {
        let previous = self
            .ctx
            .namespace
            .read()
            .get(path)
            .and_then(|node| node.lock_owner.clone());
        let command = PaxosCommand::ReleaseLock {
            path: path.to_string(),
            expected_instance: instance_number,
        };
        match self.execute(command).await? {
            CommandOutcome::Applied { .. } => {
                info!(path, previous_owner = ?previous, "Lock reset");
                Ok(true)
            }
            CommandOutcome::LockNotHeld => Ok(false),
            CommandOutcome::Rejected(reason) => Err(reason.into_error(path)),
            other => Err(unexpected("release lock", other)),
        }
    }

    async fn get_states(&self) -> PaxfsResult<Vec<LockHolder>> {
        Ok(self.ctx.namespace.read().lock_holders())
    }

    fn is_leader_and_initialized(&self) -> bool {
        self.ctx.state.is_leader_and_initialized()
    }
}
