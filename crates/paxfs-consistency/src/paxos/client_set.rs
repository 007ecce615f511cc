// Client waiter registry
// Links in-flight instance numbers to the callers awaiting their outcome

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use paxfs_common::PaxfsError;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::command::{CommandOutcome, ProposalId};

/// What a waiting caller eventually receives
pub type Resolution = Result<CommandOutcome, PaxfsError>;

enum Slot {
    /// The proposer of `id` is waiting for this instance
    Waiting {
        id: ProposalId,
        tx: oneshot::Sender<Resolution>,
    },
    /// Applied before its proposer registered; held until claimed or pruned
    Resolved {
        id: ProposalId,
        outcome: CommandOutcome,
    },
}

fn displaced(instance: u64, expected: ProposalId, applied: ProposalId) -> PaxfsError {
    PaxfsError::Internal(format!(
        "instance {} applied proposal {} instead of {}",
        instance, applied, expected
    ))
}

/// Registry of pending proposals keyed by log instance
///
/// Every slot is resolved at most once: by the apply engine, by the caller
/// abandoning it, or by `abort_all` on loss of leadership. Outcomes only
/// reach the proposal that was applied at the instance.
#[derive(Default)]
pub struct ReplicaClientSet {
    slots: DashMap<u64, Slot>,
}

impl ReplicaClientSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register proposal `id`, chosen at `instance`, for its outcome.
    ///
    /// If the instance was already applied and its outcome held, the returned
    /// receiver is ready immediately.
    pub fn register(&self, instance: u64, id: ProposalId) -> oneshot::Receiver<Resolution> {
        let (tx, rx) = oneshot::channel();
        match self.slots.entry(instance) {
            Entry::Occupied(mut entry) => {
                if matches!(entry.get(), Slot::Resolved { .. }) {
                    if let Slot::Resolved {
                        id: applied,
                        outcome,
                    } = entry.remove()
                    {
                        let resolution = if applied == id {
                            Ok(outcome)
                        } else {
                            Err(displaced(instance, id, applied))
                        };
                        let _ = tx.send(resolution);
                    }
                } else {
                    debug!(instance, proposal = %id, "Replacing existing waiter");
                    entry.insert(Slot::Waiting { id, tx });
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Slot::Waiting { id, tx });
            }
        }
        rx
    }

    /// Deliver the outcome of proposal `id`, applied at `instance`, to its waiter.
    ///
    /// Returns `true` if the waiter received it. With no waiter the outcome is
    /// dropped, unless `keep_unclaimed` is set (locally originated entries
    /// applied by a running engine), in which case it is held for a late
    /// `register`.
    pub fn resolve(
        &self,
        instance: u64,
        id: ProposalId,
        outcome: CommandOutcome,
        keep_unclaimed: bool,
    ) -> bool {
        match self.slots.entry(instance) {
            Entry::Occupied(entry) => match entry.remove() {
                Slot::Waiting { id: waiting, tx } if waiting == id => {
                    tx.send(Ok(outcome)).is_ok()
                }
                Slot::Waiting { id: waiting, tx } => {
                    warn!(
                        instance,
                        waiting = %waiting,
                        applied = %id,
                        "Waiter displaced by another proposal"
                    );
                    let _ = tx.send(Err(displaced(instance, waiting, id)));
                    false
                }
                Slot::Resolved { .. } => false,
            },
            Entry::Vacant(entry) => {
                if keep_unclaimed {
                    entry.insert(Slot::Resolved { id, outcome });
                }
                false
            }
        }
    }

    /// Detach the waiter for `instance`; the command itself is unaffected
    pub fn abandon(&self, instance: u64) {
        self.slots.remove(&instance);
    }

    /// Fail every waiting caller with `error`; returns how many were notified
    pub fn abort_all(&self, error: PaxfsError) -> usize {
        let waiting: Vec<u64> = self
            .slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Waiting { .. }))
            .map(|slot| *slot.key())
            .collect();

        let mut aborted = 0;
        for instance in waiting {
            if let Some((_, Slot::Waiting { tx, .. })) = self
                .slots
                .remove_if(&instance, |_, slot| matches!(slot, Slot::Waiting { .. }))
            {
                if tx.send(Err(error.clone())).is_ok() {
                    aborted += 1;
                }
            }
        }
        aborted
    }

    /// Drop held outcomes for instances below `instance`
    pub fn prune_unclaimed_below(&self, instance: u64) {
        self.slots
            .retain(|key, slot| !(matches!(slot, Slot::Resolved { .. }) && *key < instance));
    }

    /// Number of callers currently waiting
    pub fn pending(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Waiting { .. }))
            .count()
    }

    /// Number of outcomes held for a late `register`
    pub fn unclaimed(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Resolved { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(sequence: u64) -> ProposalId {
        ProposalId {
            replica_id: 0,
            sequence,
        }
    }

    #[tokio::test]
    async fn test_register_then_resolve() {
        let clients = ReplicaClientSet::new();
        let rx = clients.register(7, id(1));
        assert_eq!(clients.pending(), 1);

        assert!(clients.resolve(7, id(1), CommandOutcome::Applied { instance: 7 }, true));
        assert_eq!(rx.await.unwrap(), Ok(CommandOutcome::Applied { instance: 7 }));
        assert_eq!(clients.pending(), 0);
    }

    #[tokio::test]
    async fn test_resolve_before_register_is_held() {
        let clients = ReplicaClientSet::new();
        assert!(!clients.resolve(3, id(2), CommandOutcome::LockNotHeld, true));
        assert_eq!(clients.pending(), 0);
        assert_eq!(clients.unclaimed(), 1);

        let rx = clients.register(3, id(2));
        assert_eq!(rx.await.unwrap(), Ok(CommandOutcome::LockNotHeld));
        assert_eq!(clients.unclaimed(), 0);
    }

    #[tokio::test]
    async fn test_held_outcome_of_another_proposal_is_not_delivered() {
        let clients = ReplicaClientSet::new();
        clients.resolve(1, id(1), CommandOutcome::Applied { instance: 1 }, true);

        let rx = clients.register(1, id(9));
        assert!(matches!(rx.await.unwrap(), Err(PaxfsError::Internal(_))));
        assert_eq!(clients.unclaimed(), 0);
    }

    #[tokio::test]
    async fn test_waiter_displaced_by_another_proposal() {
        let clients = ReplicaClientSet::new();
        let rx = clients.register(4, id(1));

        assert!(!clients.resolve(4, id(2), CommandOutcome::Applied { instance: 4 }, true));
        assert!(matches!(rx.await.unwrap(), Err(PaxfsError::Internal(_))));
        assert_eq!(clients.pending(), 0);
    }

    #[test]
    fn test_remote_resolution_without_waiter_is_dropped() {
        let clients = ReplicaClientSet::new();
        assert!(!clients.resolve(3, id(1), CommandOutcome::LockNotHeld, false));
        assert_eq!(clients.unclaimed(), 0);

        let mut rx = clients.register(3, id(1));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_abort_all() {
        let clients = ReplicaClientSet::new();
        let rx1 = clients.register(1, id(1));
        let rx2 = clients.register(2, id(2));
        clients.resolve(5, id(5), CommandOutcome::LockNotHeld, true);

        assert_eq!(clients.abort_all(PaxfsError::NotLeader), 2);
        assert_eq!(rx1.await.unwrap(), Err(PaxfsError::NotLeader));
        assert_eq!(rx2.await.unwrap(), Err(PaxfsError::NotLeader));
        assert_eq!(clients.pending(), 0);

        // held outcomes survive an abort
        let rx5 = clients.register(5, id(5));
        assert_eq!(rx5.await.unwrap(), Ok(CommandOutcome::LockNotHeld));
    }

    #[test]
    fn test_abandon_detaches_waiter() {
        let clients = ReplicaClientSet::new();
        let _rx = clients.register(4, id(1));
        clients.abandon(4);
        assert_eq!(clients.pending(), 0);
        assert!(!clients.resolve(4, id(1), CommandOutcome::Applied { instance: 4 }, false));
    }

    #[test]
    fn test_prune_unclaimed() {
        let clients = ReplicaClientSet::new();
        clients.resolve(1, id(1), CommandOutcome::LockNotHeld, true);
        clients.resolve(9, id(9), CommandOutcome::LockNotHeld, true);
        let _rx = clients.register(2, id(2));

        clients.prune_unclaimed_below(5);
        assert_eq!(clients.unclaimed(), 1);

        let mut rx1 = clients.register(1, id(1));
        assert!(rx1.try_recv().is_err());
        let mut rx9 = clients.register(9, id(9));
        assert_eq!(rx9.try_recv().unwrap(), Ok(CommandOutcome::LockNotHeld));
    }
}
