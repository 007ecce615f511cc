// Replica role and apply progress
// Mutated by the apply engine (progress) and the leadership protocol (role)

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

/// Leadership role of a replica
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Role {
    Follower,
    /// Elected, applying up to the commit frontier observed at election
    CatchingUp { target: u64 },
    Leader,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Follower => "follower",
            Role::CatchingUp { .. } => "catching_up",
            Role::Leader => "leader",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::CatchingUp { target } => write!(f, "catching_up({})", target),
            other => f.write_str(other.as_str()),
        }
    }
}

pub struct ReplicaState {
    replica_id: u64,
    /// Last applied instance; never decreases
    applied: watch::Sender<u64>,
    role: RwLock<Role>,
    halted: AtomicBool,
}

impl ReplicaState {
    pub fn new(replica_id: u64) -> Self {
        let (applied, _) = watch::channel(0);
        Self {
            replica_id,
            applied,
            role: RwLock::new(Role::Follower),
            halted: AtomicBool::new(false),
        }
    }

    pub fn replica_id(&self) -> u64 {
        self.replica_id
    }

    pub fn last_applied(&self) -> u64 {
        *self.applied.borrow()
    }

    /// Record progress; ignored unless `instance` is beyond the current value
    pub fn advance_applied(&self, instance: u64) {
        self.applied.send_if_modified(|current| {
            if instance > *current {
                *current = instance;
                true
            } else {
                false
            }
        });
    }

    /// Watch apply progress
    pub fn subscribe_applied(&self) -> watch::Receiver<u64> {
        self.applied.subscribe()
    }

    pub fn role(&self) -> Role {
        *self.role.read()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn is_leader_and_initialized(&self) -> bool {
        !self.is_halted() && *self.role.read() == Role::Leader
    }

    /// Enter catch-up towards `target`, or lead right away if already there
    pub fn begin_catch_up(&self, target: u64) -> Role {
        let mut role = self.role.write();
        if self.is_halted() {
            warn!(replica_id = self.replica_id, "Halted replica cannot take leadership");
            *role = Role::Follower;
            return *role;
        }

        let applied = self.last_applied();
        *role = if applied >= target {
            Role::Leader
        } else {
            Role::CatchingUp { target }
        };
        info!(
            replica_id = self.replica_id,
            applied,
            target,
            role = %*role,
            "Replica elected"
        );
        *role
    }

    /// Promote to leader once catch-up reaches its target; returns `true` on promotion
    pub fn on_applied(&self, instance: u64) -> bool {
        let mut role = self.role.write();
        match *role {
            Role::CatchingUp { target } if instance >= target => {
                *role = Role::Leader;
                info!(
                    replica_id = self.replica_id,
                    instance, "Replica caught up, now leader"
                );
                true
            }
            _ => false,
        }
    }

    /// Become follower; returns `true` if the role changed
    pub fn step_down(&self) -> bool {
        let mut role = self.role.write();
        if *role == Role::Follower {
            return false;
        }
        info!(replica_id = self.replica_id, previous = %*role, "Replica stepped down");
        *role = Role::Follower;
        true
    }

    /// Stop serving for good after a fatal apply error
    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
        self.step_down();
    }
}
