//! Deterministic namespace state machine
//!
//! `NamespaceState` is a pure function of the committed command sequence: it
//! performs no I/O and has no concurrency of its own. The apply engine feeds it
//! one instance at a time; the coordinator uses `precheck` against the same
//! rules to fail fast before consensus.

use std::collections::BTreeMap;
use std::ops::Bound;

use paxfs_common::path::child_prefix;
use paxfs_common::{NodeKind, ROOT_PATH, is_root, parent_path, validate_path};
use serde::{Deserialize, Serialize};

use super::model::{LockHolder, Node, NodeMeta};
use crate::paxos::command::{CommandOutcome, PaxosCommand, Rejection};

/// A committed instance that cannot be applied without corrupting state
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invariant violation at instance {instance}: {detail}")]
pub struct InvariantViolation {
    pub instance: u64,
    pub detail: String,
}

/// State transition decided by validation
enum Mutation {
    Create { path: String, kind: NodeKind },
    Delete { path: String },
    Update { path: String, content: Vec<u8> },
    SetOwner { path: String, client_id: String },
    ClearOwner { path: String },
}

enum Plan {
    Mutate(Mutation),
    /// No state change; the outcome does not depend on the applying instance
    Done(CommandOutcome),
    Noop,
}

/// The replicated namespace tree plus lock ownership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceState {
    /// Highest log instance folded into this state
    last_applied: u64,
    nodes: BTreeMap<String, Node>,
}

impl Default for NamespaceState {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceState {
    /// Empty namespace containing only the root directory
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            ROOT_PATH.to_string(),
            Node::new(ROOT_PATH, NodeKind::Directory, 0),
        );
        Self {
            last_applied: 0,
            nodes,
        }
    }

    pub fn last_applied(&self) -> u64 {
        self.last_applied
    }

    pub fn get(&self, path: &str) -> Option<&Node> {
        self.nodes.get(path)
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Current version of a node
    pub fn open(&self, path: &str) -> Result<u64, Rejection> {
        if validate_path(path).is_err() {
            return Err(Rejection::InvalidPath);
        }
        self.nodes
            .get(path)
            .map(|node| node.instance_number)
            .ok_or(Rejection::NotFound)
    }

    /// Content and metadata of a node whose version must match `expected`
    pub fn read(&self, path: &str, expected: u64) -> Result<(Vec<u8>, NodeMeta), Rejection> {
        let node = self.versioned(path, expected)?;
        Ok((node.content.clone(), node.meta()))
    }

    /// All held locks, ordered by path
    pub fn lock_holders(&self) -> Vec<LockHolder> {
        self.nodes
            .values()
            .filter_map(|node| {
                node.lock_owner
                    .as_ref()
                    .map(|owner| LockHolder::new(owner.clone(), node.path.clone()))
            })
            .collect()
    }

    /// Evaluate `command` against the current state without mutating it.
    ///
    /// Returns the outcome when it is already decided (a failed precondition,
    /// a contended or absent lock, an idempotent re-acquire); `None` when the
    /// command would change state and must go through consensus.
    pub fn precheck(&self, command: &PaxosCommand) -> Option<CommandOutcome> {
        match self.plan(command) {
            Plan::Done(outcome) => Some(outcome),
            Plan::Mutate(_) | Plan::Noop => None,
        }
    }

    /// Apply the command committed at `instance`
    pub fn apply(
        &mut self,
        instance: u64,
        command: &PaxosCommand,
    ) -> Result<CommandOutcome, InvariantViolation> {
        if instance != self.last_applied + 1 {
            return Err(InvariantViolation {
                instance,
                detail: format!(
                    "expected instance {}, state already at {}",
                    self.last_applied + 1,
                    self.last_applied
                ),
            });
        }

        let outcome = match self.plan(command) {
            Plan::Mutate(mutation) => self.commit(instance, mutation)?,
            Plan::Done(outcome) => outcome,
            Plan::Noop => CommandOutcome::Applied { instance },
        };
        self.last_applied = instance;
        Ok(outcome)
    }

    fn plan(&self, command: &PaxosCommand) -> Plan {
        match self.try_plan(command) {
            Ok(plan) => plan,
            Err(rejection) => Plan::Done(CommandOutcome::Rejected(rejection)),
        }
    }

    fn try_plan(&self, command: &PaxosCommand) -> Result<Plan, Rejection> {
        match command {
            PaxosCommand::Create { path, is_dir } => {
                validate_path(path).map_err(|_| Rejection::InvalidPath)?;
                if self.nodes.contains_key(path) {
                    return Err(Rejection::AlreadyExists);
                }
                let parent_is_dir = parent_path(path)
                    .and_then(|parent| self.nodes.get(parent))
                    .is_some_and(Node::is_dir);
                if !parent_is_dir {
                    return Err(Rejection::ParentMissing);
                }
                Ok(Plan::Mutate(Mutation::Create {
                    path: path.clone(),
                    kind: NodeKind::from_is_dir(*is_dir),
                }))
            }

            PaxosCommand::Delete {
                path,
                expected_instance,
            } => {
                let node = self.mutable(path, *expected_instance)?;
                if node.is_dir() && self.has_children(path) {
                    return Err(Rejection::NotEmpty);
                }
                Ok(Plan::Mutate(Mutation::Delete { path: path.clone() }))
            }

            PaxosCommand::Update {
                path,
                expected_instance,
                content,
            } => {
                let node = self.mutable(path, *expected_instance)?;
                if node.is_dir() {
                    return Err(Rejection::IsDirectory);
                }
                Ok(Plan::Mutate(Mutation::Update {
                    path: path.clone(),
                    content: content.clone(),
                }))
            }

            PaxosCommand::AcquireLock {
                path,
                expected_instance,
                client_id,
            } => {
                let node = self.mutable(path, *expected_instance)?;
                match &node.lock_owner {
                    Some(owner) if owner == client_id => {
                        Ok(Plan::Done(CommandOutcome::Applied {
                            instance: node.instance_number,
                        }))
                    }
                    Some(owner) => Ok(Plan::Done(CommandOutcome::LockHeld {
                        owner: owner.clone(),
                    })),
                    None => Ok(Plan::Mutate(Mutation::SetOwner {
                        path: path.clone(),
                        client_id: client_id.clone(),
                    })),
                }
            }

            PaxosCommand::ReleaseLock {
                path,
                expected_instance,
            } => {
                let node = self.mutable(path, *expected_instance)?;
                if node.lock_owner.is_none() {
                    return Ok(Plan::Done(CommandOutcome::LockNotHeld));
                }
                Ok(Plan::Mutate(Mutation::ClearOwner { path: path.clone() }))
            }

            PaxosCommand::Noop => Ok(Plan::Noop),
        }
    }

    /// A non-root node whose version matches `expected`
    fn mutable(&self, path: &str, expected: u64) -> Result<&Node, Rejection> {
        if is_root(path) {
            return Err(Rejection::InvalidPath);
        }
        self.versioned(path, expected)
    }

    fn versioned(&self, path: &str, expected: u64) -> Result<&Node, Rejection> {
        validate_path(path).map_err(|_| Rejection::InvalidPath)?;
        let node = self.nodes.get(path).ok_or(Rejection::NotFound)?;
        if node.instance_number != expected {
            return Err(Rejection::Conflict {
                expected,
                current: node.instance_number,
            });
        }
        Ok(node)
    }

    fn has_children(&self, dir: &str) -> bool {
        // descendants sort contiguously from the prefix itself
        let prefix = child_prefix(dir);
        self.nodes
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .next()
            .is_some_and(|(path, _)| path.starts_with(&prefix))
    }

    fn commit(
        &mut self,
        instance: u64,
        mutation: Mutation,
    ) -> Result<CommandOutcome, InvariantViolation> {
        let violation = |detail: String| InvariantViolation { instance, detail };

        match mutation {
            Mutation::Create { path, kind } => {
                self.nodes
                    .insert(path.clone(), Node::new(path, kind, instance));
                Ok(CommandOutcome::Applied { instance })
            }
            Mutation::Delete { path } => {
                self.nodes
                    .remove(&path)
                    .ok_or_else(|| violation(format!("deleting missing node {}", path)))?;
                Ok(CommandOutcome::Applied { instance })
            }
            Mutation::Update { path, content } => {
                let node = self
                    .nodes
                    .get_mut(&path)
                    .ok_or_else(|| violation(format!("updating missing node {}", path)))?;
                if node.instance_number >= instance {
                    return Err(violation(format!(
                        "version of {} would move from {} to {}",
                        path, node.instance_number, instance
                    )));
                }
                node.content = content;
                node.instance_number = instance;
                Ok(CommandOutcome::Applied { instance })
            }
            Mutation::SetOwner { path, client_id } => {
                let node = self
                    .nodes
                    .get_mut(&path)
                    .ok_or_else(|| violation(format!("locking missing node {}", path)))?;
                node.lock_owner = Some(client_id);
                Ok(CommandOutcome::Applied {
                    instance: node.instance_number,
                })
            }
            Mutation::ClearOwner { path } => {
                let node = self
                    .nodes
                    .get_mut(&path)
                    .ok_or_else(|| violation(format!("unlocking missing node {}", path)))?;
                node.lock_owner = None;
                Ok(CommandOutcome::Applied {
                    instance: node.instance_number,
                })
            }
        }
    }
}
