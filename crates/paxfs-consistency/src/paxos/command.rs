// Paxos command and outcome types
// These are the namespace operations that go through consensus

use paxfs_common::PaxfsError;
use serde::{Deserialize, Serialize};

/// Identifies a proposal by the replica that submitted it and its local sequence
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProposalId {
    pub replica_id: u64,
    pub sequence: u64,
}

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.replica_id, self.sequence)
    }
}

/// All namespace mutations that go through consensus
/// Each variant is interpreted by the namespace state machine at apply time
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaxosCommand {
    /// Create a file or directory under an existing directory
    Create { path: String, is_dir: bool },

    /// Delete a node if its version still matches
    Delete { path: String, expected_instance: u64 },

    /// Replace file content if its version still matches
    Update {
        path: String,
        expected_instance: u64,
        content: Vec<u8>,
    },

    /// Take the advisory lock on a node for a client
    AcquireLock {
        path: String,
        expected_instance: u64,
        client_id: String,
    },

    /// Clear the advisory lock on a node, whoever holds it
    ReleaseLock { path: String, expected_instance: u64 },

    /// No-operation command, committed to learn the commit frontier
    Noop,
}

impl PaxosCommand {
    /// Get the operation type as a string for logging
    pub fn op_type(&self) -> &'static str {
        match self {
            PaxosCommand::Create { .. } => "Create",
            PaxosCommand::Delete { .. } => "Delete",
            PaxosCommand::Update { .. } => "Update",
            PaxosCommand::AcquireLock { .. } => "AcquireLock",
            PaxosCommand::ReleaseLock { .. } => "ReleaseLock",
            PaxosCommand::Noop => "Noop",
        }
    }

    /// The path this command targets, if any
    pub fn path(&self) -> Option<&str> {
        match self {
            PaxosCommand::Create { path, .. }
            | PaxosCommand::Delete { path, .. }
            | PaxosCommand::Update { path, .. }
            | PaxosCommand::AcquireLock { path, .. }
            | PaxosCommand::ReleaseLock { path, .. } => Some(path),
            PaxosCommand::Noop => None,
        }
    }
}

/// A command tagged with the identity of its proposer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub command: PaxosCommand,
}

/// A committed log instance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub instance: u64,
    pub proposal: Proposal,
}

/// Why the state machine refused a command at apply time
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    NotFound,
    AlreadyExists,
    ParentMissing,
    NotEmpty,
    Conflict { expected: u64, current: u64 },
    IsDirectory,
    InvalidPath,
}

impl Rejection {
    /// Convert into the caller-facing error for `path`
    pub fn into_error(self, path: &str) -> PaxfsError {
        let path = path.to_string();
        match self {
            Rejection::NotFound => PaxfsError::NotFound(path),
            Rejection::AlreadyExists => PaxfsError::AlreadyExists(path),
            Rejection::ParentMissing => PaxfsError::ParentMissing(path),
            Rejection::NotEmpty => PaxfsError::NotEmpty(path),
            Rejection::Conflict { expected, current } => PaxfsError::Conflict {
                path,
                expected,
                current,
            },
            Rejection::IsDirectory => PaxfsError::IsDirectory(path),
            Rejection::InvalidPath => PaxfsError::InvalidPath(path),
        }
    }
}

/// Deterministic result of applying one command
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    /// The command took effect; carries the node's instance number afterwards
    Applied { instance: u64 },
    /// The lock is owned by another client
    LockHeld { owner: String },
    /// Release found no lock to clear
    LockNotHeld,
    /// A precondition failed
    Rejected(Rejection),
}

impl CommandOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CommandOutcome::Applied { .. })
    }

    /// Short label used for metrics and logging
    pub fn label(&self) -> &'static str {
        match self {
            CommandOutcome::Applied { .. } => "applied",
            CommandOutcome::LockHeld { .. } => "lock_held",
            CommandOutcome::LockNotHeld => "lock_not_held",
            CommandOutcome::Rejected(_) => "rejected",
        }
    }
}
