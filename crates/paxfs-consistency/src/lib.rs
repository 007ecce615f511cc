//! paxfs Consistency - replicated namespace over Paxos
//!
//! This crate provides:
//! - The deterministic namespace state machine (files, directories, locks)
//! - The consensus client contract and an in-process quorum
//! - Log storage (RocksDB and in-memory)
//! - The apply engine, waiter registry and leadership protocol
//! - The replica coordinator serving `NamespaceService`

#![allow(clippy::result_large_err)]

pub mod namespace;
pub mod paxos;

// Re-export namespace types
pub use namespace::{
    InvariantViolation, LockHolder, NamespaceService, NamespaceState, Node, NodeMeta,
};

// Re-export replication types
pub use paxos::{
    ApplyEngine, CommandOutcome, ConsensusClient, LocalQuorum, LogEntry, LogStore,
    MemoryLogStore, PaxosCommand, PaxosConfig, Proposal, ProposalId, Rejection,
    ReplicaClientSet, ReplicaCoordinator, ReplicaGroup, ReplicaNode, ReplicaState,
    ReplicaStatus, RocksLogStore, Role,
};
