// Paxos replication module for paxfs
// Agrees namespace commands through a quorum and applies them in log order on every replica

pub mod client_set;
pub mod command;
pub mod config;
pub mod consensus;
pub mod coordinator;
pub mod engine;
pub mod group;
pub mod log_store;
pub mod metrics;
pub mod node;
pub mod replica_state;

// Re-export commonly used types
pub use client_set::{ReplicaClientSet, Resolution};
pub use command::{CommandOutcome, LogEntry, PaxosCommand, Proposal, ProposalId, Rejection};
pub use config::PaxosConfig;
pub use consensus::{ConsensusClient, LocalQuorum};
pub use coordinator::{ReplicaCoordinator, ReplicaStatus};
pub use engine::ApplyEngine;
pub use group::ReplicaGroup;
pub use log_store::{LogStore, MemoryLogStore, RocksLogStore};
pub use node::{ReplicaContext, ReplicaNode};
pub use replica_state::{ReplicaState, Role};
