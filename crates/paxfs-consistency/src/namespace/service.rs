//! Namespace service contract
//!
//! The conditional operations a replica serves to clients. Every mutating
//! operation is agreed through consensus and evaluated against the state as of
//! its position in the log, which gives the `check_and_*` family
//! compare-and-swap semantics under concurrency.

use async_trait::async_trait;
use paxfs_common::PaxfsResult;

use super::model::{LockHolder, NodeMeta};

/// Namespace and lock operations
#[async_trait]
pub trait NamespaceService: Send + Sync {
    /// Create a file or directory; returns the new node's instance number
    async fn check_and_create(&self, path: &str, is_dir: bool) -> PaxfsResult<u64>;

    /// Current instance number of a node (local read)
    async fn check_and_open(&self, path: &str) -> PaxfsResult<u64>;

    /// Delete a node at the given version
    async fn check_and_delete(&self, path: &str, instance_number: u64) -> PaxfsResult<()>;

    /// Content and metadata of a node at the given version (local read)
    async fn check_and_read(
        &self,
        path: &str,
        instance_number: u64,
    ) -> PaxfsResult<(Vec<u8>, NodeMeta)>;

    /// Replace file content at the given version; returns the new instance number
    async fn check_and_update(
        &self,
        path: &str,
        instance_number: u64,
        content: Vec<u8>,
    ) -> PaxfsResult<u64>;

    /// Acquire the lock for `client_id`; `false` when another client holds it
    async fn test_and_set_lock_owner(
        &self,
        path: &str,
        instance_number: u64,
        client_id: &str,
    ) -> PaxfsResult<bool>;

    /// Clear the lock regardless of owner; `false` when no lock was held
    async fn reset_lock_owner(&self, path: &str, instance_number: u64) -> PaxfsResult<bool>;

    /// Held locks from locally applied state
    async fn get_states(&self) -> PaxfsResult<Vec<LockHolder>>;

    fn is_leader_and_initialized(&self) -> bool;
}
