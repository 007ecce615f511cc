// Paxos replication configuration
// Provides configuration settings for the replicated namespace

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the replicated log, apply engine and coordinator
#[derive(Clone, Debug)]
pub struct PaxosConfig {
    /// Number of replicas (and acceptors) in the group (default: 3)
    pub replica_count: usize,

    /// How long a client call waits for its instance to be applied (default: 5000ms)
    pub proposal_timeout_ms: u64,

    /// Re-proposals allowed when another proposal wins our slot (default: 3)
    pub max_proposal_attempts: u32,

    /// Maximum committed entries fetched from consensus per request (default: 256)
    pub fetch_batch_size: usize,

    /// Applied instances between namespace snapshots (default: 1000)
    pub snapshot_threshold: u64,

    /// Interval at which the apply engine re-polls consensus after a transient failure
    pub sync_interval_ms: u64,

    /// How many instances an unclaimed outcome is kept for a late-registering caller
    pub unclaimed_window: u64,

    /// Data directory for per-replica storage
    pub data_dir: PathBuf,
}

impl Default for PaxosConfig {
    fn default() -> Self {
        Self {
            replica_count: 3,
            proposal_timeout_ms: 5000,
            max_proposal_attempts: 3,
            fetch_batch_size: 256,
            snapshot_threshold: 1000,
            sync_interval_ms: 500,
            unclaimed_window: 4096,
            data_dir: PathBuf::from("./data/paxfs"),
        }
    }
}

impl PaxosConfig {
    /// Create a new PaxosConfig with custom settings
    pub fn new(replica_count: usize, snapshot_threshold: u64, data_dir: PathBuf) -> Self {
        Self {
            replica_count,
            snapshot_threshold,
            data_dir,
            ..Default::default()
        }
    }

    /// Get proposal timeout as Duration
    pub fn proposal_timeout(&self) -> Duration {
        Duration::from_millis(self.proposal_timeout_ms)
    }

    /// Get sync interval as Duration
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    /// Strict majority of the replica group
    pub fn quorum_size(&self) -> usize {
        self.replica_count / 2 + 1
    }

    /// Get the storage directory of one replica
    pub fn replica_dir(&self, replica_id: u64) -> PathBuf {
        self.data_dir.join(format!("replica-{}", replica_id))
    }

    /// Vote log directory of the in-process acceptor at `index`
    pub fn acceptor_dir(&self, index: usize) -> PathBuf {
        self.data_dir.join(format!("acceptor-{}", index))
    }

    /// Ensure all replica and acceptor directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        for id in 0..self.replica_count as u64 {
            std::fs::create_dir_all(self.replica_dir(id))?;
            std::fs::create_dir_all(self.acceptor_dir(id as usize))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PaxosConfig::default();
        assert_eq!(config.replica_count, 3);
        assert_eq!(config.proposal_timeout_ms, 5000);
        assert_eq!(config.max_proposal_attempts, 3);
        assert_eq!(config.fetch_batch_size, 256);
        assert_eq!(config.snapshot_threshold, 1000);
        assert_eq!(config.unclaimed_window, 4096);
    }

    #[test]
    fn test_duration_conversions() {
        let config = PaxosConfig::default();
        assert_eq!(config.proposal_timeout(), Duration::from_millis(5000));
        assert_eq!(config.sync_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_quorum_size() {
        let mut config = PaxosConfig::default();
        assert_eq!(config.quorum_size(), 2);
        config.replica_count = 5;
        assert_eq!(config.quorum_size(), 3);
        config.replica_count = 4;
        assert_eq!(config.quorum_size(), 3);
        config.replica_count = 1;
        assert_eq!(config.quorum_size(), 1);
    }

    #[test]
    fn test_new_config() {
        let config = PaxosConfig::new(5, 50, PathBuf::from("/data/paxfs"));
        assert_eq!(config.replica_count, 5);
        assert_eq!(config.snapshot_threshold, 50);
        assert_eq!(config.data_dir, PathBuf::from("/data/paxfs"));
        assert_eq!(config.proposal_timeout_ms, 5000);
    }

    #[test]
    fn test_directory_paths() {
        let config = PaxosConfig {
            data_dir: PathBuf::from("/tmp/paxfs"),
            ..Default::default()
        };
        assert_eq!(config.replica_dir(0), PathBuf::from("/tmp/paxfs/replica-0"));
        assert_eq!(config.replica_dir(2), PathBuf::from("/tmp/paxfs/replica-2"));
        assert_eq!(config.acceptor_dir(1), PathBuf::from("/tmp/paxfs/acceptor-1"));
    }

    #[test]
    fn test_ensure_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = PaxosConfig {
            data_dir: temp_dir.path().join("paxfs"),
            ..Default::default()
        };

        assert!(config.ensure_dirs().is_ok());
        assert!(config.data_dir.exists());
        for id in 0..3 {
            assert!(config.replica_dir(id).exists());
            assert!(config.acceptor_dir(id as usize).exists());
        }
    }
}
