// Replication metrics
// Thin wrappers over the `metrics` facade; the server installs the recorder

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Register metric descriptions, once at startup
pub fn describe_metrics() {
    describe_counter!("paxfs_applied_total", "Total number of applied log instances");
    describe_gauge!(
        "paxfs_last_applied_instance",
        "Highest log instance applied by a replica"
    );
    describe_counter!(
        "paxfs_proposals_total",
        "Total number of client proposals by outcome"
    );
    describe_gauge!(
        "paxfs_pending_proposals",
        "Number of callers waiting for their instance to apply"
    );
}

pub fn record_applied(replica_id: u64, instance: u64) {
    counter!("paxfs_applied_total", "replica" => replica_id.to_string()).increment(1);
    gauge!("paxfs_last_applied_instance", "replica" => replica_id.to_string()).set(instance as f64);
}

pub fn record_proposal(outcome: &'static str) {
    counter!("paxfs_proposals_total", "outcome" => outcome).increment(1);
}

pub fn set_pending_proposals(replica_id: u64, pending: usize) {
    gauge!("paxfs_pending_proposals", "replica" => replica_id.to_string()).set(pending as f64);
}
