//! Request and response bodies of the HTTP API
//!
//! File content travels base64-encoded.

use paxfs_consistency::{NodeMeta, ReplicaStatus};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParam {
    pub path: String,
    #[serde(default)]
    pub is_dir: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathQuery {
    pub path: String,
}

/// A path at an expected version
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VersionedParam {
    pub path: String,
    pub instance: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateParam {
    pub path: String,
    pub instance: u64,
    /// Base64-encoded content
    #[serde(default)]
    pub content: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireParam {
    pub path: String,
    pub instance: u64,
    pub client_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstanceResponse {
    pub instance: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadResponse {
    /// Base64-encoded content
    pub content: String,
    pub meta: NodeMeta,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AcquireResponse {
    pub acquired: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub released: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderQuery {
    pub replica_id: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptorQuery {
    pub replica_id: usize,
    pub up: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    pub leader: Option<u64>,
    pub acceptors: usize,
    pub live_acceptors: usize,
    pub replicas: Vec<ReplicaStatus>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderResponse {
    pub replica_id: u64,
    pub role: String,
}
