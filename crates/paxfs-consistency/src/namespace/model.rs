//! Namespace data model

use paxfs_common::NodeKind;
use serde::{Deserialize, Serialize};

/// A file or directory in the replicated namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Absolute slash-delimited path (unique key)
    pub path: String,
    /// File or directory
    pub kind: NodeKind,
    /// File content; always empty for directories
    #[serde(default)]
    pub content: Vec<u8>,
    /// Version stamp: log instance of the creation or last content change
    pub instance_number: u64,
    /// Log instance that created the node
    pub created_instance: u64,
    /// Client currently holding the advisory lock
    #[serde(default)]
    pub lock_owner: Option<String>,
}

impl Node {
    pub fn new(path: impl Into<String>, kind: NodeKind, instance: u64) -> Self {
        Self {
            path: path.into(),
            kind,
            content: Vec::new(),
            instance_number: instance,
            created_instance: instance,
            lock_owner: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    pub fn meta(&self) -> NodeMeta {
        NodeMeta {
            path: self.path.clone(),
            kind: self.kind,
            instance_number: self.instance_number,
            created_instance: self.created_instance,
            content_length: self.content.len() as u64,
            lock_owner: self.lock_owner.clone(),
        }
    }
}

/// Node metadata returned alongside content reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMeta {
    pub path: String,
    pub kind: NodeKind,
    pub instance_number: u64,
    pub created_instance: u64,
    pub content_length: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_owner: Option<String>,
}

/// A held lock as reported by `get_states`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockHolder {
    pub client_id: String,
    pub path: String,
}

impl LockHolder {
    pub fn new(client_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            path: path.into(),
        }
    }
}
