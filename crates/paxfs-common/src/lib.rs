//! paxfs Common - Shared types and utilities
//!
//! This crate provides the foundational types used across all paxfs components:
//! - Error types and error codes
//! - Namespace path helpers

pub mod error;
pub mod path;

// Re-exports for convenience
pub use error::{ErrorCode, PaxfsError};
pub use path::{ROOT_PATH, is_root, parent_path, validate_path};

/// Result alias used by every paxfs operation
pub type PaxfsResult<T> = std::result::Result<T, PaxfsError>;

/// Node kinds in the namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    #[default]
    File,
    Directory,
}

impl NodeKind {
    pub fn from_is_dir(is_dir: bool) -> Self {
        if is_dir {
            NodeKind::Directory
        } else {
            NodeKind::File
        }
    }

    pub fn is_dir(self) -> bool {
        matches!(self, NodeKind::Directory)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Directory => "directory",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(NodeKind::File),
            "directory" | "dir" => Ok(NodeKind::Directory),
            _ => Err(format!("Invalid node kind: {}", s)),
        }
    }
}
