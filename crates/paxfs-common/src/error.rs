//! Error types and error codes for paxfs
//!
//! This module defines:
//! - `PaxfsError`: the error taxonomy surfaced to callers of the namespace service
//! - `ErrorCode`: structured error codes for API responses

use serde::{Deserialize, Serialize};

/// Errors surfaced verbatim to namespace clients.
///
/// A lock held by another client is not an error; it is reported as a `false`
/// result by `test_and_set_lock_owner`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PaxfsError {
    #[error("replica is not the initialized leader")]
    NotLeader,

    #[error("no quorum available for agreement")]
    NoQuorum,

    #[error("version conflict on '{path}': expected {expected}, current {current}")]
    Conflict {
        path: String,
        expected: u64,
        current: u64,
    },

    #[error("path '{0}' not found")]
    NotFound(String),

    #[error("path '{0}' already exists")]
    AlreadyExists(String),

    #[error("parent of '{0}' is not an existing directory")]
    ParentMissing(String),

    #[error("directory '{0}' is not empty")]
    NotEmpty(String),

    #[error("'{0}' is a directory and cannot hold content")]
    IsDirectory(String),

    #[error("invalid path '{0}'")]
    InvalidPath(String),

    #[error("timed out waiting for instance {instance} to be applied")]
    Timeout { instance: u64 },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PaxfsError {
    /// Whether the caller may retry the same request unchanged
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PaxfsError::NotLeader | PaxfsError::NoQuorum | PaxfsError::Timeout { .. }
        )
    }

    /// Stable error code for API responses
    pub fn error_code(&self) -> ErrorCode<'static> {
        match self {
            PaxfsError::NotLeader => NOT_LEADER,
            PaxfsError::NoQuorum => NO_QUORUM,
            PaxfsError::Conflict { .. } => VERSION_CONFLICT,
            PaxfsError::NotFound(_) => PATH_NOT_FOUND,
            PaxfsError::AlreadyExists(_) => PATH_ALREADY_EXISTS,
            PaxfsError::ParentMissing(_) => PARENT_MISSING,
            PaxfsError::NotEmpty(_) => DIRECTORY_NOT_EMPTY,
            PaxfsError::IsDirectory(_) => IS_DIRECTORY,
            PaxfsError::InvalidPath(_) => INVALID_PATH,
            PaxfsError::Timeout { .. } => APPLY_TIMEOUT,
            PaxfsError::Storage(_) => STORAGE_ERROR,
            PaxfsError::Config(_) => CONFIG_ERROR,
            PaxfsError::Internal(_) => SERVER_ERROR,
        }
    }
}

/// Error code structure for API responses
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

pub const SUCCESS: ErrorCode<'static> = ErrorCode {
    code: 0,
    message: "success",
};

pub const PARAMETER_VALIDATE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 20002,
    message: "parameter validate error",
};

// Leadership and agreement
pub const NOT_LEADER: ErrorCode<'static> = ErrorCode {
    code: 30001,
    message: "not leader",
};

pub const NO_QUORUM: ErrorCode<'static> = ErrorCode {
    code: 30002,
    message: "no quorum",
};

pub const APPLY_TIMEOUT: ErrorCode<'static> = ErrorCode {
    code: 30003,
    message: "apply timeout",
};

// Namespace preconditions
pub const VERSION_CONFLICT: ErrorCode<'static> = ErrorCode {
    code: 31001,
    message: "version conflict",
};

pub const PATH_NOT_FOUND: ErrorCode<'static> = ErrorCode {
    code: 31002,
    message: "path not found",
};

pub const PATH_ALREADY_EXISTS: ErrorCode<'static> = ErrorCode {
    code: 31003,
    message: "path already exists",
};

pub const PARENT_MISSING: ErrorCode<'static> = ErrorCode {
    code: 31004,
    message: "parent missing",
};

pub const DIRECTORY_NOT_EMPTY: ErrorCode<'static> = ErrorCode {
    code: 31005,
    message: "directory not empty",
};

pub const IS_DIRECTORY: ErrorCode<'static> = ErrorCode {
    code: 31006,
    message: "is a directory",
};

pub const INVALID_PATH: ErrorCode<'static> = ErrorCode {
    code: 31007,
    message: "invalid path",
};

// Server side
pub const STORAGE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 50001,
    message: "storage error",
};

pub const CONFIG_ERROR: ErrorCode<'static> = ErrorCode {
    code: 50002,
    message: "configuration error",
};

pub const SERVER_ERROR: ErrorCode<'static> = ErrorCode {
    code: 50000,
    message: "server error",
};
