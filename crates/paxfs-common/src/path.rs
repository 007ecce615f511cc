//! Namespace path helpers
//!
//! Paths are absolute and slash-delimited. The root `/` always exists.

use crate::PaxfsError;

/// The namespace root
pub const ROOT_PATH: &str = "/";

/// Check whether `path` is the namespace root
pub fn is_root(path: &str) -> bool {
    path == ROOT_PATH
}

/// Validate a namespace path
///
/// # Examples
///
/// ```
/// use paxfs_common::validate_path;
///
/// assert!(validate_path("/").is_ok());
/// assert!(validate_path("/a/b.txt").is_ok());
/// assert!(validate_path("a/b").is_err());
/// assert!(validate_path("/a//b").is_err());
/// assert!(validate_path("/a/").is_err());
/// ```
pub fn validate_path(path: &str) -> Result<(), PaxfsError> {
    if is_root(path) {
        return Ok(());
    }
    if !path.starts_with('/') || path.ends_with('/') || path.contains('\0') {
        return Err(PaxfsError::InvalidPath(path.to_string()));
    }
    let valid = path[1..]
        .split('/')
        .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(())
    } else {
        Err(PaxfsError::InvalidPath(path.to_string()))
    }
}

/// Parent of a validated path; `None` for the root
///
/// # Examples
///
/// ```
/// use paxfs_common::parent_path;
///
/// assert_eq!(parent_path("/a/b"), Some("/a"));
/// assert_eq!(parent_path("/a"), Some("/"));
/// assert_eq!(parent_path("/"), None);
/// ```
pub fn parent_path(path: &str) -> Option<&str> {
    if is_root(path) {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT_PATH),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Prefix that every descendant of `dir` starts with
pub fn child_prefix(dir: &str) -> String {
    if is_root(dir) {
        ROOT_PATH.to_string()
    } else {
        format!("{}/", dir)
    }
}
