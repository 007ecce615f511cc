//! HTTP API
//!
//! Namespace and lock calls go to the designated leader of the local replica
//! group; cluster calls manage the group itself.

pub mod cluster;
pub mod error;
pub mod lock;
pub mod metrics;
pub mod model;
pub mod namespace;
pub mod route;
