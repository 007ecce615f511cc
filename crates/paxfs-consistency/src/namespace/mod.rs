//! Replicated namespace
//!
//! This module provides:
//! - The node data model
//! - The deterministic namespace state machine
//! - The client-facing `NamespaceService` contract

mod model;
mod service;
mod state;

pub use model::*;
pub use service::*;
pub use state::*;
