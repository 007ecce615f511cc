//! Application startup utilities

mod http;
mod logging;

pub use http::{build_group, main_server};
pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};
