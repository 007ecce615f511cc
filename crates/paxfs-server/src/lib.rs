// paxfs server: HTTP front end over an in-process Paxos replica group

pub mod api; // HTTP handlers and bodies
pub mod metrics; // HTTP metrics
pub mod middleware; // actix middleware
pub mod model; // Configuration, app state and response envelope
pub mod startup; // Logging, group and server bootstrap

pub use model::{AppState, Configuration};
