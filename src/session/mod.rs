//! Live session management: lifecycle registry and per-symbol loops

pub mod registry;
pub mod runner;

pub use registry::{SessionRegistry, SessionState};
pub use runner::{SessionConfig, DEFAULT_POLL_INTERVAL};
