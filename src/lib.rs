// Library crate - exports shared types and the signal pipeline

pub mod api;
pub mod fetch;
pub mod session;
pub mod signal_core;
pub mod streams;
pub mod symbols;
pub mod types;

// Re-export commonly used types
pub use types::*;
