//! Application module
//!
//! Wires the validated configuration into one caching session per identity
//! and runs them under a supervisor until a termination signal arrives.

pub mod builder;
pub mod core;
pub mod tasks;

// Re-export main types
pub use builder::ApplicationBuilder;
pub use core::Application;
