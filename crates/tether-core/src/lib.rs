//! Tether Core
//!
//! Shared utilities for the Tether crates: hash collections, logging setup
//! and profiling hooks.

pub mod alloc;
pub mod logging;
pub mod profiling;

// Re-exported so dependents can write compile-time layout checks without
// adding the crate themselves.
pub use static_assertions;
