//! Test utilities for Tether.
//!
//! With the `mock` feature this crate provides a fake native toolkit that
//! records every call the engine makes into it, so tests can assert on
//! create/destroy ordering, coalesced flag writes and the like without a
//! real windowing system.
//!
//! # Example
//!
//! ```rust
//! # #[cfg(feature = "mock")]
//! # {
//! use std::sync::Arc;
//! use tether_native::{Control, EngineConfig, Environment};
//! use tether_test_utils::{MockBackend, MockWidget};
//!
//! let env = Environment::new(EngineConfig::default()).unwrap();
//! let backend = Arc::new(MockBackend::new());
//! let mut edit = Control::new(&env, MockWidget::new(&backend));
//! let text = edit.register_value(MockWidget::text_slot());
//!
//! edit.set(text, "hello".to_string()).unwrap();
//! edit.create_handle().unwrap();
//!
//! assert_eq!(backend.count_creates(), 1);
//! assert_eq!(edit.handle().unwrap().text(), "hello");
//! # }
//! ```

#[cfg(feature = "mock")]
pub mod mock_native;

#[cfg(feature = "mock")]
pub use mock_native::*;

/// Route engine logs through the test harness.
pub fn init_test_logging() {
    tether_core::logging::init_for_tests();
}
