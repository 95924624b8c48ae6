//! Tether Native - deferred properties and native handle lifecycle
//!
//! This crate is the engine shared by every Tether widget adapter:
//! - Delayed values and flags, readable and writable whether or not the
//!   native handle exists
//! - Transparent destroy+create when a construction-only property changes
//! - Scarce command id allocation and id/handle routing tables
//! - Counted object references for sharing across the managed boundary
//!
//! ## Quick Start
//!
//! ```rust
//! use tether_native::{
//!     Control, CreateContext, DelayedValue, EngineConfig, Environment, HandleResult,
//!     NativeCx, NativeWidget, RawHandle,
//! };
//!
//! struct Label {
//!     text: String,
//!     wrap: bool,
//! }
//!
//! struct LabelWidget;
//!
//! impl NativeWidget for LabelWidget {
//!     type Handle = Label;
//!
//!     fn create(&mut self, _cx: &CreateContext<'_, Label>) -> HandleResult<Label> {
//!         Ok(Label { text: String::new(), wrap: false })
//!     }
//!
//!     fn destroy(&mut self, _handle: Label) {}
//!
//!     fn raw(&self, handle: &Label) -> RawHandle {
//!         RawHandle::from_raw(handle as *const Label as u64)
//!     }
//! }
//!
//! let env = Environment::new(EngineConfig::default()).unwrap();
//! let mut label = Control::new(&env, LabelWidget);
//! let text = label.register_value(DelayedValue::new(
//!     String::new(),
//!     |l: &Label| l.text.clone(),
//!     |cx: &mut NativeCx<'_, Label>, v: String| cx.text = v,
//! ));
//! let wrap = label.register_structural(false);
//!
//! // No handle yet: the value is cached.
//! label.set(text, "Hello".to_string()).unwrap();
//! label.create_handle().unwrap();
//! assert_eq!(label.handle().unwrap().text, "Hello");
//!
//! // Construction-only change: the handle is rebuilt, the text survives.
//! label.set_structural(wrap, true).unwrap();
//! assert_eq!(label.recreates(), 1);
//! assert_eq!(label.get(text), "Hello");
//! # let _ = label.handle().unwrap().wrap;
//! ```
//!
//! ## Features
//!
//! - **profiling**: forwards to `tether-core/profiling` (puffin scopes)

pub mod config;
pub mod control;
pub mod delayed;
pub mod env;
pub mod error;
pub mod event;
pub mod id;
pub mod identity;
pub mod object;
pub mod structure;

pub use config::{EngineConfig, IdConfig, IdReusePolicy};
pub use control::{
    Control, ControlFlags, ControlNode, CreateContext, HandleState, NativeWidget,
};
pub use delayed::{DelayedFlags, DelayedSlot, DelayedValue, DelayedValues, FlagsKey, SlotKey};
pub use env::Environment;
pub use error::{HandleError, HandleResult};
pub use event::ControlEvent;
pub use id::{IdManager, NativeId};
pub use identity::{IdentityMap, ItemCategory, RawHandle};
pub use object::{ExportTable, ObjectRef, ObjectToken, WeakObjectRef};
pub use structure::{NativeCx, RecreateState, StructuralKey, StructuralValues};
