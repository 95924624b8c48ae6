//! Construction-only ("structural") properties and the native access context.
//!
//! A structural property is one the toolkit only accepts when the native
//! resource is built. Changing it means destroying and recreating the
//! handle. [`StructuralValues`] stores those properties with a version that
//! moves on every effective change, so the recreate protocol can tell
//! whether the handle it just built is already out of date.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

/// Typed key for a value registered in [`StructuralValues`].
pub struct StructuralKey<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for StructuralKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StructuralKey<T> {}

impl<T> fmt::Debug for StructuralKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StructuralKey({})", self.index)
    }
}

/// Registry of construction-only values for one control.
#[derive(Default)]
pub struct StructuralValues {
    slots: Vec<Box<dyn Any>>,
    version: u32,
}

impl StructuralValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: PartialEq + 'static>(&mut self, initial: T) -> StructuralKey<T> {
        self.slots.push(Box::new(initial));
        StructuralKey {
            index: self.slots.len() - 1,
            _marker: PhantomData,
        }
    }

    /// # Panics
    ///
    /// Panics if `key` was issued by another registry.
    pub fn get<T: 'static>(&self, key: StructuralKey<T>) -> &T {
        self.slots
            .get(key.index)
            .and_then(|slot| slot.downcast_ref::<T>())
            .unwrap_or_else(|| panic!("{:?} does not belong to this registry", key))
    }

    /// Store a new value. Returns true, and bumps the version, only if the
    /// value actually changed.
    ///
    /// # Panics
    ///
    /// Panics if `key` was issued by another registry.
    pub fn set<T: PartialEq + 'static>(&mut self, key: StructuralKey<T>, value: T) -> bool {
        let slot = self
            .slots
            .get_mut(key.index)
            .and_then(|slot| slot.downcast_mut::<T>())
            .unwrap_or_else(|| panic!("{:?} does not belong to this registry", key));
        if *slot == value {
            return false;
        }
        *slot = value;
        self.version = self.version.wrapping_add(1);
        true
    }

    /// Current structure version.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Re-entrancy bookkeeping for a control's handle transitions.
#[derive(Debug, Default)]
pub struct RecreateState {
    pub(crate) depth: u32,
    pub(crate) cycling: bool,
    pub(crate) pending: bool,
    pub(crate) created_version: u32,
    pub(crate) coalesced: u32,
    pub(crate) recreates: u64,
}

impl RecreateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a create, destroy, recreate or property flush is running.
    pub fn in_flight(&self) -> bool {
        self.depth > 0
    }

    /// True while a destroy+create cycle is running.
    pub fn cycling(&self) -> bool {
        self.cycling
    }

    /// A recreate was requested and will run when the outermost operation
    /// returns.
    pub fn pending(&self) -> bool {
        self.pending
    }

    /// Structure version the current handle was built from.
    pub fn created_version(&self) -> u32 {
        self.created_version
    }

    /// Explicit recreate requests folded into an in-flight cycle.
    pub fn coalesced(&self) -> u32 {
        self.coalesced
    }

    /// Completed recreate cycles.
    pub fn recreates(&self) -> u64 {
        self.recreates
    }
}

/// What a property setter gets while the native handle is live.
///
/// Dereferences to the handle. Setters that have structural side effects go
/// through [`NativeCx::set_structural`] or [`NativeCx::request_recreate`];
/// neither recreates anything immediately.
pub struct NativeCx<'a, H> {
    handle: &'a mut H,
    structure: &'a mut StructuralValues,
    state: &'a mut RecreateState,
}

impl<'a, H> NativeCx<'a, H> {
    pub fn new(
        handle: &'a mut H,
        structure: &'a mut StructuralValues,
        state: &'a mut RecreateState,
    ) -> Self {
        Self {
            handle,
            structure,
            state,
        }
    }

    pub fn handle(&self) -> &H {
        &*self.handle
    }

    pub fn handle_mut(&mut self) -> &mut H {
        &mut *self.handle
    }

    pub fn structural<T: 'static>(&self, key: StructuralKey<T>) -> &T {
        self.structure.get(key)
    }

    /// Change a structural value from inside a flush. If it changed, the
    /// owning control rebuilds its handle once the outer operation returns.
    pub fn set_structural<T: PartialEq + 'static>(&mut self, key: StructuralKey<T>, value: T) -> bool {
        let changed = self.structure.set(key, value);
        if changed {
            tracing::debug!("structural change deferred until the current operation completes");
        }
        changed
    }

    /// Ask for a recreate from inside a flush. During a recreate cycle the
    /// request is folded into it; otherwise it runs once the outer operation
    /// returns.
    pub fn request_recreate(&mut self) {
        if self.state.cycling {
            self.state.coalesced += 1;
            tracing::debug!("recreate request coalesced into in-flight cycle");
        } else {
            self.state.pending = true;
        }
    }
}

impl<H> Deref for NativeCx<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        &*self.handle
    }
}

impl<H> DerefMut for NativeCx<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        &mut *self.handle
    }
}
