//! Reference-counted objects shared across the adapter boundary.
//!
//! [`ObjectRef`] is the explicit shared-ownership handle: creating one
//! yields a count of 1, [`ObjectRef::add_ref`] hands out another separately
//! owned reference and [`ObjectRef::release`] (or dropping) gives one up.
//! When the last reference goes away the optional release action runs once
//! and the value is dropped, which transitively releases the references it
//! owns.
//!
//! Raw counted pointers never leave this module. A managed caller that can
//! only hold integers goes through an [`ExportTable`].

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use tether_core::alloc::HashMap;

use crate::error::{HandleError, HandleResult};

// The value stays the last field so `ObjectRef<Concrete>` can coerce to
// `ObjectRef<dyn Trait>`.
pub(crate) struct ObjectCell<T: ?Sized> {
    release: Cell<Option<Box<dyn FnOnce()>>>,
    value: RefCell<T>,
}

impl<T: ?Sized> Drop for ObjectCell<T> {
    fn drop(&mut self) {
        if let Some(action) = self.release.get_mut().take() {
            action();
        }
    }
}

/// An owned, counted reference to a shared object.
///
/// Every `ObjectRef` is one reference. Cloning is `add_ref`, dropping is
/// `release`. Objects are single-threaded and live on the UI thread.
pub struct ObjectRef<T: ?Sized>(pub(crate) Rc<ObjectCell<T>>);

impl<T> ObjectRef<T> {
    /// Create an object with a reference count of 1.
    pub fn new(value: T) -> Self {
        Self(Rc::new(ObjectCell {
            release: Cell::new(None),
            value: RefCell::new(value),
        }))
    }

    /// Create an object whose `action` runs exactly once, right before the
    /// value is dropped, when the last reference is released.
    pub fn with_release(value: T, action: impl FnOnce() + 'static) -> Self {
        Self(Rc::new(ObjectCell {
            release: Cell::new(Some(Box::new(action))),
            value: RefCell::new(value),
        }))
    }
}

impl<T: ?Sized> ObjectRef<T> {
    /// Take a new reference to the same object.
    pub fn add_ref(&self) -> Self {
        Self(Rc::clone(&self.0))
    }

    /// Give up this reference and return how many remain.
    ///
    /// Returning 0 means the object was torn down by this call.
    pub fn release(self) -> usize {
        let remaining = Rc::strong_count(&self.0) - 1;
        drop(self);
        remaining
    }

    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// # Panics
    ///
    /// Panics if the object is currently mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.value.borrow()
    }

    /// # Panics
    ///
    /// Panics if the object is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.value.borrow_mut()
    }

    pub fn try_borrow(&self) -> Option<Ref<'_, T>> {
        self.0.value.try_borrow().ok()
    }

    pub fn try_borrow_mut(&self) -> Option<RefMut<'_, T>> {
        self.0.value.try_borrow_mut().ok()
    }

    pub fn downgrade(&self) -> WeakObjectRef<T> {
        WeakObjectRef(Rc::downgrade(&self.0))
    }

    /// True if both references point at the same object.
    pub fn ptr_eq(&self, other: &ObjectRef<T>) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl<T: ?Sized> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        self.add_ref()
    }
}

impl<T: ?Sized> fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

/// A non-owning reference that does not keep the object alive.
pub struct WeakObjectRef<T: ?Sized>(pub(crate) Weak<ObjectCell<T>>);

impl<T: ?Sized> WeakObjectRef<T> {
    /// Take a new counted reference if the object is still alive.
    pub fn upgrade(&self) -> Option<ObjectRef<T>> {
        self.0.upgrade().map(ObjectRef)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    pub fn ptr_eq(&self, other: &WeakObjectRef<T>) -> bool {
        std::ptr::addr_eq(self.0.as_ptr(), other.0.as_ptr())
    }
}

impl<T: ?Sized> Clone for WeakObjectRef<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: ?Sized> fmt::Debug for WeakObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObjectRef")
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Opaque integer standing for exported references on the managed side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectToken(u64);

impl ObjectToken {
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// Table translating managed-side `AddRef`/`Release` calls on integer
/// tokens into [`ObjectRef`] references held on the native side.
pub struct ExportTable<T: ?Sized> {
    next: u64,
    entries: HashMap<ObjectToken, Vec<ObjectRef<T>>>,
}

impl<T: ?Sized> ExportTable<T> {
    pub fn new() -> Self {
        Self {
            next: 1,
            entries: HashMap::new(),
        }
    }

    /// Move one reference across the boundary and return its token.
    pub fn export(&mut self, object: ObjectRef<T>) -> ObjectToken {
        let token = ObjectToken(self.next);
        self.next += 1;
        self.entries.insert(token, vec![object]);
        token
    }

    /// Managed-side `AddRef`. Returns the object's new reference count.
    #[track_caller]
    pub fn add_ref(&mut self, token: ObjectToken) -> HandleResult<usize> {
        let held = self.held_mut(token)?;
        let extra = held[0].add_ref();
        held.push(extra);
        Ok(held[0].ref_count())
    }

    /// Managed-side `Release`. Returns how many references to the object remain.
    #[track_caller]
    pub fn release(&mut self, token: ObjectToken) -> HandleResult<usize> {
        let held = self.held_mut(token)?;
        let object = held.pop().ok_or_else(|| {
            HandleError::invalid_operation(format!("token {} holds no references", token.0))
        })?;
        if held.is_empty() {
            self.entries.remove(&token);
        }
        Ok(object.release())
    }

    /// Look up an exported object. The returned reference is new and owned
    /// by the caller.
    #[track_caller]
    pub fn get(&self, token: ObjectToken) -> HandleResult<ObjectRef<T>> {
        self.entries
            .get(&token)
            .and_then(|held| held.first())
            .map(ObjectRef::add_ref)
            .ok_or_else(|| HandleError::invalid_operation(format!("unknown token {}", token.0)))
    }

    /// Number of references the managed side holds through `token`.
    pub fn held(&self, token: ObjectToken) -> usize {
        self.entries.get(&token).map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[track_caller]
    fn held_mut(&mut self, token: ObjectToken) -> HandleResult<&mut Vec<ObjectRef<T>>> {
        self.entries
            .get_mut(&token)
            .ok_or_else(|| HandleError::invalid_operation(format!("unknown token {}", token.0)))
    }
}

impl<T: ?Sized> Default for ExportTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
