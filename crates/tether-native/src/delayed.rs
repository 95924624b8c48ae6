//! Delayed property slots.
//!
//! A slot holds a cached value plus a getter/setter pair bound to the native
//! handle. Reads and writes go to the live handle when it is there and to the
//! cache when it is not, so adapters can expose a property before, during and
//! after the handle's lifetime.
//!
//! The cache is only refreshed from the live handle by an explicit receive
//! step ([`DelayedValues::receive_all`], run before a handle is destroyed).
//! Writing to a backed slot goes straight to the handle and leaves the cache
//! as it was.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use bitflags::Flags;
use tether_core::profiling::profile_function;

use crate::error::{HandleError, HandleResult};
use crate::structure::NativeCx;

type Getter<H, T> = Box<dyn Fn(&H) -> T>;
type Setter<H, T> = Box<dyn Fn(&mut NativeCx<'_, H>, T)>;
type Backing<H> = Box<dyn Fn(&H) -> bool>;

/// A single delayed property.
pub struct DelayedValue<H, T> {
    cached: T,
    getter: Getter<H, T>,
    setter: Setter<H, T>,
    backing: Option<Backing<H>>,
}

impl<H, T: Clone> DelayedValue<H, T> {
    pub fn new(
        initial: T,
        getter: impl Fn(&H) -> T + 'static,
        setter: impl Fn(&mut NativeCx<'_, H>, T) + 'static,
    ) -> Self {
        Self {
            cached: initial,
            getter: Box::new(getter),
            setter: Box::new(setter),
            backing: None,
        }
    }

    /// Narrow the backing check for properties that live on a sub-resource
    /// of the handle, which may be missing even while the handle exists.
    pub fn with_backing(mut self, backed: impl Fn(&H) -> bool + 'static) -> Self {
        self.backing = Some(Box::new(backed));
        self
    }

    pub fn is_backed(&self, handle: Option<&H>) -> bool {
        handle.is_some_and(|h| self.is_backed_by(h))
    }

    /// Live value when backed, cached value otherwise.
    pub fn get(&self, handle: Option<&H>) -> T {
        match handle {
            Some(h) if self.is_backed_by(h) => (self.getter)(h),
            _ => self.cached.clone(),
        }
    }

    /// Write to the live handle when backed, to the cache otherwise.
    pub fn set(&mut self, native: Option<&mut NativeCx<'_, H>>, value: T) {
        match native {
            Some(cx) if self.is_backed_by(cx.handle()) => (self.setter)(cx, value),
            _ => self.cached = value,
        }
    }

    /// The cached value, whatever the handle state. Used to seed native
    /// construction before a handle exists.
    pub fn get_delayed(&self) -> &T {
        &self.cached
    }

    /// Read through the native getter, failing if the slot is not backed.
    #[track_caller]
    pub fn native_get(&self, handle: Option<&H>) -> HandleResult<T> {
        match handle {
            Some(h) if self.is_backed_by(h) => Ok((self.getter)(h)),
            _ => Err(HandleError::invalid_operation(
                "native getter used while the slot is not backed",
            )),
        }
    }

    /// Write through the native setter, failing if the slot is not backed.
    #[track_caller]
    pub fn native_set(&self, native: Option<&mut NativeCx<'_, H>>, value: T) -> HandleResult<()> {
        match native {
            Some(cx) if self.is_backed_by(cx.handle()) => {
                (self.setter)(cx, value);
                Ok(())
            }
            _ => Err(HandleError::invalid_operation(
                "native setter used while the slot is not backed",
            )),
        }
    }

    fn is_backed_by(&self, handle: &H) -> bool {
        self.backing.as_ref().is_none_or(|backed| backed(handle))
    }
}

impl<H, T: fmt::Debug> fmt::Debug for DelayedValue<H, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedValue")
            .field("cached", &self.cached)
            .field("sub_resource", &self.backing.is_some())
            .finish()
    }
}

struct FlagGroup<H, F> {
    mask: F,
    getter: Getter<H, F>,
    setter: Setter<H, F>,
}

/// Bit-addressed delayed property.
///
/// Bits are grouped by accessor pair: a group's getter and setter cover every
/// bit in its mask and are invoked once per flush, not once per bit. Bits
/// without a group are cache-only.
pub struct DelayedFlags<H, F> {
    cached: F,
    groups: Vec<FlagGroup<H, F>>,
    backing: Option<Backing<H>>,
}

impl<H, F> DelayedFlags<H, F>
where
    F: Flags + Copy + 'static,
{
    pub fn new(initial: F) -> Self {
        Self {
            cached: initial,
            groups: Vec::new(),
            backing: None,
        }
    }

    /// Register one accessor pair for all bits in `mask`. The getter reports
    /// the live state of those bits, the setter receives them all at once.
    ///
    /// # Panics
    ///
    /// Panics if `mask` overlaps a mask registered earlier.
    pub fn with_group(
        mut self,
        mask: F,
        getter: impl Fn(&H) -> F + 'static,
        setter: impl Fn(&mut NativeCx<'_, H>, F) + 'static,
    ) -> Self {
        assert!(
            !self.groups.iter().any(|group| group.mask.intersects(mask)),
            "flag groups must not overlap"
        );
        self.groups.push(FlagGroup {
            mask,
            getter: Box::new(getter),
            setter: Box::new(setter),
        });
        self
    }

    /// Register a per-bit accessor pair.
    pub fn with_bit(
        self,
        bit: F,
        getter: impl Fn(&H) -> bool + 'static,
        setter: impl Fn(&mut NativeCx<'_, H>, bool) + 'static,
    ) -> Self {
        self.with_group(
            bit,
            move |h| if getter(h) { bit } else { F::empty() },
            move |cx, bits| setter(cx, bits.contains(bit)),
        )
    }

    pub fn with_backing(mut self, backed: impl Fn(&H) -> bool + 'static) -> Self {
        self.backing = Some(Box::new(backed));
        self
    }

    pub fn is_backed(&self, handle: Option<&H>) -> bool {
        handle.is_some_and(|h| self.is_backed_by(h))
    }

    /// Whether every bit of `bit` is set. A mask spanning several groups
    /// combines their live state.
    pub fn get(&self, handle: Option<&H>, bit: F) -> bool {
        match self.group_of(bit) {
            Some(group) => match handle.filter(|h| self.is_backed_by(h)) {
                Some(h) => (group.getter)(h).contains(bit),
                None => self.cached.contains(bit),
            },
            None => self.bits(handle).contains(bit),
        }
    }

    /// Set or clear every bit of `bit`. Each group touched by the mask is
    /// written once; bits outside every group go to the cache.
    pub fn set(&mut self, native: Option<&mut NativeCx<'_, H>>, bit: F, value: bool) {
        let Some(cx) = native.filter(|cx| self.is_backed_by(cx.handle())) else {
            self.cached.set(bit, value);
            return;
        };
        let mut uncovered = bit;
        for group in self.groups.iter().filter(|group| group.mask.intersects(bit)) {
            let mut live = (group.getter)(cx.handle());
            live.set(masked(bit, group.mask), value);
            (group.setter)(&mut *cx, masked(live, group.mask));
            uncovered.remove(group.mask);
        }
        if !uncovered.is_empty() {
            self.cached.set(uncovered, value);
        }
    }

    /// All bits, live where backed and grouped, cached elsewhere.
    pub fn bits(&self, handle: Option<&H>) -> F {
        let mut bits = self.cached;
        if let Some(h) = handle.filter(|h| self.is_backed_by(h)) {
            for group in &self.groups {
                bits.remove(group.mask);
                bits.insert(masked((group.getter)(h), group.mask));
            }
        }
        bits
    }

    pub fn get_delayed(&self) -> F {
        self.cached
    }

    fn group_of(&self, bit: F) -> Option<&FlagGroup<H, F>> {
        self.groups.iter().find(|group| group.mask.contains(bit))
    }

    fn is_backed_by(&self, handle: &H) -> bool {
        self.backing.as_ref().is_none_or(|backed| backed(handle))
    }
}

fn masked<F: Flags>(value: F, mask: F) -> F {
    F::from_bits_retain(value.bits() & mask.bits())
}

/// Type-erased slot as stored in [`DelayedValues`].
pub trait DelayedSlot<H>: Any {
    /// Push the cached state into the live handle.
    fn apply(&self, cx: &mut NativeCx<'_, H>);
    /// Pull the live state back into the cache.
    fn receive(&mut self, handle: &H);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<H: 'static, T: Clone + 'static> DelayedSlot<H> for DelayedValue<H, T> {
    fn apply(&self, cx: &mut NativeCx<'_, H>) {
        if self.is_backed_by(cx.handle()) {
            (self.setter)(cx, self.cached.clone());
        }
    }

    fn receive(&mut self, handle: &H) {
        if self.is_backed_by(handle) {
            self.cached = (self.getter)(handle);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<H: 'static, F: Flags + Copy + 'static> DelayedSlot<H> for DelayedFlags<H, F> {
    fn apply(&self, cx: &mut NativeCx<'_, H>) {
        if !self.is_backed_by(cx.handle()) {
            return;
        }
        for group in &self.groups {
            (group.setter)(cx, masked(self.cached, group.mask));
        }
    }

    fn receive(&mut self, handle: &H) {
        if !self.is_backed_by(handle) {
            return;
        }
        for group in &self.groups {
            let live = masked((group.getter)(handle), group.mask);
            self.cached.remove(group.mask);
            self.cached.insert(live);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Typed key for a [`DelayedValue`] registered in [`DelayedValues`].
pub struct SlotKey<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

/// Typed key for a [`DelayedFlags`] registered in [`DelayedValues`].
pub struct FlagsKey<F> {
    index: usize,
    _marker: PhantomData<fn() -> F>,
}

macro_rules! impl_key {
    ($key:ident) => {
        impl<T> Clone for $key<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T> Copy for $key<T> {}

        impl<T> PartialEq for $key<T> {
            fn eq(&self, other: &Self) -> bool {
                self.index == other.index
            }
        }

        impl<T> Eq for $key<T> {}

        impl<T> fmt::Debug for $key<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($key), self.index)
            }
        }
    };
}

impl_key!(SlotKey);
impl_key!(FlagsKey);

/// Ordered registry of a control's delayed slots.
///
/// Slots are applied in registration order when a handle is created, since
/// native widgets often validate one property against another (text before
/// selection, range before value).
pub struct DelayedValues<H> {
    slots: Vec<Box<dyn DelayedSlot<H>>>,
}

impl<H: 'static> DelayedValues<H> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn add<T: Clone + 'static>(&mut self, slot: DelayedValue<H, T>) -> SlotKey<T> {
        self.slots.push(Box::new(slot));
        SlotKey {
            index: self.slots.len() - 1,
            _marker: PhantomData,
        }
    }

    pub fn add_flags<F: Flags + Copy + 'static>(&mut self, slot: DelayedFlags<H, F>) -> FlagsKey<F> {
        self.slots.push(Box::new(slot));
        FlagsKey {
            index: self.slots.len() - 1,
            _marker: PhantomData,
        }
    }

    /// # Panics
    ///
    /// Panics if `key` was issued by another registry.
    pub fn value<T: Clone + 'static>(&self, key: SlotKey<T>) -> &DelayedValue<H, T> {
        self.slots
            .get(key.index)
            .and_then(|slot| slot.as_any().downcast_ref())
            .unwrap_or_else(|| panic!("{:?} does not belong to this registry", key))
    }

    /// # Panics
    ///
    /// Panics if `key` was issued by another registry.
    pub fn value_mut<T: Clone + 'static>(&mut self, key: SlotKey<T>) -> &mut DelayedValue<H, T> {
        self.slots
            .get_mut(key.index)
            .and_then(|slot| slot.as_any_mut().downcast_mut())
            .unwrap_or_else(|| panic!("{:?} does not belong to this registry", key))
    }

    /// # Panics
    ///
    /// Panics if `key` was issued by another registry.
    pub fn flags_slot<F: Flags + Copy + 'static>(&self, key: FlagsKey<F>) -> &DelayedFlags<H, F> {
        self.slots
            .get(key.index)
            .and_then(|slot| slot.as_any().downcast_ref())
            .unwrap_or_else(|| panic!("{:?} does not belong to this registry", key))
    }

    /// # Panics
    ///
    /// Panics if `key` was issued by another registry.
    pub fn flags_slot_mut<F: Flags + Copy + 'static>(
        &mut self,
        key: FlagsKey<F>,
    ) -> &mut DelayedFlags<H, F> {
        self.slots
            .get_mut(key.index)
            .and_then(|slot| slot.as_any_mut().downcast_mut())
            .unwrap_or_else(|| panic!("{:?} does not belong to this registry", key))
    }

    pub fn get<T: Clone + 'static>(&self, key: SlotKey<T>, handle: Option<&H>) -> T {
        self.value(key).get(handle)
    }

    pub fn set<T: Clone + 'static>(
        &mut self,
        key: SlotKey<T>,
        native: Option<&mut NativeCx<'_, H>>,
        value: T,
    ) {
        self.value_mut(key).set(native, value)
    }

    pub fn get_delayed<T: Clone + 'static>(&self, key: SlotKey<T>) -> &T {
        self.value(key).get_delayed()
    }

    pub fn flag<F: Flags + Copy + 'static>(&self, key: FlagsKey<F>, handle: Option<&H>, bit: F) -> bool {
        self.flags_slot(key).get(handle, bit)
    }

    pub fn set_flag<F: Flags + Copy + 'static>(
        &mut self,
        key: FlagsKey<F>,
        native: Option<&mut NativeCx<'_, H>>,
        bit: F,
        value: bool,
    ) {
        self.flags_slot_mut(key).set(native, bit, value)
    }

    pub fn flags<F: Flags + Copy + 'static>(&self, key: FlagsKey<F>, handle: Option<&H>) -> F {
        self.flags_slot(key).bits(handle)
    }

    /// Push every cached value into the live handle, in registration order.
    pub fn apply_all(&self, cx: &mut NativeCx<'_, H>) {
        profile_function!();
        tracing::trace!("applying {} delayed slots", self.slots.len());
        for slot in &self.slots {
            slot.apply(cx);
        }
    }

    /// Pull every live value back into the cache, in registration order.
    pub fn receive_all(&mut self, handle: &H) {
        profile_function!();
        tracing::trace!("receiving {} delayed slots", self.slots.len());
        for slot in &mut self.slots {
            slot.receive(handle);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<H: 'static> Default for DelayedValues<H> {
    fn default() -> Self {
        Self::new()
    }
}
