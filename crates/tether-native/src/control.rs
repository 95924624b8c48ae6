//! Native handle lifecycle for one control.
//!
//! A [`Control`] owns at most one native handle built by its [`NativeWidget`]
//! factory. Logical properties live in delayed slots and survive any number
//! of destroy+create cycles. Changing a structural value while the handle
//! exists rebuilds it: live values are received into the cache, the handle
//! and its id go away, a new handle is built from the structural values and
//! the cache is applied to it again.
//!
//! Re-entrancy is tracked with one depth counter. Structural changes made
//! while an operation is in flight only bump the structure version; the
//! outermost operation compares that version with the one the handle was
//! built from and drains the difference before it returns.

use std::any::type_name;
use std::fmt;
use std::rc::{Rc, Weak};

use bitflags::{Flags, bitflags};
use tether_core::profiling::{profile_function, profile_scope};

use crate::delayed::{DelayedFlags, DelayedValue, DelayedValues, FlagsKey, SlotKey};
use crate::env::Environment;
use crate::error::{HandleError, HandleResult};
use crate::event::ControlEvent;
use crate::id::NativeId;
use crate::identity::{ItemCategory, RawHandle};
use crate::object::{ObjectCell, ObjectRef, WeakObjectRef};
use crate::structure::{NativeCx, RecreateState, StructuralKey, StructuralValues};

/// Factory hooks a widget adapter supplies to build and tear down its
/// native resource. Only `create`, `destroy` and `raw` are required.
pub trait NativeWidget: 'static {
    type Handle: 'static;

    /// Build the native resource from the structural values and the cached
    /// delayed values.
    fn create(&mut self, cx: &CreateContext<'_, Self::Handle>) -> HandleResult<Self::Handle>;

    fn destroy(&mut self, handle: Self::Handle);

    fn raw(&self, handle: &Self::Handle) -> RawHandle;

    fn bind_events(&mut self, _handle: &mut Self::Handle) {}

    fn unbind_events(&mut self, _handle: &mut Self::Handle) {}

    /// Move the handle under a new native parent.
    fn reparent(&mut self, _handle: &mut Self::Handle, _parent: Option<RawHandle>) {}

    /// Runs before delayed values are applied.
    fn on_created(&mut self, _handle: &mut Self::Handle) {}

    /// Runs after delayed values are received, before events are unbound.
    fn on_destroying(&mut self, _handle: &mut Self::Handle) {}

    fn on_destroyed(&mut self) {}

    /// Let go of a handle the control does not own
    /// (see [`ControlFlags::DO_NOT_DESTROY`]).
    fn detach(&mut self, handle: Self::Handle) {
        drop(handle);
    }
}

/// What a [`NativeWidget::create`] call can see.
pub struct CreateContext<'a, H> {
    id: Option<NativeId>,
    parent: Option<RawHandle>,
    structure: &'a StructuralValues,
    values: &'a DelayedValues<H>,
}

impl<H: 'static> CreateContext<'_, H> {
    /// Command id for command-bearing controls.
    pub fn id(&self) -> Option<NativeId> {
        self.id
    }

    /// Native parent the handle should be created under.
    pub fn parent(&self) -> Option<RawHandle> {
        self.parent
    }

    pub fn structural<T: 'static>(&self, key: StructuralKey<T>) -> &T {
        self.structure.get(key)
    }

    /// Cached value of a delayed slot, for toolkits that take an initial
    /// value at construction.
    pub fn get_delayed<T: Clone + 'static>(&self, key: SlotKey<T>) -> &T {
        self.values.get_delayed(key)
    }

    pub fn flags_delayed<F: Flags + Copy + 'static>(&self, key: FlagsKey<F>) -> F {
        self.values.flags_slot(key).get_delayed()
    }
}

bitflags! {
    /// Per-control behavior bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlFlags: u32 {
        /// The handle belongs to someone else; detach instead of destroying.
        const DO_NOT_DESTROY = 1 << 0;
    }
}

/// Where a control's native handle is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Absent,
    Created,
    Destroying,
    /// Terminal. The control was disposed.
    Destroyed,
}

/// Object-safe view of a control, used for parent/child links and by the
/// routing tables in [`Environment`].
pub trait ControlNode {
    fn raw_handle(&self) -> Option<RawHandle>;

    fn state(&self) -> HandleState;

    fn id(&self) -> Option<NativeId>;

    /// Destroy this control's handle and its children's, deepest first.
    fn destroy_handle_tree(&mut self) -> HandleResult<()>;

    /// Called by the parent when its native handle changes. Creates this
    /// control's handle if it is missing and the parent has one, reparents
    /// it otherwise.
    fn update_native_parent(&mut self, parent: Option<RawHandle>) -> HandleResult<()>;

    fn attach_parent(&mut self, parent: Option<WeakObjectRef<dyn ControlNode>>);

    /// Handle a routed event. Returns whether it was accepted.
    fn deliver(&mut self, event: ControlEvent) -> bool;
}

/// A logical control and its (possibly absent) native handle.
pub struct Control<W: NativeWidget> {
    env: Rc<Environment>,
    widget: W,
    handle: Option<W::Handle>,
    state: HandleState,
    values: DelayedValues<W::Handle>,
    structure: StructuralValues,
    recreate: RecreateState,
    flags: ControlFlags,
    command_category: Option<ItemCategory>,
    id: Option<NativeId>,
    raw: Option<RawHandle>,
    native_parent: Option<RawHandle>,
    parent: Option<WeakObjectRef<dyn ControlNode>>,
    children: Vec<ObjectRef<dyn ControlNode>>,
    self_ref: Option<WeakObjectRef<dyn ControlNode>>,
    events: Vec<ControlEvent>,
}

impl<W: NativeWidget> Control<W> {
    pub fn new(env: &Rc<Environment>, widget: W) -> Self {
        Self {
            env: Rc::clone(env),
            widget,
            handle: None,
            state: HandleState::Absent,
            values: DelayedValues::new(),
            structure: StructuralValues::new(),
            recreate: RecreateState::new(),
            flags: ControlFlags::empty(),
            command_category: None,
            id: None,
            raw: None,
            native_parent: None,
            parent: None,
            children: Vec::new(),
            self_ref: None,
            events: Vec::new(),
        }
    }

    /// Shared control, reachable from the routing tables.
    pub fn new_shared(env: &Rc<Environment>, widget: W) -> ObjectRef<Self> {
        Self::new(env, widget).into_shared()
    }

    /// Make this control command-bearing: every handle it builds gets a
    /// fresh id mapped to it in `category`. Requires a shared control.
    pub fn with_command_category(mut self, category: ItemCategory) -> Self {
        self.command_category = Some(category);
        self
    }

    pub fn into_shared(self) -> ObjectRef<Self> {
        let shared = ObjectRef::new(self);
        let node = shared.downgrade_node();
        shared.borrow_mut().self_ref = Some(node);
        shared
    }

    pub fn register_value<T: Clone + 'static>(
        &mut self,
        slot: DelayedValue<W::Handle, T>,
    ) -> SlotKey<T> {
        self.values.add(slot)
    }

    pub fn register_flags<F: Flags + Copy + 'static>(
        &mut self,
        slot: DelayedFlags<W::Handle, F>,
    ) -> FlagsKey<F> {
        self.values.add_flags(slot)
    }

    pub fn register_structural<T: PartialEq + 'static>(&mut self, initial: T) -> StructuralKey<T> {
        self.structure.register(initial)
    }

    pub fn env(&self) -> &Rc<Environment> {
        &self.env
    }

    pub fn widget(&self) -> &W {
        &self.widget
    }

    pub fn widget_mut(&mut self) -> &mut W {
        &mut self.widget
    }

    /// The live native handle, if any.
    pub fn handle(&self) -> Option<&W::Handle> {
        self.handle.as_ref()
    }

    pub fn handle_mut(&mut self) -> Option<&mut W::Handle> {
        self.handle.as_mut()
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn is_handle_created(&self) -> bool {
        self.state == HandleState::Created
    }

    pub fn id(&self) -> Option<NativeId> {
        self.id
    }

    pub fn raw_handle(&self) -> Option<RawHandle> {
        self.raw
    }

    pub fn command_category(&self) -> Option<ItemCategory> {
        self.command_category
    }

    pub fn flags(&self) -> ControlFlags {
        self.flags
    }

    pub fn set_do_not_destroy(&mut self, value: bool) {
        self.flags.set(ControlFlags::DO_NOT_DESTROY, value);
    }

    pub fn recreate_state(&self) -> &RecreateState {
        &self.recreate
    }

    /// Completed recreate cycles.
    pub fn recreates(&self) -> u64 {
        self.recreate.recreates()
    }

    /// Take the queued events. Nothing else empties the queue, so an
    /// adapter must drain it after every operation it drives.
    pub fn drain_events(&mut self) -> Vec<ControlEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn get<T: Clone + 'static>(&self, key: SlotKey<T>) -> T {
        self.values.get(key, self.handle.as_ref())
    }

    pub fn get_delayed<T: Clone + 'static>(&self, key: SlotKey<T>) -> &T {
        self.values.get_delayed(key)
    }

    /// Write a delayed value, then rebuild the handle if the write changed
    /// its structure.
    pub fn set<T: Clone + 'static>(&mut self, key: SlotKey<T>, value: T) -> HandleResult<()> {
        self.recreate.depth += 1;
        {
            let Self {
                handle,
                structure,
                recreate,
                values,
                ..
            } = self;
            let mut cx = handle
                .as_mut()
                .map(|handle| NativeCx::new(handle, structure, recreate));
            values.set(key, cx.as_mut(), value);
        }
        self.recreate.depth -= 1;
        self.settle()
    }

    #[track_caller]
    pub fn native_get<T: Clone + 'static>(&self, key: SlotKey<T>) -> HandleResult<T> {
        self.values.value(key).native_get(self.handle.as_ref())
    }

    #[track_caller]
    pub fn native_set<T: Clone + 'static>(&mut self, key: SlotKey<T>, value: T) -> HandleResult<()> {
        self.recreate.depth += 1;
        let result = {
            let Self {
                handle,
                structure,
                recreate,
                values,
                ..
            } = self;
            let mut cx = handle
                .as_mut()
                .map(|handle| NativeCx::new(handle, structure, recreate));
            values.value(key).native_set(cx.as_mut(), value)
        };
        self.recreate.depth -= 1;
        result?;
        self.settle()
    }

    pub fn flag<F: Flags + Copy + 'static>(&self, key: FlagsKey<F>, bit: F) -> bool {
        self.values.flag(key, self.handle.as_ref(), bit)
    }

    /// All bits of a flags slot.
    pub fn flag_bits<F: Flags + Copy + 'static>(&self, key: FlagsKey<F>) -> F {
        self.values.flags(key, self.handle.as_ref())
    }

    pub fn set_flag<F: Flags + Copy + 'static>(
        &mut self,
        key: FlagsKey<F>,
        bit: F,
        value: bool,
    ) -> HandleResult<()> {
        self.recreate.depth += 1;
        {
            let Self {
                handle,
                structure,
                recreate,
                values,
                ..
            } = self;
            let mut cx = handle
                .as_mut()
                .map(|handle| NativeCx::new(handle, structure, recreate));
            values.set_flag(key, cx.as_mut(), bit, value);
        }
        self.recreate.depth -= 1;
        self.settle()
    }

    pub fn structural<T: 'static>(&self, key: StructuralKey<T>) -> &T {
        self.structure.get(key)
    }

    /// Change a construction-only value. Rebuilds the handle if it exists
    /// and the value actually changed.
    pub fn set_structural<T: PartialEq + 'static>(
        &mut self,
        key: StructuralKey<T>,
        value: T,
    ) -> HandleResult<bool> {
        let changed = self.structure.set(key, value);
        if changed {
            self.settle()?;
        }
        Ok(changed)
    }

    /// Build the native handle.
    #[track_caller]
    pub fn create_handle(&mut self) -> HandleResult<()> {
        profile_function!();
        match self.state {
            HandleState::Absent => {}
            HandleState::Destroyed => {
                return Err(HandleError::invalid_operation("control is disposed"));
            }
            HandleState::Created | HandleState::Destroying => {
                return Err(HandleError::invalid_operation("handle is already created"));
            }
        }
        self.refresh_native_parent();
        self.recreate.depth += 1;
        let result = self.create_inner();
        self.recreate.depth -= 1;
        result?;
        self.settle()
    }

    /// Build the handle unless it already exists.
    pub fn ensure_handle(&mut self) -> HandleResult<()> {
        match self.state {
            HandleState::Created => Ok(()),
            _ => self.create_handle(),
        }
    }

    /// Destroy the native handle, keeping every delayed value. Children's
    /// handles go first.
    #[track_caller]
    pub fn destroy_handle(&mut self) -> HandleResult<()> {
        profile_function!();
        self.recreate.depth += 1;
        let result = self.destroy_inner(false);
        self.recreate.depth -= 1;
        result
    }

    /// Rebuild the handle if one exists. Returns whether a cycle ran; a
    /// request made while another operation is in flight is folded into it.
    pub fn recreate_handle_if_needed(&mut self) -> HandleResult<bool> {
        if self.recreate.in_flight() {
            self.recreate.coalesced += 1;
            tracing::warn!(
                "recreate of {} coalesced into the operation in flight",
                type_name::<W>()
            );
            return Ok(false);
        }
        if self.state != HandleState::Created {
            return Ok(false);
        }
        self.recreate_cycle()?;
        self.settle()?;
        Ok(true)
    }

    /// Final teardown. Live values are not received; the control cannot
    /// build a handle again.
    #[track_caller]
    pub fn dispose(&mut self) -> HandleResult<()> {
        match self.state {
            HandleState::Absent => {
                self.state = HandleState::Destroyed;
                Ok(())
            }
            HandleState::Created => {
                self.recreate.depth += 1;
                let result = self.destroy_inner(true);
                self.recreate.depth -= 1;
                result
            }
            HandleState::Destroying => Err(HandleError::invalid_operation(
                "handle is already being destroyed",
            )),
            HandleState::Destroyed => {
                Err(HandleError::invalid_operation("control is already disposed"))
            }
        }
    }

    /// Adopt `child`. If this control has a handle the child is created or
    /// reparented under it right away.
    pub fn add_child(&mut self, child: ObjectRef<dyn ControlNode>) -> HandleResult<()> {
        {
            let mut node = child
                .try_borrow_mut()
                .ok_or_else(|| HandleError::invalid_operation("child control is busy"))?;
            node.attach_parent(self.self_ref.clone());
            if self.state == HandleState::Created {
                node.update_native_parent(self.raw)?;
            }
        }
        self.children.push(child);
        Ok(())
    }

    /// Give up `child`. Its handle is destroyed since it cannot outlive
    /// the native parent it was built under.
    pub fn remove_child(
        &mut self,
        child: &ObjectRef<dyn ControlNode>,
    ) -> HandleResult<Option<ObjectRef<dyn ControlNode>>> {
        let Some(index) = self.children.iter().position(|c| c.ptr_eq(child)) else {
            return Ok(None);
        };
        {
            let mut node = self.children[index]
                .try_borrow_mut()
                .ok_or_else(|| HandleError::invalid_operation("child control is busy"))?;
            if node.state() == HandleState::Created {
                node.destroy_handle_tree()?;
            }
            node.update_native_parent(None)?;
            node.attach_parent(None);
        }
        Ok(Some(self.children.remove(index)))
    }

    pub fn children(&self) -> &[ObjectRef<dyn ControlNode>] {
        &self.children
    }

    /// The parent control, add-ref'd for the caller.
    pub fn parent_ref_counted(&self) -> Option<ObjectRef<dyn ControlNode>> {
        self.parent.as_ref()?.upgrade()
    }

    /// Take the native parent from the parent control's live handle. A
    /// parent that is busy is the one building this control and has already
    /// passed its handle down.
    fn refresh_native_parent(&mut self) {
        let Some(link) = self.parent.as_ref() else {
            return;
        };
        match link.upgrade() {
            Some(parent) => {
                if let Some(node) = parent.try_borrow() {
                    self.native_parent = node.raw_handle();
                }
            }
            None => self.native_parent = None,
        }
    }

    fn create_inner(&mut self) -> HandleResult<()> {
        let built = self.build_handle();
        if let Some(raw) = self.raw {
            self.env.end_creating(raw);
        }
        built?;

        tracing::debug!(
            "Created {} ({:?}, id {:?})",
            type_name::<W>(),
            self.raw,
            self.id
        );
        self.events.push(ControlEvent::HandleCreated);
        self.update_children()
    }

    fn build_handle(&mut self) -> HandleResult<()> {
        let id = self.acquire_id()?;
        self.recreate.created_version = self.structure.version();
        self.recreate.pending = false;

        let created = {
            let cx = CreateContext {
                id,
                parent: self.native_parent,
                structure: &self.structure,
                values: &self.values,
            };
            self.widget.create(&cx)
        };
        let mut handle = match created {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!("Failed to create {}: {}", type_name::<W>(), err);
                if let Some(id) = id {
                    self.env.free_id(id)?;
                }
                return Err(err);
            }
        };

        self.widget.bind_events(&mut handle);
        let raw = self.widget.raw(&handle);
        if let Err(err) = self.register_identity(raw, id) {
            self.widget.unbind_events(&mut handle);
            self.widget.destroy(handle);
            if let Some(id) = id {
                self.env.free_id(id)?;
            }
            return Err(err);
        }

        // Notifications raised by the hooks and setters below are dropped.
        self.env.begin_creating(raw);
        self.id = id;
        self.raw = Some(raw);
        self.state = HandleState::Created;
        let handle = self.handle.insert(handle);
        self.widget.on_created(handle);
        self.apply_values();
        Ok(())
    }

    #[track_caller]
    fn acquire_id(&mut self) -> HandleResult<Option<NativeId>> {
        if self.command_category.is_none() {
            return Ok(None);
        }
        if self.self_ref.is_none() {
            return Err(HandleError::invalid_operation("missing owner reference"));
        }
        self.env.allocate_id().map(Some)
    }

    fn register_identity(&mut self, raw: RawHandle, id: Option<NativeId>) -> HandleResult<()> {
        let Some(owner) = self.self_ref.clone() else {
            return Ok(());
        };
        self.env.associate_handle(raw, owner.clone())?;
        if let (Some(category), Some(id)) = (self.command_category, id) {
            if let Err(err) = self.env.register_command(category, id, owner) {
                self.env.remove_handle_association(raw);
                return Err(err);
            }
        }
        Ok(())
    }

    fn apply_values(&mut self) {
        let Self {
            handle: Some(handle),
            structure,
            recreate,
            values,
            ..
        } = self
        else {
            return;
        };
        let mut cx = NativeCx::new(handle, structure, recreate);
        values.apply_all(&mut cx);
    }

    fn update_children(&mut self) -> HandleResult<()> {
        for child in &self.children {
            child
                .try_borrow_mut()
                .ok_or_else(|| HandleError::invalid_operation("child control is busy"))?
                .update_native_parent(self.raw)?;
        }
        Ok(())
    }

    #[track_caller]
    fn destroy_inner(&mut self, disposing: bool) -> HandleResult<()> {
        match self.state {
            HandleState::Created => {}
            HandleState::Destroying => {
                return Err(HandleError::invalid_operation(
                    "handle is already being destroyed",
                ));
            }
            HandleState::Absent | HandleState::Destroyed => {
                return Err(HandleError::invalid_operation("handle is not created"));
            }
        }

        for child in &self.children {
            let mut node = child
                .try_borrow_mut()
                .ok_or_else(|| HandleError::invalid_operation("child control is busy"))?;
            if node.state() == HandleState::Created {
                node.destroy_handle_tree()?;
            }
            node.update_native_parent(None)?;
        }

        self.state = HandleState::Destroying;
        if let Some(handle) = self.handle.as_mut() {
            if !disposing {
                self.values.receive_all(handle);
            }
            self.events.push(ControlEvent::HandleDestroying);
            self.widget.on_destroying(handle);
            self.widget.unbind_events(handle);
        }

        if let Some(raw) = self.raw.take() {
            if self.self_ref.is_some() {
                self.env.remove_handle_association(raw);
            }
        }
        let unregistered = match (self.command_category, self.id.take()) {
            (Some(category), Some(id)) => self.env.unregister_command(category, id),
            _ => Ok(()),
        };

        if let Some(handle) = self.handle.take() {
            if self.flags.contains(ControlFlags::DO_NOT_DESTROY) {
                self.widget.detach(handle);
            } else {
                self.widget.destroy(handle);
            }
        }
        self.state = if disposing {
            HandleState::Destroyed
        } else {
            HandleState::Absent
        };
        self.widget.on_destroyed();
        self.events.push(ControlEvent::HandleDestroyed);
        tracing::debug!("Destroyed {} handle", type_name::<W>());
        unregistered
    }

    fn recreate_cycle(&mut self) -> HandleResult<()> {
        profile_function!();
        tracing::debug!("Recreating {} handle", type_name::<W>());
        self.recreate.depth += 1;
        self.recreate.cycling = true;
        let result = self.destroy_inner(false).and_then(|()| self.create_inner());
        self.recreate.cycling = false;
        self.recreate.depth -= 1;
        result?;
        self.recreate.recreates += 1;
        self.events.push(ControlEvent::Recreated);
        Ok(())
    }

    /// Drain structural changes made while an operation was in flight.
    /// Only the outermost operation does any work here.
    fn settle(&mut self) -> HandleResult<()> {
        if self.recreate.in_flight() {
            return Ok(());
        }
        let max_passes = self.env.config().max_settle_passes;
        let mut passes = 0;
        while self.state == HandleState::Created
            && (self.recreate.pending || self.structure.version() != self.recreate.created_version)
        {
            if passes == max_passes {
                return Err(HandleError::invalid_operation("structure did not settle"));
            }
            profile_scope!("settle_pass");
            passes += 1;
            self.recreate.pending = false;
            self.recreate_cycle()?;
        }
        Ok(())
    }
}

impl<W: NativeWidget> ControlNode for Control<W> {
    fn raw_handle(&self) -> Option<RawHandle> {
        self.raw
    }

    fn state(&self) -> HandleState {
        self.state
    }

    fn id(&self) -> Option<NativeId> {
        self.id
    }

    fn destroy_handle_tree(&mut self) -> HandleResult<()> {
        self.destroy_handle()
    }

    fn update_native_parent(&mut self, parent: Option<RawHandle>) -> HandleResult<()> {
        self.native_parent = parent;
        match self.state {
            HandleState::Created => {
                if let Some(handle) = self.handle.as_mut() {
                    self.widget.reparent(handle, parent);
                }
                Ok(())
            }
            HandleState::Absent if parent.is_some() => self.create_handle(),
            _ => Ok(()),
        }
    }

    fn attach_parent(&mut self, parent: Option<WeakObjectRef<dyn ControlNode>>) {
        self.parent = parent;
    }

    fn deliver(&mut self, event: ControlEvent) -> bool {
        if self.state != HandleState::Created {
            return false;
        }
        self.events.push(event);
        true
    }
}

impl<W: NativeWidget> Drop for Control<W> {
    fn drop(&mut self) {
        if self.state == HandleState::Destroyed {
            return;
        }
        if let Err(err) = self.dispose() {
            tracing::error!("Failed to dispose {}: {}", type_name::<W>(), err);
        }
    }
}

impl<W: NativeWidget> fmt::Debug for Control<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Control")
            .field("widget", &type_name::<W>())
            .field("state", &self.state)
            .field("id", &self.id)
            .field("raw", &self.raw)
            .field("flags", &self.flags)
            .field("children", &self.children.len())
            .finish()
    }
}

impl<W: NativeWidget> ObjectRef<Control<W>> {
    /// Erase the widget type.
    pub fn into_node(self) -> ObjectRef<dyn ControlNode> {
        ObjectRef(self.0)
    }

    /// Type-erased reference to the same control.
    pub fn as_node(&self) -> ObjectRef<dyn ControlNode> {
        self.add_ref().into_node()
    }

    pub fn downgrade_node(&self) -> WeakObjectRef<dyn ControlNode> {
        let weak: Weak<ObjectCell<Control<W>>> = Rc::downgrade(&self.0);
        WeakObjectRef(weak)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::cell::{Cell, RefCell};

    struct Label {
        text: String,
    }

    #[derive(Default)]
    struct LabelWidget {
        next_raw: u64,
        created: Rc<Cell<u32>>,
        destroyed: Rc<Cell<u32>>,
        fail: bool,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl NativeWidget for LabelWidget {
        type Handle = Label;

        fn create(&mut self, _cx: &CreateContext<'_, Label>) -> HandleResult<Label> {
            if self.fail {
                return Err(HandleError::native("refused"));
            }
            self.next_raw += 1;
            self.created.set(self.created.get() + 1);
            self.log.borrow_mut().push("create");
            Ok(Label {
                text: format!("#{}", self.next_raw),
            })
        }

        fn destroy(&mut self, _handle: Label) {
            self.destroyed.set(self.destroyed.get() + 1);
            self.log.borrow_mut().push("destroy");
        }

        fn raw(&self, _handle: &Label) -> RawHandle {
            RawHandle::from_raw(0x1000 + self.next_raw)
        }

        fn on_destroying(&mut self, _handle: &mut Label) {
            self.log.borrow_mut().push("destroying");
        }

        fn detach(&mut self, _handle: Label) {
            self.log.borrow_mut().push("detach");
        }
    }

    fn env() -> Rc<Environment> {
        Environment::new(EngineConfig::default()).unwrap()
    }

    fn text_slot() -> DelayedValue<Label, String> {
        DelayedValue::new(
            String::new(),
            |l: &Label| l.text.clone(),
            |cx: &mut NativeCx<'_, Label>, v: String| cx.text = v,
        )
    }

    #[test]
    fn test_create_applies_cached_values() {
        let env = env();
        let mut control = Control::new(&env, LabelWidget::default());
        let text = control.register_value(text_slot());

        control.set(text, "hello".into()).unwrap();
        assert_eq!(control.get(text), "hello");

        control.create_handle().unwrap();
        assert_eq!(control.state(), HandleState::Created);
        assert_eq!(control.handle().unwrap().text, "hello");
        assert_eq!(control.drain_events(), vec![ControlEvent::HandleCreated]);
    }

    #[test]
    fn test_double_create_and_destroy_while_absent_fail() {
        let env = env();
        let mut control = Control::new(&env, LabelWidget::default());
        assert!(control.destroy_handle().unwrap_err().is_invalid_operation());

        control.create_handle().unwrap();
        assert!(control.create_handle().unwrap_err().is_invalid_operation());
        control.ensure_handle().unwrap();
    }

    #[test]
    fn test_destroy_order() {
        let env = env();
        let widget = LabelWidget::default();
        let log = Rc::clone(&widget.log);
        let mut control = Control::new(&env, widget);
        control.create_handle().unwrap();
        control.destroy_handle().unwrap();

        assert_eq!(*log.borrow(), vec!["create", "destroying", "destroy"]);
        assert_eq!(control.state(), HandleState::Absent);
        assert!(control.handle().is_none());
        assert_eq!(control.raw_handle(), None);
    }

    #[test]
    fn test_do_not_destroy_detaches() {
        let env = env();
        let widget = LabelWidget::default();
        let log = Rc::clone(&widget.log);
        let mut control = Control::new(&env, widget);
        control.set_do_not_destroy(true);
        control.create_handle().unwrap();
        control.destroy_handle().unwrap();

        assert_eq!(*log.borrow(), vec!["create", "destroying", "detach"]);
    }

    #[test]
    fn test_failed_create_leaves_handle_null() {
        let env = env();
        let widget = LabelWidget {
            fail: true,
            ..Default::default()
        };
        let mut control = Control::new(&env, widget);

        let err = control.create_handle().unwrap_err();
        assert!(matches!(err, HandleError::Native { .. }));
        assert_eq!(control.state(), HandleState::Absent);
        assert!(control.handle().is_none());
        assert_eq!(env.handle_count(), 0);

        control.widget_mut().fail = false;
        control.create_handle().unwrap();
    }

    #[test]
    fn test_command_category_requires_shared_owner() {
        let env = env();
        let mut control =
            Control::new(&env, LabelWidget::default()).with_command_category(ItemCategory::MenuItem);

        let err = control.create_handle().unwrap_err();
        assert!(err.is_invalid_operation());
        assert!(err.to_string().contains("missing owner reference"));
        assert_eq!(env.live_id_count(), 0);
    }

    #[test]
    fn test_drain_empties_event_queue() {
        let env = env();
        let mut control = Control::new(&env, LabelWidget::default());
        control.create_handle().unwrap();
        control.recreate_handle_if_needed().unwrap();

        assert_eq!(control.drain_events().len(), 5);
        assert!(control.drain_events().is_empty());
    }

    #[test]
    fn test_deliver_requires_live_handle() {
        let env = env();
        let mut control = Control::new(&env, LabelWidget::default());
        assert!(!control.deliver(ControlEvent::Native { code: 1 }));

        control.create_handle().unwrap();
        control.drain_events();
        assert!(control.deliver(ControlEvent::Native { code: 2 }));
        assert_eq!(control.drain_events(), vec![ControlEvent::Native { code: 2 }]);
    }

    #[test]
    fn test_explicit_recreate_preserves_values() {
        let env = env();
        let widget = LabelWidget::default();
        let created = Rc::clone(&widget.created);
        let mut control = Control::new(&env, widget);
        let text = control.register_value(text_slot());
        control.create_handle().unwrap();

        control.handle_mut().unwrap().text = "typed".into();
        assert!(control.recreate_handle_if_needed().unwrap());

        assert_eq!(created.get(), 2);
        assert_eq!(control.recreates(), 1);
        assert_eq!(control.get(text), "typed");
    }

    #[test]
    fn test_dispose_is_terminal() {
        let env = env();
        let widget = LabelWidget::default();
        let destroyed = Rc::clone(&widget.destroyed);
        let mut control = Control::new(&env, widget);
        control.create_handle().unwrap();

        control.dispose().unwrap();
        assert_eq!(control.state(), HandleState::Destroyed);
        assert_eq!(destroyed.get(), 1);
        assert!(control.dispose().unwrap_err().is_invalid_operation());
        assert!(control.create_handle().unwrap_err().is_invalid_operation());

        drop(control);
        assert_eq!(destroyed.get(), 1);
    }

    #[test]
    fn test_drop_destroys_live_handle() {
        let env = env();
        let widget = LabelWidget::default();
        let destroyed = Rc::clone(&widget.destroyed);
        let mut control = Control::new(&env, widget);
        control.create_handle().unwrap();

        drop(control);
        assert_eq!(destroyed.get(), 1);
    }
}
