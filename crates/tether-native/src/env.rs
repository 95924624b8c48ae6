//! The engine context shared by every control of one toolkit instance.
//!
//! The id pool, the per-category command tables and the handle side table
//! live here instead of in process-wide statics, so independent instances
//! (and tests) never see each other's ids.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tether_core::alloc::{HashMap, HashSet};

use crate::config::EngineConfig;
use crate::control::ControlNode;
use crate::error::HandleResult;
use crate::event::ControlEvent;
use crate::id::{IdManager, NativeId};
use crate::identity::{IdentityMap, ItemCategory, RawHandle};
use crate::object::{ObjectRef, WeakObjectRef};

type Owner = WeakObjectRef<dyn ControlNode>;

/// Shared engine state. Always handled through an `Rc`.
pub struct Environment {
    config: EngineConfig,
    ids: RefCell<IdManager>,
    commands: RefCell<HashMap<ItemCategory, IdentityMap<NativeId, Owner>>>,
    handles: RefCell<IdentityMap<RawHandle, Owner>>,
    creating: RefCell<HashSet<RawHandle>>,
}

impl Environment {
    pub fn new(config: EngineConfig) -> HandleResult<Rc<Self>> {
        config.validate()?;
        tracing::info!(
            "Creating environment (ids {}..{}, {:?})",
            config.ids.reserved_floor + 1,
            config.ids.max,
            config.ids.reuse
        );
        Ok(Rc::new(Self {
            config,
            ids: RefCell::new(IdManager::new(config.ids)),
            commands: RefCell::new(HashMap::new()),
            handles: RefCell::new(IdentityMap::new()),
            creating: RefCell::new(HashSet::default()),
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[track_caller]
    pub fn allocate_id(&self) -> HandleResult<NativeId> {
        self.ids.borrow_mut().allocate()
    }

    #[track_caller]
    pub fn free_id(&self, id: NativeId) -> HandleResult<()> {
        self.ids.borrow_mut().free(id)
    }

    pub fn is_id_live(&self, id: NativeId) -> bool {
        self.ids.borrow().is_live(id)
    }

    pub fn live_id_count(&self) -> usize {
        self.ids.borrow().live_count()
    }

    /// Map an allocated id to its owner in `category`.
    #[track_caller]
    pub fn register_command(
        &self,
        category: ItemCategory,
        id: NativeId,
        owner: WeakObjectRef<dyn ControlNode>,
    ) -> HandleResult<()> {
        tracing::trace!("register {:?} {}", category, id);
        self.commands
            .borrow_mut()
            .entry(category)
            .or_default()
            .insert(id, owner)
    }

    /// Erase the mapping, then give the id back to the pool. The entry goes
    /// first so the id is never free while still mapped.
    #[track_caller]
    pub fn unregister_command(&self, category: ItemCategory, id: NativeId) -> HandleResult<()> {
        tracing::trace!("unregister {:?} {}", category, id);
        let removed = self
            .commands
            .borrow_mut()
            .get_mut(&category)
            .and_then(|map| map.remove(id));
        if removed.is_none() {
            tracing::warn!("{} was not mapped in {:?}", id, category);
        }
        self.free_id(id)
    }

    /// Owner of `id` in `category`, add-ref'd for the caller. Stale ids and
    /// owners that are already gone yield `None`.
    pub fn find_owner_by_id(
        &self,
        category: ItemCategory,
        id: NativeId,
    ) -> Option<ObjectRef<dyn ControlNode>> {
        let commands = self.commands.borrow();
        commands.get(&category)?.find(id)?.upgrade()
    }

    pub fn command_count(&self, category: ItemCategory) -> usize {
        self.commands
            .borrow()
            .get(&category)
            .map_or(0, IdentityMap::len)
    }

    /// Route a native command to its owner. Returns whether it was handled;
    /// a miss is a dropped event, not an error.
    pub fn dispatch_command(&self, category: ItemCategory, id: NativeId) -> bool {
        match self.find_owner_by_id(category, id) {
            Some(owner) => deliver_to(&owner, ControlEvent::Command(id)),
            None => {
                tracing::trace!("dropping command {} for {:?}", id, category);
                false
            }
        }
    }

    #[track_caller]
    pub fn associate_handle(
        &self,
        raw: RawHandle,
        owner: WeakObjectRef<dyn ControlNode>,
    ) -> HandleResult<()> {
        self.handles.borrow_mut().insert(raw, owner)
    }

    pub fn remove_handle_association(&self, raw: RawHandle) -> bool {
        self.handles.borrow_mut().remove(raw).is_some()
    }

    /// Control owning a raw native handle, add-ref'd for the caller.
    pub fn find_control_by_handle(&self, raw: RawHandle) -> Option<ObjectRef<dyn ControlNode>> {
        self.handles.borrow().find(raw)?.upgrade()
    }

    pub fn handle_count(&self) -> usize {
        self.handles.borrow().len()
    }

    /// Whether the control owning `raw` is still building its handle.
    pub fn is_creating(&self, raw: RawHandle) -> bool {
        self.creating.borrow().contains(&raw)
    }

    pub(crate) fn begin_creating(&self, raw: RawHandle) {
        self.creating.borrow_mut().insert(raw);
    }

    pub(crate) fn end_creating(&self, raw: RawHandle) {
        self.creating.borrow_mut().remove(&raw);
    }

    /// Route a native notification to the control owning `raw`. Handles
    /// that are still being created drop their notifications.
    pub fn deliver_native(&self, raw: RawHandle, code: u32) -> bool {
        if self.is_creating(raw) {
            tracing::trace!("native event {} suppressed while creating {}", code, raw);
            return false;
        }
        match self.find_control_by_handle(raw) {
            Some(owner) => deliver_to(&owner, ControlEvent::Native { code }),
            None => {
                tracing::trace!("dropping native event {} for {}", code, raw);
                false
            }
        }
    }
}

fn deliver_to(owner: &ObjectRef<dyn ControlNode>, event: ControlEvent) -> bool {
    // The owner is busy when the event was raised by one of its own
    // operations.
    match owner.try_borrow_mut() {
        Some(mut node) => node.deliver(event),
        None => {
            tracing::warn!("owner is busy, dropping {:?}", event);
            false
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("config", &self.config)
            .field("live_ids", &self.live_id_count())
            .field("handles", &self.handle_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdReusePolicy;
    use crate::control::HandleState;
    use crate::error::HandleError;

    /// Owner that only records what it is sent.
    #[derive(Default)]
    struct Recorder {
        received: Vec<ControlEvent>,
    }

    impl ControlNode for Recorder {
        fn raw_handle(&self) -> Option<RawHandle> {
            None
        }

        fn state(&self) -> HandleState {
            HandleState::Created
        }

        fn id(&self) -> Option<NativeId> {
            None
        }

        fn destroy_handle_tree(&mut self) -> HandleResult<()> {
            Ok(())
        }

        fn update_native_parent(&mut self, _parent: Option<RawHandle>) -> HandleResult<()> {
            Ok(())
        }

        fn attach_parent(&mut self, _parent: Option<WeakObjectRef<dyn ControlNode>>) {}

        fn deliver(&mut self, event: ControlEvent) -> bool {
            self.received.push(event);
            true
        }
    }

    fn recorder() -> (ObjectRef<Recorder>, WeakObjectRef<dyn ControlNode>) {
        let owner = ObjectRef::new(Recorder::default());
        let node: ObjectRef<dyn ControlNode> = ObjectRef(owner.0.clone());
        let weak = node.downgrade();
        (owner, weak)
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EngineConfig::default().with_id_range(100, 100);
        assert!(matches!(
            Environment::new(config),
            Err(HandleError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_command_round_trip() {
        let env = Environment::new(EngineConfig::default()).unwrap();
        let (owner, weak) = recorder();
        let id = env.allocate_id().unwrap();

        env.register_command(ItemCategory::MenuItem, id, weak).unwrap();
        assert!(env.dispatch_command(ItemCategory::MenuItem, id));
        assert_eq!(owner.borrow().received, vec![ControlEvent::Command(id)]);

        env.unregister_command(ItemCategory::MenuItem, id).unwrap();
        assert!(!env.is_id_live(id));
        assert!(!env.dispatch_command(ItemCategory::MenuItem, id));
        assert_eq!(owner.borrow().received.len(), 1);
    }

    #[test]
    fn test_id_mapped_once() {
        let env = Environment::new(EngineConfig::default()).unwrap();
        let (_owner, weak) = recorder();
        let id = env.allocate_id().unwrap();

        env.register_command(ItemCategory::ToolItem, id, weak.clone())
            .unwrap();
        let err = env
            .register_command(ItemCategory::ToolItem, id, weak)
            .unwrap_err();
        assert!(err.is_invalid_operation());
    }

    #[test]
    fn test_dead_owner_is_a_miss() {
        let config = EngineConfig::default().with_reuse(IdReusePolicy::FreedFirst);
        let env = Environment::new(config).unwrap();
        let (owner, weak) = recorder();
        let raw = RawHandle::from_raw(0xbeef);
        env.associate_handle(raw, weak).unwrap();

        drop(owner);
        assert!(env.find_control_by_handle(raw).is_none());
        assert!(!env.deliver_native(raw, 3));
        assert!(env.remove_handle_association(raw));
        assert_eq!(env.handle_count(), 0);
    }

    #[test]
    fn test_native_event_dropped_while_creating() {
        let env = Environment::new(EngineConfig::default()).unwrap();
        let (owner, weak) = recorder();
        let raw = RawHandle::from_raw(0x42);
        env.associate_handle(raw, weak).unwrap();

        env.begin_creating(raw);
        assert!(env.is_creating(raw));
        assert!(!env.deliver_native(raw, 1));
        assert!(owner.borrow().received.is_empty());

        env.end_creating(raw);
        assert!(env.deliver_native(raw, 2));
        assert_eq!(owner.borrow().received, vec![ControlEvent::Native { code: 2 }]);
    }
}
