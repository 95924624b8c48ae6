//! Id-to-owner tables for routing native callbacks.
//!
//! Native callbacks only carry an integer (a command id or a raw window
//! pointer). These tables map that integer back to the logical owner. They
//! are populated when the native representation is created and erased when
//! it is destroyed; a lookup miss is a dropped event, not an error.

use std::fmt;
use std::hash::Hash;

use tether_core::alloc::HashMap;

use crate::error::{HandleError, HandleResult};

/// Opaque value identifying a native resource (a window pointer, a GTK
/// widget address, ...). Only compared and hashed, never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(u64);

impl RawHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHandle(0x{:x})", self.0)
    }
}

/// Category of command-bearing item. Each category has its own id map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemCategory {
    Control,
    MenuItem,
    ToolItem,
    Custom(u16),
}

/// A table from ids to owners.
pub struct IdentityMap<K, O> {
    entries: HashMap<K, O>,
}

impl<K, O> IdentityMap<K, O>
where
    K: Copy + Eq + Hash + fmt::Debug,
{
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register an owner. An id can only be mapped once at a time.
    #[track_caller]
    pub fn insert(&mut self, key: K, owner: O) -> HandleResult<()> {
        if self.entries.contains_key(&key) {
            return Err(HandleError::invalid_operation(format!(
                "{:?} is already mapped to an owner",
                key
            )));
        }
        self.entries.insert(key, owner);
        Ok(())
    }

    pub fn remove(&mut self, key: K) -> Option<O> {
        self.entries.remove(&key)
    }

    pub fn find(&self, key: K) -> Option<&O> {
        let owner = self.entries.get(&key);
        if owner.is_none() {
            tracing::trace!("no owner for {:?}", key);
        }
        owner
    }

    pub fn contains(&self, key: K) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &O)> + '_ {
        self.entries.iter().map(|(&key, owner)| (key, owner))
    }
}

impl<K, O> Default for IdentityMap<K, O>
where
    K: Copy + Eq + Hash + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}
