//! Scarce native command id allocation.
//!
//! Native toolkits route menu and tool commands by small integers. The
//! [`IdManager`] hands them out above the toolkit's reserved range and keeps
//! track of which ones are live so an id is never owned twice.

use std::fmt;
use std::num::NonZeroU32;

use tether_core::alloc::HashSet;

use crate::config::{IdConfig, IdReusePolicy};
use crate::error::{HandleError, HandleResult};

/// A native command id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NativeId(NonZeroU32);

impl NativeId {
    /// Wrap a raw id. Returns `None` for zero, which no toolkit uses.
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    pub const fn get(&self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for NativeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeId({})", self.0)
    }
}

tether_core::static_assertions::assert_eq_size!(NativeId, Option<NativeId>);

/// Allocator for native command ids.
///
/// Fresh ids come from a monotonic counter starting just above
/// [`IdConfig::reserved_floor`]. Freed ids go onto a stack; with the default
/// [`IdReusePolicy::AfterSaturation`] that stack is only consulted once the
/// counter reaches [`IdConfig::max`].
#[derive(Debug)]
pub struct IdManager {
    next: u32,
    max: u32,
    reuse: IdReusePolicy,
    freed: Vec<NativeId>,
    live: HashSet<NativeId>,
}

impl IdManager {
    pub fn new(config: IdConfig) -> Self {
        Self {
            next: config.reserved_floor.saturating_add(1),
            max: config.max,
            reuse: config.reuse,
            freed: Vec::new(),
            live: HashSet::new(),
        }
    }

    /// Hand out an id that is not live anywhere.
    #[track_caller]
    pub fn allocate(&mut self) -> HandleResult<NativeId> {
        let id = match self.reuse {
            IdReusePolicy::AfterSaturation => match self.take_fresh() {
                Some(id) => Some(id),
                None => self.freed.pop(),
            },
            IdReusePolicy::FreedFirst => match self.freed.pop() {
                Some(id) => Some(id),
                None => self.take_fresh(),
            },
        };

        let id = id.ok_or_else(|| HandleError::exhausted("native command ids"))?;
        debug_assert!(!self.live.contains(&id), "{} handed out twice", id);
        self.live.insert(id);
        tracing::trace!("allocated {}", id);
        Ok(id)
    }

    /// Return an id to the pool.
    ///
    /// The id is pushed onto the freed stack whatever the counter state is.
    /// Freeing an id that is not live is an invalid operation.
    #[track_caller]
    pub fn free(&mut self, id: NativeId) -> HandleResult<()> {
        if !self.live.remove(&id) {
            return Err(HandleError::invalid_operation(format!(
                "{} is not live and cannot be freed",
                id
            )));
        }
        self.freed.push(id);
        tracing::trace!("freed {}", id);
        Ok(())
    }

    pub fn is_live(&self, id: NativeId) -> bool {
        self.live.contains(&id)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn freed_count(&self) -> usize {
        self.freed.len()
    }

    /// True once the counter has handed out its last fresh id.
    pub fn is_saturated(&self) -> bool {
        self.next >= self.max
    }

    fn take_fresh(&mut self) -> Option<NativeId> {
        if self.next >= self.max {
            return None;
        }
        let id = NativeId::new(self.next)?;
        self.next += 1;
        Some(id)
    }
}

impl Default for IdManager {
    fn default() -> Self {
        Self::new(IdConfig::default())
    }
}
