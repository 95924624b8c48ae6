//! Configuration for a Tether [`Environment`](crate::Environment).

use crate::error::{HandleError, HandleResult};

/// Order in which freed native ids are handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdReusePolicy {
    /// Freed ids are only consulted once the counter reaches its maximum.
    /// In practice ids are almost never recycled.
    #[default]
    AfterSaturation,
    /// Freed ids are handed out before the counter advances.
    FreedFirst,
}

/// Native command id pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdConfig {
    /// Highest id reserved by the toolkit. The first allocated id is one above it.
    pub reserved_floor: u32,
    /// The counter stops handing out fresh ids once it reaches this value.
    pub max: u32,
    /// Reuse ordering for freed ids.
    pub reuse: IdReusePolicy,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            reserved_floor: 5999,
            max: 32767,
            reuse: IdReusePolicy::AfterSaturation,
        }
    }
}

/// Configuration for the handle engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub ids: IdConfig,
    /// How many deferred recreate cycles may be drained after one external
    /// trigger before the control reports that its structure did not settle.
    pub max_settle_passes: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            ids: IdConfig::default(),
            max_settle_passes: 4,
        }
    }
}

impl EngineConfig {
    pub fn with_id_range(mut self, reserved_floor: u32, max: u32) -> Self {
        self.ids.reserved_floor = reserved_floor;
        self.ids.max = max;
        self
    }

    pub fn with_reuse(mut self, reuse: IdReusePolicy) -> Self {
        self.ids.reuse = reuse;
        self
    }

    pub fn with_max_settle_passes(mut self, passes: u32) -> Self {
        self.max_settle_passes = passes;
        self
    }

    /// Check the configuration for values the engine cannot work with.
    #[track_caller]
    pub fn validate(&self) -> HandleResult<()> {
        if self.ids.reserved_floor >= self.ids.max {
            return Err(HandleError::invalid_operation(format!(
                "id floor {} must be below id max {}",
                self.ids.reserved_floor, self.ids.max
            )));
        }
        if self.max_settle_passes == 0 {
            return Err(HandleError::invalid_operation(
                "max_settle_passes must be at least 1",
            ));
        }
        Ok(())
    }
}
