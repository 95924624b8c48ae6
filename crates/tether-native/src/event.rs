//! Lifecycle and command notifications raised by controls.

use crate::id::NativeId;

/// Something that happened to a control.
///
/// Events are queued on the control and drained by its adapter with
/// [`Control::drain_events`](crate::Control::drain_events).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// The native handle exists and every delayed value has been applied.
    HandleCreated,
    /// The native handle is about to go away. Live values are already
    /// received into the cache.
    HandleDestroying,
    /// The native handle is gone.
    HandleDestroyed,
    /// A destroy+create cycle finished.
    Recreated,
    /// A native command routed by id.
    Command(NativeId),
    /// A native notification routed by raw handle.
    Native { code: u32 },
}

impl ControlEvent {
    /// Lifecycle events are raised by the engine itself; the others come
    /// from the native toolkit.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            ControlEvent::HandleCreated
                | ControlEvent::HandleDestroying
                | ControlEvent::HandleDestroyed
                | ControlEvent::Recreated
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_classification() {
        assert!(ControlEvent::Recreated.is_lifecycle());
        assert!(ControlEvent::HandleDestroying.is_lifecycle());
        assert!(!ControlEvent::Native { code: 7 }.is_lifecycle());
        let id = NativeId::new(6000).unwrap();
        assert!(!ControlEvent::Command(id).is_lifecycle());
    }
}
