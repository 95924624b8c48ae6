//! Mock native toolkit for testing.
//!
//! [`MockBackend`] plays the windowing system: it hands out raw handles and
//! records every call. [`MockWidget`] is a generic edit-like widget adapter
//! built on it, with text, selection, state bits and an optional structural
//! style.

use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;
use tether_native::{
    CreateContext, DelayedFlags, DelayedValue, HandleError, HandleResult, NativeCx, NativeId,
    NativeWidget, RawHandle, StructuralKey,
};

/// Records a native call for verification in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeCall {
    Create {
        raw: RawHandle,
        id: Option<NativeId>,
        parent: Option<RawHandle>,
        style: u32,
    },
    Destroy {
        raw: RawHandle,
    },
    Detach {
        raw: RawHandle,
    },
    Reparent {
        raw: RawHandle,
        parent: Option<RawHandle>,
    },
    BindEvents {
        raw: RawHandle,
    },
    UnbindEvents {
        raw: RawHandle,
    },
    SetText {
        raw: RawHandle,
        text: String,
    },
    SetSelection {
        raw: RawHandle,
        at: usize,
    },
    SetState {
        raw: RawHandle,
        bits: u32,
    },
    SetReadOnly {
        raw: RawHandle,
        value: bool,
    },
}

bitflags! {
    /// State bits understood by [`MockWidget`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MockState: u32 {
        const VISIBLE   = 1 << 0;
        const ENABLED   = 1 << 1;
        const READ_ONLY = 1 << 2;
        /// Never reaches the toolkit; lives in the cache only.
        const TAGGED    = 1 << 3;
    }
}

/// Fake windowing system shared by every mock widget in a test.
///
/// Methods take `&self` and record through a `Mutex`, so one backend can be
/// shared by many widgets and inspected while they are alive.
pub struct MockBackend {
    calls: Mutex<Vec<NativeCall>>,
    next_raw: Mutex<u64>,
    fail_next_create: Mutex<bool>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_raw: Mutex::new(0x1000),
            fail_next_create: Mutex::new(false),
        }
    }

    /// Make the next native create call fail.
    pub fn fail_next_create(&self) {
        *self.fail_next_create.lock() = true;
    }

    /// Get a copy of all recorded calls (for test assertions).
    pub fn calls(&self) -> Vec<NativeCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn count_creates(&self) -> usize {
        self.count(|call| matches!(call, NativeCall::Create { .. }))
    }

    pub fn count_destroys(&self) -> usize {
        self.count(|call| matches!(call, NativeCall::Destroy { .. }))
    }

    pub fn count_detaches(&self) -> usize {
        self.count(|call| matches!(call, NativeCall::Detach { .. }))
    }

    pub fn count_state_sets(&self) -> usize {
        self.count(|call| matches!(call, NativeCall::SetState { .. }))
    }

    pub fn count_text_sets(&self) -> usize {
        self.count(|call| matches!(call, NativeCall::SetText { .. }))
    }

    /// Raw handles of every destroy call, in order.
    pub fn destroyed(&self) -> Vec<RawHandle> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                NativeCall::Destroy { raw } => Some(*raw),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: NativeCall) {
        tracing::trace!("mock native call: {:?}", call);
        self.calls.lock().push(call);
    }

    fn count(&self, pred: impl Fn(&NativeCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| pred(call)).count()
    }

    fn allocate_raw(&self) -> RawHandle {
        let mut next = self.next_raw.lock();
        *next += 0x10;
        RawHandle::from_raw(*next)
    }

    fn take_failure(&self) -> bool {
        std::mem::take(&mut *self.fail_next_create.lock())
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Live mock native resource.
pub struct MockHandle {
    raw: RawHandle,
    id: Option<NativeId>,
    parent: Option<RawHandle>,
    style: u32,
    text: String,
    selection: usize,
    state: MockState,
    backend: Arc<MockBackend>,
}

impl MockHandle {
    pub fn raw(&self) -> RawHandle {
        self.raw
    }

    pub fn id(&self) -> Option<NativeId> {
        self.id
    }

    pub fn parent(&self) -> Option<RawHandle> {
        self.parent
    }

    pub fn style(&self) -> u32 {
        self.style
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn selection(&self) -> usize {
        self.selection
    }

    pub fn state(&self) -> MockState {
        self.state
    }

    pub fn set_text(&mut self, text: String) {
        self.backend.record(NativeCall::SetText {
            raw: self.raw,
            text: text.clone(),
        });
        self.text = text;
        self.selection = self.selection.min(self.text.len());
    }

    /// Like a real edit control, a selection past the end of the text is
    /// clamped.
    pub fn select(&mut self, at: usize) {
        self.backend
            .record(NativeCall::SetSelection { raw: self.raw, at });
        self.selection = at.min(self.text.len());
    }

    pub fn set_state(&mut self, bits: MockState) {
        let mask = MockState::VISIBLE | MockState::ENABLED;
        self.backend.record(NativeCall::SetState {
            raw: self.raw,
            bits: bits.bits(),
        });
        self.state.remove(mask);
        self.state.insert(bits & mask);
    }

    pub fn set_read_only(&mut self, value: bool) {
        self.backend
            .record(NativeCall::SetReadOnly { raw: self.raw, value });
        self.state.set(MockState::READ_ONLY, value);
    }

    /// Change the text the way a user typing would: no setter call is
    /// recorded.
    pub fn simulate_input(&mut self, text: &str) {
        self.text = text.to_string();
        self.selection = self.text.len();
    }
}

type CreatedHook = Box<dyn FnMut(RawHandle)>;

/// Edit-like widget adapter over [`MockBackend`].
pub struct MockWidget {
    backend: Arc<MockBackend>,
    style_key: Option<StructuralKey<u32>>,
    on_created: Option<CreatedHook>,
}

impl MockWidget {
    pub fn new(backend: &Arc<MockBackend>) -> Self {
        Self {
            backend: Arc::clone(backend),
            style_key: None,
            on_created: None,
        }
    }

    /// Read the construction style from a structural value.
    pub fn with_style(mut self, key: StructuralKey<u32>) -> Self {
        self.style_key = Some(key);
        self
    }

    pub fn set_style_key(&mut self, key: StructuralKey<u32>) {
        self.style_key = Some(key);
    }

    pub fn style_key(&self) -> Option<StructuralKey<u32>> {
        self.style_key
    }

    /// Run `hook` once the handle exists but before delayed values are
    /// applied.
    pub fn with_created_hook(mut self, hook: impl FnMut(RawHandle) + 'static) -> Self {
        self.on_created = Some(Box::new(hook));
        self
    }

    pub fn text_slot() -> DelayedValue<MockHandle, String> {
        DelayedValue::new(
            String::new(),
            |h: &MockHandle| h.text.clone(),
            |cx: &mut NativeCx<'_, MockHandle>, text: String| cx.set_text(text),
        )
    }

    pub fn selection_slot() -> DelayedValue<MockHandle, usize> {
        DelayedValue::new(
            0,
            |h: &MockHandle| h.selection,
            |cx: &mut NativeCx<'_, MockHandle>, at: usize| cx.select(at),
        )
    }

    /// VISIBLE and ENABLED share one accessor pair; READ_ONLY has its own;
    /// TAGGED has none.
    pub fn state_slot(initial: MockState) -> DelayedFlags<MockHandle, MockState> {
        DelayedFlags::new(initial)
            .with_group(
                MockState::VISIBLE | MockState::ENABLED,
                |h: &MockHandle| h.state,
                |cx: &mut NativeCx<'_, MockHandle>, bits: MockState| cx.set_state(bits),
            )
            .with_bit(
                MockState::READ_ONLY,
                |h: &MockHandle| h.state.contains(MockState::READ_ONLY),
                |cx: &mut NativeCx<'_, MockHandle>, value: bool| cx.set_read_only(value),
            )
    }
}

impl NativeWidget for MockWidget {
    type Handle = MockHandle;

    fn create(&mut self, cx: &CreateContext<'_, MockHandle>) -> HandleResult<MockHandle> {
        if self.backend.take_failure() {
            return Err(HandleError::native("mock create failure"));
        }
        let raw = self.backend.allocate_raw();
        let style = self.style_key.map_or(0, |key| *cx.structural(key));
        self.backend.record(NativeCall::Create {
            raw,
            id: cx.id(),
            parent: cx.parent(),
            style,
        });
        Ok(MockHandle {
            raw,
            id: cx.id(),
            parent: cx.parent(),
            style,
            text: String::new(),
            selection: 0,
            state: MockState::empty(),
            backend: Arc::clone(&self.backend),
        })
    }

    fn destroy(&mut self, handle: MockHandle) {
        self.backend.record(NativeCall::Destroy { raw: handle.raw });
    }

    fn raw(&self, handle: &MockHandle) -> RawHandle {
        handle.raw
    }

    fn bind_events(&mut self, handle: &mut MockHandle) {
        self.backend
            .record(NativeCall::BindEvents { raw: handle.raw });
    }

    fn unbind_events(&mut self, handle: &mut MockHandle) {
        self.backend
            .record(NativeCall::UnbindEvents { raw: handle.raw });
    }

    fn reparent(&mut self, handle: &mut MockHandle, parent: Option<RawHandle>) {
        self.backend.record(NativeCall::Reparent {
            raw: handle.raw,
            parent,
        });
        handle.parent = parent;
    }

    fn on_created(&mut self, handle: &mut MockHandle) {
        if let Some(hook) = self.on_created.as_mut() {
            hook(handle.raw);
        }
    }

    fn detach(&mut self, handle: MockHandle) {
        self.backend.record(NativeCall::Detach { raw: handle.raw });
    }
}
