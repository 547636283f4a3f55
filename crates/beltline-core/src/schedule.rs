//! Frame scheduling capability.
//!
//! The engine never owns a clock. It asks the host for the next frame via a
//! [`FrameScheduler`], remembers the returned handle, and the host later
//! delivers that frame through `Engine::on_animation_frame`.

use std::cell::RefCell;
use std::rc::Rc;

/// Opaque identifier of a requested frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// Host-provided frame clock.
pub trait FrameScheduler {
    /// Ask for one frame callback. The host must deliver it at most once.
    fn request_frame(&mut self) -> FrameHandle;

    /// Withdraw a previously requested frame. Unknown handles are ignored.
    fn cancel_frame(&mut self, handle: FrameHandle);

    /// Current frame-clock time in milliseconds.
    fn now_ms(&self) -> f64;
}

#[derive(Debug, Default)]
struct ManualState {
    now_ms: f64,
    next_handle: u64,
    pending: Option<FrameHandle>,
}

/// A scheduler driven by hand, for headless hosts and tests.
///
/// Clones share the same clock and pending slot, so a host can keep one
/// clone while the engine owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    state: Rc<RefCell<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler whose clock starts at `now_ms`.
    pub fn starting_at(now_ms: f64) -> Self {
        let scheduler = Self::default();
        scheduler.state.borrow_mut().now_ms = now_ms;
        scheduler
    }

    /// Move the clock forward by `ms` and return the new time.
    pub fn advance(&self, ms: f64) -> f64 {
        let mut state = self.state.borrow_mut();
        state.now_ms += ms;
        state.now_ms
    }

    /// The requested, not yet delivered or cancelled, frame.
    pub fn pending(&self) -> Option<FrameHandle> {
        self.state.borrow().pending
    }

    /// Take the pending frame for delivery.
    pub fn take_pending(&self) -> Option<FrameHandle> {
        self.state.borrow_mut().pending.take()
    }

    pub fn now_ms(&self) -> f64 {
        self.state.borrow().now_ms
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) -> FrameHandle {
        let mut state = self.state.borrow_mut();
        state.next_handle += 1;
        let handle = FrameHandle(state.next_handle);
        state.pending = Some(handle);
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        let mut state = self.state.borrow_mut();
        if state.pending == Some(handle) {
            state.pending = None;
        }
    }

    fn now_ms(&self) -> f64 {
        ManualScheduler::now_ms(self)
    }
}
