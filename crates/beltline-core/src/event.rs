//! Typed simulation events and the listener registry that delivers them.
//!
//! Events are delivered synchronously, at the point the engine emits them,
//! to every listener registered for that [`EventKind`]. Each listener call
//! is isolated: a panicking listener is logged and skipped, and delivery to
//! the remaining listeners (and the frame that emitted the event) carries on.
//!
//! The bus also keeps a bounded history per event kind, so hosts that poll
//! instead of subscribing can inspect what happened recently.

use crate::device::DeviceState;
use crate::id::DeviceId;
use crate::sim::SimulationStatus;
use crate::token::Token;
use std::panic::{self, AssertUnwindSafe};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Discriminant tag for events, used to subscribe and to query history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StatusChange,
    TokenCreated,
    TokenMoved,
    TokenRemoved,
    DeviceStateChange,
    Tick,
}

/// Total number of event kinds.
const EVENT_KIND_COUNT: usize = 6;

impl EventKind {
    pub const ALL: [EventKind; EVENT_KIND_COUNT] = [
        EventKind::StatusChange,
        EventKind::TokenCreated,
        EventKind::TokenMoved,
        EventKind::TokenRemoved,
        EventKind::DeviceStateChange,
        EventKind::Tick,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Payload of a simulation event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    StatusChange {
        previous_status: SimulationStatus,
        new_status: SimulationStatus,
    },
    TokenCreated {
        token: Token,
    },
    TokenMoved {
        token: Token,
        from_device: DeviceId,
        to_device: DeviceId,
    },
    TokenRemoved {
        token: Token,
    },
    DeviceStateChange {
        device_id: DeviceId,
        previous_state: DeviceState,
        new_state: DeviceState,
        fault_reason: Option<String>,
    },
    Tick {
        /// Real seconds since the previous frame.
        delta_time: f64,
        /// Simulated seconds since the last reset.
        elapsed_time: f64,
        token_count: usize,
    },
}

impl EventData {
    pub fn kind(&self) -> EventKind {
        match self {
            EventData::StatusChange { .. } => EventKind::StatusChange,
            EventData::TokenCreated { .. } => EventKind::TokenCreated,
            EventData::TokenMoved { .. } => EventKind::TokenMoved,
            EventData::TokenRemoved { .. } => EventKind::TokenRemoved,
            EventData::DeviceStateChange { .. } => EventKind::DeviceStateChange,
            EventData::Tick { .. } => EventKind::Tick,
        }
    }
}

/// An event as seen by listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct SimEvent {
    pub kind: EventKind,
    /// Frame-clock time of emission, in milliseconds.
    pub timestamp: f64,
    pub data: EventData,
}

impl SimEvent {
    pub fn new(timestamp: f64, data: EventData) -> Self {
        Self {
            kind: data.kind(),
            timestamp,
            data,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBuffer -- bounded history ring
// ---------------------------------------------------------------------------

/// A fixed-capacity ring of past events. When full, the oldest event is
/// dropped.
#[derive(Debug)]
pub struct EventBuffer {
    events: Vec<Option<SimEvent>>,
    /// Next write position.
    head: usize,
    len: usize,
    /// Total events ever written, including dropped ones.
    total_written: u64,
}

impl EventBuffer {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_written: 0,
        }
    }

    pub fn push(&mut self, event: SimEvent) {
        self.events[self.head] = Some(event);
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &SimEvent> {
        let start = if self.len < self.capacity() { 0 } else { self.head };
        (0..self.len).filter_map(move |offset| {
            self.events[(start + offset) % self.capacity()].as_ref()
        })
    }

    /// Drop stored events. The total-written counter is kept.
    pub fn clear(&mut self) {
        for slot in &mut self.events {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// A read-only event observer.
pub type Listener = Box<dyn FnMut(&SimEvent)>;

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct ListenerEntry {
    id: ListenerId,
    listener: Listener,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Listener registry plus per-kind history.
pub struct EventBus {
    listeners: [Vec<ListenerEntry>; EVENT_KIND_COUNT],
    history: [EventBuffer; EVENT_KIND_COUNT],
    next_listener_id: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listener_counts: Vec<usize> = self.listeners.iter().map(Vec::len).collect();
        f.debug_struct("EventBus")
            .field("listener_counts", &listener_counts)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create a bus keeping up to `history_capacity` past events per kind.
    pub fn new(history_capacity: usize) -> Self {
        Self {
            listeners: Default::default(),
            history: std::array::from_fn(|_| EventBuffer::new(history_capacity)),
            next_listener_id: 0,
        }
    }

    /// Subscribe `listener` to events of `kind`.
    pub fn on(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners[kind.index()].push(ListenerEntry { id, listener });
        id
    }

    /// Unsubscribe. Returns false if `id` was not registered for `kind`.
    pub fn off(&mut self, kind: EventKind, id: ListenerId) -> bool {
        let entries = &mut self.listeners[kind.index()];
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners[kind.index()].len()
    }

    /// Drop every listener of every kind.
    pub fn clear_listeners(&mut self) {
        for entries in &mut self.listeners {
            entries.clear();
        }
    }

    /// Record `event` and deliver it to the listeners of its kind.
    pub fn emit(&mut self, event: SimEvent) {
        let idx = event.kind.index();

        for entry in &mut self.listeners[idx] {
            let listener = &mut entry.listener;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(&event)));
            if let Err(payload) = outcome {
                tracing::error!(
                    kind = ?event.kind,
                    listener = entry.id.0,
                    error = panic_message(payload.as_ref()),
                    "event listener panicked"
                );
            }
        }

        self.history[idx].push(event);
    }

    /// Recent events of `kind`, oldest first.
    pub fn history(&self, kind: EventKind) -> &EventBuffer {
        &self.history[kind.index()]
    }

    /// Total events of `kind` emitted since the bus was created.
    pub fn total_emitted(&self, kind: EventKind) -> u64 {
        self.history[kind.index()].total_written()
    }

    /// Clear stored history. Listeners and counters are untouched.
    pub fn clear_history(&mut self) {
        for buffer in &mut self.history {
            buffer.clear();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
