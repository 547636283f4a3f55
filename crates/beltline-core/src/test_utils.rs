//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::device::*;
use crate::engine::Engine;
use crate::event::{EventKind, SimEvent};
use crate::render::{RenderError, RenderSurface, Renderer};
use crate::schedule::ManualScheduler;
use crate::sim::SimulationStatus;
use crate::token::Token;
use std::cell::RefCell;
use std::rc::Rc;

// ===========================================================================
// Device builders
// ===========================================================================

/// 50x50 source at `(x, 0)`.
pub fn source(id: &str, x: f64, generation_rate: f64) -> Device {
    Device::new(
        id,
        DeviceKind::Source { generation_rate },
        Point::new(x, 0.0),
        50.0,
        50.0,
    )
}

/// Right-running conveyor at `(x, 0)`, 50 high.
pub fn conveyor(id: &str, x: f64, width: f64, speed: f64) -> Device {
    Device::new(
        id,
        DeviceKind::Conveyor {
            speed,
            direction: Direction::Right,
        },
        Point::new(x, 0.0),
        width,
        50.0,
    )
}

/// 50x50 sink at `(x, 0)`.
pub fn sink(id: &str, x: f64) -> Device {
    Device::new(id, DeviceKind::Sink, Point::new(x, 0.0), 50.0, 50.0)
}

/// 50x50 junction at `(x, 0)`.
pub fn junction(id: &str, x: f64) -> Device {
    Device::new(
        id,
        DeviceKind::Junction {
            output_direction: Direction::Right,
        },
        Point::new(x, 0.0),
        50.0,
        50.0,
    )
}

pub fn connect(from: &str, to: &str) -> Connection {
    Connection::new(from, to)
}

// ===========================================================================
// Layouts
// ===========================================================================

/// `src` (rate 2) -> `belt` (200 wide, speed 100) -> `sink`, all in `state`.
pub fn line_layout(state: DeviceState) -> EditorLayout {
    EditorLayout::new(
        vec![
            source("src", 0.0, 2.0).with_state(state),
            conveyor("belt", 50.0, 200.0, 100.0).with_state(state),
            sink("sink", 250.0).with_state(state),
        ],
        vec![connect("src", "belt"), connect("belt", "sink")],
    )
}

/// `lines` independent copies of [`line_layout`], ids suffixed with the
/// line number and stacked vertically.
pub fn many_lines_layout(lines: usize, state: DeviceState) -> EditorLayout {
    let mut layout = EditorLayout::default();
    for line in 0..lines {
        let y = line as f64 * 60.0;
        let src = format!("src-{line}");
        let belt = format!("belt-{line}");
        let snk = format!("sink-{line}");
        for mut device in [
            source(&src, 0.0, 2.0),
            conveyor(&belt, 50.0, 200.0, 100.0),
            sink(&snk, 250.0),
        ] {
            device.position.y = y;
            layout.devices.push(device.with_state(state));
        }
        layout.connections.push(connect(&src, &belt));
        layout.connections.push(connect(&belt, &snk));
    }
    layout
}

// ===========================================================================
// Frame driving
// ===========================================================================

/// Deliver `frames` frames spaced `frame_ms` apart. Stops early once the
/// engine no longer has a frame pending. Returns the frames delivered.
pub fn drive_frames(
    engine: &mut Engine,
    clock: &ManualScheduler,
    frames: usize,
    frame_ms: f64,
) -> usize {
    let mut delivered = 0;
    for _ in 0..frames {
        let Some(handle) = clock.take_pending() else {
            break;
        };
        let now = clock.advance(frame_ms);
        engine.on_animation_frame(handle, now);
        delivered += 1;
    }
    delivered
}

// ===========================================================================
// Event recording
// ===========================================================================

/// Records every event of the subscribed kinds.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<SimEvent>>>,
}

impl EventLog {
    pub fn attach(engine: &mut Engine, kinds: &[EventKind]) -> Self {
        let log = Self::default();
        for &kind in kinds {
            let events = Rc::clone(&log.events);
            engine.on(
                kind,
                Box::new(move |e| events.borrow_mut().push(e.clone())),
            );
        }
        log
    }

    /// Subscribe to every event kind.
    pub fn attach_all(engine: &mut Engine) -> Self {
        Self::attach(engine, &EventKind::ALL)
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.events.borrow().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.borrow().iter().map(|e| e.kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.borrow().iter().filter(|e| e.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

// ===========================================================================
// Recording renderer
// ===========================================================================

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    Clear,
    Connections(usize),
    Devices(Vec<Device>),
    Tokens(Vec<Token>),
    Status(SimulationStatus, f64, f64),
}

/// Renderer that records its calls into a shared log.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    calls: Rc<RefCell<Vec<DrawCall>>>,
}

impl RecordingRenderer {
    pub fn calls(&self) -> Vec<DrawCall> {
        self.calls.borrow().clone()
    }

    /// Number of completed draw passes.
    pub fn passes(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, DrawCall::Clear))
            .count()
    }

    /// Tokens of the most recent pass.
    pub fn last_tokens(&self) -> Option<Vec<Token>> {
        self.calls.borrow().iter().rev().find_map(|c| match c {
            DrawCall::Tokens(t) => Some(t.clone()),
            _ => None,
        })
    }

    /// Status of the most recent pass.
    pub fn last_status(&self) -> Option<SimulationStatus> {
        self.calls.borrow().iter().rev().find_map(|c| match c {
            DrawCall::Status(s, _, _) => Some(*s),
            _ => None,
        })
    }
}

impl Renderer for RecordingRenderer {
    fn clear(&mut self) {
        self.calls.borrow_mut().push(DrawCall::Clear);
    }

    fn render_devices(&mut self, devices: &[Device]) {
        self.calls
            .borrow_mut()
            .push(DrawCall::Devices(devices.to_vec()));
    }

    fn render_connections(&mut self, _devices: &[Device], connections: &[Connection]) {
        self.calls
            .borrow_mut()
            .push(DrawCall::Connections(connections.len()));
    }

    fn render_tokens(&mut self, tokens: &[Token]) {
        self.calls.borrow_mut().push(DrawCall::Tokens(tokens.to_vec()));
    }

    fn render_status(&mut self, status: SimulationStatus, x: f64, y: f64) {
        self.calls.borrow_mut().push(DrawCall::Status(status, x, y));
    }
}

/// Surface handing out clones of one [`RecordingRenderer`], or failing.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    pub renderer: RecordingRenderer,
    pub unavailable: Option<String>,
}

impl RecordingSurface {
    pub fn failing(reason: &str) -> Self {
        Self {
            renderer: RecordingRenderer::default(),
            unavailable: Some(reason.to_string()),
        }
    }
}

impl RenderSurface for RecordingSurface {
    fn acquire_renderer(&mut self) -> Result<Box<dyn Renderer>, RenderError> {
        match &self.unavailable {
            Some(reason) => Err(RenderError::ContextUnavailable {
                reason: reason.clone(),
            }),
            None => Ok(Box::new(self.renderer.clone())),
        }
    }
}
