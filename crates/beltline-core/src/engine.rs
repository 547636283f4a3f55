//! The simulation engine: owns the connectivity graph and the live tokens,
//! and advances them once per host-delivered frame.
//!
//! # Architecture
//!
//! The `Engine` owns:
//! - A [`ConnectivityGraph`], the single owner of the device records
//! - The live [`Token`] list and a per-engine [`TokenIdGenerator`]
//! - Per-source generation timers
//! - An [`EventBus`] for typed simulation events
//! - A [`FrameScheduler`] and, optionally, a [`Renderer`]
//!
//! # Frame pipeline
//!
//! Each delivered frame runs:
//! 1. **Clock** -- real delta since the previous frame, simulated time accrues
//! 2. **Sources** -- running sources accumulate time and spawn on interval
//! 3. **Tokens** -- advance, transfer to the first output, or drop
//! 4. **Tick** -- emit a `Tick` event
//! 5. **Render** -- one draw pass if a renderer is attached
//! 6. **Reschedule** -- request the next frame while still running

use crate::device::{Connection, Device, DeviceState, EditorLayout};
use crate::event::{EventBus, EventData, EventKind, Listener, ListenerId, SimEvent};
use crate::graph::ConnectivityGraph;
use crate::id::{DeviceId, TokenIdGenerator};
use crate::query::SimulationSnapshot;
use crate::render::{RenderError, RenderSurface, Renderer, draw_frame};
use crate::schedule::{FrameHandle, FrameScheduler};
use crate::sim::{SimulationConfig, SimulationStatus, clamp_time_scale};
use crate::token::{
    Token, advance_token, create_token, next_device_id, should_remove_token, transfer_token,
};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Per-kind event history kept by the engine's bus.
pub const EVENT_HISTORY_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("renderer unavailable: {0}")]
    RendererUnavailable(#[from] RenderError),
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A conveyor-network simulation bound to one layout.
pub struct Engine {
    graph: ConnectivityGraph,

    /// Connections as declared by the layout, for rendering.
    connections: Vec<Connection>,

    tokens: Vec<Token>,

    token_ids: TokenIdGenerator,

    status: SimulationStatus,

    config: SimulationConfig,

    /// Simulated seconds since the last reset.
    elapsed_time: f64,

    /// Frame-clock time of the previous frame, in milliseconds.
    last_frame_time: f64,

    /// Accumulated simulated seconds per source since its last spawn.
    source_timers: HashMap<DeviceId, f64>,

    events: EventBus,

    scheduler: Box<dyn FrameScheduler>,

    pending_frame: Option<FrameHandle>,

    renderer: Option<Box<dyn Renderer>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("status", &self.status)
            .field("elapsed_time", &self.elapsed_time)
            .field("devices", &self.graph.node_count())
            .field("tokens", &self.tokens.len())
            .field("pending_frame", &self.pending_frame)
            .field("has_renderer", &self.renderer.is_some())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create a stopped engine with the default configuration.
    pub fn new(layout: EditorLayout, scheduler: impl FrameScheduler + 'static) -> Self {
        Self::with_config(layout, SimulationConfig::default(), scheduler)
    }

    /// Create a stopped engine. The configured time scale is clamped.
    pub fn with_config(
        layout: EditorLayout,
        config: SimulationConfig,
        scheduler: impl FrameScheduler + 'static,
    ) -> Self {
        let graph = ConnectivityGraph::build(&layout);
        debug!(
            devices = graph.node_count(),
            connections = graph.edge_count(),
            "engine created"
        );
        Self {
            graph,
            connections: layout.connections,
            tokens: Vec::new(),
            token_ids: TokenIdGenerator::new(),
            status: SimulationStatus::Stopped,
            config: config.normalized(),
            elapsed_time: 0.0,
            last_frame_time: 0.0,
            source_timers: HashMap::new(),
            events: EventBus::new(EVENT_HISTORY_CAPACITY),
            scheduler: Box::new(scheduler),
            pending_frame: None,
            renderer: None,
        }
    }

    // -----------------------------------------------------------------------
    // Run control
    // -----------------------------------------------------------------------

    /// Start or resume. No-op while already running.
    ///
    /// Starting from `Stopped` zeroes every source timer; resuming from
    /// `Paused` keeps them.
    pub fn play(&mut self) {
        if self.status == SimulationStatus::Running {
            return;
        }
        let previous = self.status;
        self.status = SimulationStatus::Running;

        if previous == SimulationStatus::Stopped {
            self.source_timers = self
                .graph
                .devices()
                .filter(|d| d.is_source())
                .map(|d| (d.id.clone(), 0.0))
                .collect();
        }
        self.last_frame_time = self.scheduler.now_ms();

        debug!(from = %previous, "simulation playing");
        self.emit_status_change(previous);
        self.schedule_frame();
    }

    /// Pause. No-op unless running.
    pub fn pause(&mut self) {
        if self.status != SimulationStatus::Running {
            return;
        }
        self.cancel_frame();
        let previous = self.status;
        self.status = SimulationStatus::Paused;

        debug!("simulation paused");
        self.emit_status_change(previous);
    }

    /// Return to a clean stopped state.
    ///
    /// Every live token is removed (one `TokenRemoved` each), time and
    /// source timers are zeroed, token ids restart at 1, and faulted devices
    /// revert to stopped. Always emits `StatusChange` and draws once.
    pub fn reset(&mut self) {
        self.cancel_frame();
        let previous = self.status;

        for token in std::mem::take(&mut self.tokens) {
            self.emit(EventData::TokenRemoved { token });
        }

        self.elapsed_time = 0.0;
        self.last_frame_time = 0.0;
        self.source_timers.clear();
        self.token_ids.reset();

        for device in self.graph.devices_mut() {
            device.clear_fault();
        }

        self.status = SimulationStatus::Stopped;
        debug!(from = %previous, "simulation reset");
        self.emit_status_change(previous);
        self.force_render();
    }

    /// Reset, drop every listener and detach the renderer. The engine is
    /// consumed.
    pub fn dispose(mut self) {
        self.reset();
        self.events.clear_listeners();
        self.renderer = None;
        debug!("engine disposed");
    }

    /// Set the time scale, clamped into `[0.1, 10]`.
    pub fn set_time_scale(&mut self, scale: f64) {
        self.config.time_scale = clamp_time_scale(scale);
        debug!(time_scale = self.config.time_scale, "time scale changed");
    }

    pub fn get_time_scale(&self) -> f64 {
        self.config.time_scale
    }

    pub fn get_status(&self) -> SimulationStatus {
        self.status
    }

    // -----------------------------------------------------------------------
    // Frame delivery
    // -----------------------------------------------------------------------

    /// Deliver a frame requested earlier through the scheduler.
    ///
    /// Frames with a stale handle, or arriving while not running, are
    /// ignored. Returns whether the frame was processed.
    pub fn on_animation_frame(&mut self, handle: FrameHandle, timestamp_ms: f64) -> bool {
        if self.pending_frame != Some(handle) || self.status != SimulationStatus::Running {
            trace!(?handle, "ignoring stale frame");
            return false;
        }
        self.pending_frame = None;

        self.tick(timestamp_ms);

        if self.status == SimulationStatus::Running {
            self.schedule_frame();
        }
        true
    }

    /// The frame the engine is waiting for, if any.
    pub fn pending_frame(&self) -> Option<FrameHandle> {
        self.pending_frame
    }

    fn schedule_frame(&mut self) {
        self.cancel_frame();
        self.pending_frame = Some(self.scheduler.request_frame());
    }

    fn cancel_frame(&mut self) {
        if let Some(handle) = self.pending_frame.take() {
            self.scheduler.cancel_frame(handle);
        }
    }

    fn tick(&mut self, timestamp_ms: f64) {
        let delta_time = ((timestamp_ms - self.last_frame_time) / 1000.0).max(0.0);
        self.last_frame_time = timestamp_ms;
        let time_scale = self.config.time_scale;
        self.elapsed_time += delta_time * time_scale;

        self.process_sources(delta_time, time_scale, timestamp_ms);
        self.advance_tokens(delta_time, time_scale, timestamp_ms);

        trace!(
            delta_time,
            elapsed_time = self.elapsed_time,
            tokens = self.tokens.len(),
            "tick"
        );
        self.emit_at(
            timestamp_ms,
            EventData::Tick {
                delta_time,
                elapsed_time: self.elapsed_time,
                token_count: self.tokens.len(),
            },
        );

        self.force_render();
    }

    /// Accumulate time on running sources and spawn at most one token per
    /// source whose interval elapsed. The timer keeps the remainder.
    fn process_sources(&mut self, delta_time: f64, time_scale: f64, timestamp_ms: f64) {
        let due: Vec<(DeviceId, f64)> = self
            .graph
            .devices()
            .filter(|d| d.is_running())
            .filter_map(|d| {
                let rate = d.generation_rate()?;
                (rate > 0.0).then(|| (d.id.clone(), 1.0 / rate))
            })
            .collect();

        for (id, interval) in due {
            let timer = self.source_timers.entry(id.clone()).or_insert(0.0);
            *timer += delta_time * time_scale;
            if *timer < interval {
                continue;
            }
            *timer %= interval;

            let Some(device) = self.graph.device(id.as_str()) else {
                continue;
            };
            let token = create_token(
                &mut self.token_ids,
                device,
                Some(self.config.token_color.as_str()),
            );
            trace!(token = %token.id, source = %id, "token created");
            self.tokens.push(token.clone());
            self.emit_at(timestamp_ms, EventData::TokenCreated { token });
        }
    }

    fn advance_tokens(&mut self, delta_time: f64, time_scale: f64, timestamp_ms: f64) {
        let mut survivors = Vec::with_capacity(self.tokens.len());
        let mut moved = Vec::new();
        let mut removed = Vec::new();

        for token in std::mem::take(&mut self.tokens) {
            let Some(device) = self.graph.device(token.current_device_id.as_str()) else {
                removed.push(token);
                continue;
            };

            let step = advance_token(token, device, delta_time, time_scale);
            if !step.completed {
                survivors.push(step.token);
                continue;
            }

            let token = step.token;
            if should_remove_token(&token, &self.graph) {
                removed.push(token);
                continue;
            }

            let next = next_device_id(&token, &self.graph)
                .and_then(|id| self.graph.device(id.as_str()));
            match next {
                Some(next) => {
                    let from_device = token.current_device_id.clone();
                    let token = transfer_token(token, next);
                    moved.push((token.clone(), from_device, next.id.clone()));
                    survivors.push(token);
                }
                None => removed.push(token),
            }
        }
        self.tokens = survivors;

        for (token, from_device, to_device) in moved {
            self.emit_at(
                timestamp_ms,
                EventData::TokenMoved {
                    token,
                    from_device,
                    to_device,
                },
            );
        }
        for token in removed {
            self.emit_at(timestamp_ms, EventData::TokenRemoved { token });
        }
    }

    // -----------------------------------------------------------------------
    // Devices and layout
    // -----------------------------------------------------------------------

    /// Set a device's run state. Unknown ids are ignored.
    pub fn set_device_state(&mut self, device_id: &str, state: DeviceState) {
        self.mutate_device(device_id, |device| {
            device.set_state(state);
            true
        });
    }

    /// Fault a device with `reason`. Unknown ids are ignored.
    pub fn set_device_fault(&mut self, device_id: &str, reason: &str) {
        self.mutate_device(device_id, |device| {
            device.fault(reason);
            true
        });
    }

    /// Clear a fault, leaving the device stopped. No-op unless faulted.
    pub fn clear_device_fault(&mut self, device_id: &str) {
        self.mutate_device(device_id, Device::clear_fault);
    }

    /// Apply `change` to the device and emit `DeviceStateChange` if it
    /// reports a change.
    fn mutate_device(&mut self, device_id: &str, change: impl FnOnce(&mut Device) -> bool) {
        let Some(device) = self.graph.device_mut(device_id) else {
            warn!(device = device_id, "device operation on unknown device");
            return;
        };
        let previous_state = device.state;
        if !change(device) {
            return;
        }
        let data = EventData::DeviceStateChange {
            device_id: device.id.clone(),
            previous_state,
            new_state: device.state,
            fault_reason: device.fault_reason.clone(),
        };
        debug!(device = device_id, from = %previous_state, to = %device.state, "device state changed");
        self.emit(data);
    }

    /// Replace the layout and rebuild the graph.
    ///
    /// Live tokens are kept; those whose device vanished are dropped on the
    /// next frame. Timers of sources that no longer exist are discarded.
    pub fn update_layout(&mut self, layout: EditorLayout) {
        self.graph = ConnectivityGraph::build(&layout);
        self.connections = layout.connections;

        let graph = &self.graph;
        self.source_timers
            .retain(|id, _| graph.device(id.as_str()).is_some_and(Device::is_source));

        debug!(
            devices = self.graph.node_count(),
            connections = self.graph.edge_count(),
            "layout updated"
        );
        self.force_render();
    }

    pub fn get_graph(&self) -> &ConnectivityGraph {
        &self.graph
    }

    /// Devices in layout order.
    pub fn get_devices(&self) -> Vec<&Device> {
        self.graph.devices().collect()
    }

    pub fn get_connections(&self) -> &[Connection] {
        &self.connections
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get_tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn get_elapsed_time(&self) -> f64 {
        self.elapsed_time
    }

    pub fn get_config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Current generation timer of a source, in simulated seconds.
    pub fn source_timer(&self, device_id: &str) -> Option<f64> {
        self.source_timers.get(device_id).copied()
    }

    pub fn get_snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            status: self.status,
            elapsed_time: self.elapsed_time,
            time_scale: self.config.time_scale,
            devices: self.graph.devices().cloned().collect(),
            tokens: self.tokens.clone(),
            token_count: self.tokens.len(),
        }
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    /// Acquire a renderer from `surface` and draw once. Acquisition failure
    /// is returned to the caller and leaves any previous renderer in place.
    pub fn attach_renderer(&mut self, surface: &mut dyn RenderSurface) -> Result<(), EngineError> {
        let renderer = surface.acquire_renderer()?;
        self.renderer = Some(renderer);
        debug!("renderer attached");
        self.force_render();
        Ok(())
    }

    pub fn detach_renderer(&mut self) {
        self.renderer = None;
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    /// Draw the current state. No-op without a renderer.
    pub fn force_render(&mut self) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let devices: Vec<Device> = self.graph.devices().cloned().collect();
        draw_frame(
            renderer.as_mut(),
            &devices,
            &self.connections,
            &self.tokens,
            self.status,
        );
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Subscribe to events of `kind`.
    pub fn on(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        self.events.on(kind, listener)
    }

    /// Unsubscribe. Returns false if the listener was not registered.
    pub fn off(&mut self, kind: EventKind, id: ListenerId) -> bool {
        self.events.off(kind, id)
    }

    /// The event bus, for history queries.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn emit_status_change(&mut self, previous_status: SimulationStatus) {
        self.emit(EventData::StatusChange {
            previous_status,
            new_status: self.status,
        });
    }

    fn emit(&mut self, data: EventData) {
        let now = self.scheduler.now_ms();
        self.emit_at(now, data);
    }

    fn emit_at(&mut self, timestamp_ms: f64, data: EventData) {
        self.events.emit(SimEvent::new(timestamp_ms, data));
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ManualScheduler;
    use crate::test_utils::*;

    fn running_line() -> (Engine, ManualScheduler) {
        let clock = ManualScheduler::new();
        let engine = Engine::new(line_layout(DeviceState::Running), clock.clone());
        (engine, clock)
    }

    #[test]
    fn starts_stopped_with_clean_state() {
        let (engine, clock) = running_line();
        assert_eq!(engine.get_status(), SimulationStatus::Stopped);
        assert!(engine.get_tokens().is_empty());
        assert_eq!(engine.get_elapsed_time(), 0.0);
        assert_eq!(engine.get_time_scale(), 1.0);
        assert_eq!(engine.get_devices().len(), 3);
        assert_eq!(engine.get_connections().len(), 2);
        assert!(clock.pending().is_none());
    }

    #[test]
    fn config_time_scale_is_clamped_at_construction() {
        let config = SimulationConfig {
            time_scale: 42.0,
            ..Default::default()
        };
        let engine = Engine::with_config(EditorLayout::default(), config, ManualScheduler::new());
        assert_eq!(engine.get_time_scale(), 10.0);
    }

    #[test]
    fn play_requests_a_frame_and_pause_cancels_it() {
        let (mut engine, clock) = running_line();
        engine.play();
        assert_eq!(engine.get_status(), SimulationStatus::Running);
        assert_eq!(clock.pending(), engine.pending_frame());
        assert!(clock.pending().is_some());

        engine.pause();
        assert_eq!(engine.get_status(), SimulationStatus::Paused);
        assert!(clock.pending().is_none());
        assert!(engine.pending_frame().is_none());
    }

    #[test]
    fn stale_frame_is_ignored() {
        let (mut engine, clock) = running_line();
        engine.play();
        let handle = clock.take_pending().unwrap();
        engine.pause();

        assert!(!engine.on_animation_frame(handle, 500.0));
        assert_eq!(engine.get_elapsed_time(), 0.0);
    }

    #[test]
    fn frame_reschedules_while_running() {
        let (mut engine, clock) = running_line();
        engine.play();
        let first = clock.take_pending().unwrap();
        assert!(engine.on_animation_frame(first, 100.0));
        let second = clock.pending().unwrap();
        assert_ne!(first, second);
        // Delivering the same handle twice does nothing.
        assert!(!engine.on_animation_frame(first, 200.0));
    }

    #[test]
    fn elapsed_time_scales() {
        let (mut engine, clock) = running_line();
        engine.set_time_scale(2.0);
        engine.play();
        drive_frames(&mut engine, &clock, 4, 250.0);
        assert!((engine.get_elapsed_time() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn set_time_scale_clamps() {
        let (mut engine, _) = running_line();
        engine.set_time_scale(0.0);
        assert_eq!(engine.get_time_scale(), 0.1);
        engine.set_time_scale(11.0);
        assert_eq!(engine.get_time_scale(), 10.0);
    }

    #[test]
    fn unknown_device_operations_are_noops() {
        let (mut engine, _) = running_line();
        let log = EventLog::attach(&mut engine, &[EventKind::DeviceStateChange]);
        engine.set_device_state("ghost", DeviceState::Running);
        engine.set_device_fault("ghost", "jam");
        engine.clear_device_fault("ghost");
        assert!(log.is_empty());
    }

    #[test]
    fn clear_fault_on_running_device_is_silent() {
        let (mut engine, _) = running_line();
        let log = EventLog::attach(&mut engine, &[EventKind::DeviceStateChange]);
        engine.clear_device_fault("belt");
        assert!(log.is_empty());
        assert_eq!(
            engine.get_graph().device("belt").unwrap().state,
            DeviceState::Running
        );
    }

    #[test]
    fn update_layout_prunes_missing_source_timers() {
        let (mut engine, clock) = running_line();
        engine.play();
        drive_frames(&mut engine, &clock, 1, 100.0);
        assert!(engine.source_timer("src").is_some());

        engine.update_layout(EditorLayout::new(vec![sink("sink", 0.0)], vec![]));
        assert!(engine.source_timer("src").is_none());
        assert_eq!(engine.get_graph().node_count(), 1);
    }

    #[test]
    fn snapshot_copies_state() {
        let (mut engine, clock) = running_line();
        engine.play();
        drive_frames(&mut engine, &clock, 2, 250.0);

        let snap = engine.get_snapshot();
        assert_eq!(snap.status, SimulationStatus::Running);
        assert_eq!(snap.token_count, snap.tokens.len());
        assert_eq!(snap.token_count, 1);
        assert_eq!(snap.devices.len(), 3);
        assert_eq!(snap.tokens_on("src").count(), 1);
        assert!(snap.device("belt").is_some());
    }
}
