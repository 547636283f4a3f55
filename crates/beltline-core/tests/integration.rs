//! Integration tests for the Beltline simulation engine.
//!
//! These tests exercise end-to-end behavior through the public engine
//! surface: run control, frame delivery, token flow, device faults, layout
//! replacement, events, and rendering.

use beltline_core::device::*;
use beltline_core::engine::{Engine, EngineError};
use beltline_core::event::{EventData, EventKind};
use beltline_core::graph::ConnectivityGraph;
use beltline_core::id::TokenId;
use beltline_core::render::{RenderError, STATUS_POSITION};
use beltline_core::schedule::ManualScheduler;
use beltline_core::sim::SimulationStatus;
use beltline_core::test_utils::*;
use beltline_core::token::{advance_token, create_token};
use std::cell::Cell;
use std::rc::Rc;

fn running_line() -> (Engine, ManualScheduler) {
    let clock = ManualScheduler::new();
    let engine = Engine::new(line_layout(DeviceState::Running), clock.clone());
    (engine, clock)
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ===========================================================================
// Scenario 1: source -> conveyor -> sink, one simulated second
// ===========================================================================
//
// Frames every 250 ms. The source (rate 2) spawns at 0.5 s and 1.0 s. The
// first token crosses the 50-wide source by 0.75 s and moves onto the belt,
// then covers 100 * 0.25 / 200 of it by 1.0 s.

#[test]
fn scenario_line_after_one_second() {
    let (mut engine, clock) = running_line();
    let log = EventLog::attach_all(&mut engine);

    engine.play();
    assert_eq!(drive_frames(&mut engine, &clock, 4, 250.0), 4);

    assert!(approx(engine.get_elapsed_time(), 1.0));
    assert_eq!(log.count(EventKind::TokenCreated), 2);
    assert_eq!(log.count(EventKind::TokenMoved), 1);
    assert_eq!(log.count(EventKind::TokenRemoved), 0);
    assert_eq!(log.count(EventKind::Tick), 4);

    let tokens = engine.get_tokens();
    assert_eq!(tokens.len(), 2);

    assert_eq!(tokens[0].id, TokenId(1));
    assert_eq!(tokens[0].current_device_id.as_str(), "belt");
    assert!(approx(tokens[0].progress, 0.125));
    assert!(approx(tokens[0].position.x, 75.0));
    assert!(approx(tokens[0].position.y, 25.0));

    assert_eq!(tokens[1].id, TokenId(2));
    assert_eq!(tokens[1].current_device_id.as_str(), "src");
    assert!(approx(tokens[1].progress, 0.5));
}

#[test]
fn token_moved_event_names_both_devices() {
    let (mut engine, clock) = running_line();
    let log = EventLog::attach(&mut engine, &[EventKind::TokenMoved]);
    engine.play();
    drive_frames(&mut engine, &clock, 3, 250.0);

    let events = log.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].timestamp, 750.0);
    match &events[0].data {
        EventData::TokenMoved {
            token,
            from_device,
            to_device,
        } => {
            assert_eq!(from_device.as_str(), "src");
            assert_eq!(to_device.as_str(), "belt");
            assert_eq!(token.current_device_id.as_str(), "belt");
            assert_eq!(token.progress, 0.0);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn tokens_are_consumed_at_the_sink() {
    let (mut engine, clock) = running_line();
    let log = EventLog::attach_all(&mut engine);
    engine.play();
    drive_frames(&mut engine, &clock, 40, 250.0);

    let created = log.count(EventKind::TokenCreated);
    let removed = log.count(EventKind::TokenRemoved);
    assert_eq!(created, 20);
    assert!(removed > 0);
    assert_eq!(created - removed, engine.get_tokens().len());
    assert!(engine.get_tokens().len() <= 7);
}

#[test]
fn tick_event_reports_frame_values() {
    let (mut engine, clock) = running_line();
    let log = EventLog::attach(&mut engine, &[EventKind::Tick]);
    engine.set_time_scale(2.0);
    engine.play();
    drive_frames(&mut engine, &clock, 2, 100.0);

    let events = log.events();
    assert_eq!(events[1].timestamp, 200.0);
    match events[1].data {
        EventData::Tick {
            delta_time,
            elapsed_time,
            token_count,
        } => {
            assert!(approx(delta_time, 0.1));
            assert!(approx(elapsed_time, 0.4));
            assert_eq!(token_count, engine.get_tokens().len());
        }
        ref other => panic!("unexpected payload {other:?}"),
    }
}

// ===========================================================================
// Scenario 2: advancing past the end of a conveyor
// ===========================================================================

#[test]
fn scenario_advance_past_end() {
    let belt = conveyor("belt", 0.0, 200.0, 100.0).with_state(DeviceState::Running);
    let mut ids = beltline_core::id::TokenIdGenerator::new();
    let token = create_token(&mut ids, &belt, None);

    let step = advance_token(token, &belt, 2.0, 1.0);
    assert!(step.completed);
    assert_eq!(step.token.progress, 1.0);
}

// ===========================================================================
// Scenario 3: cycles
// ===========================================================================

#[test]
fn scenario_cycle_detection() {
    let layout = EditorLayout::new(
        vec![conveyor("a", 0.0, 100.0, 100.0), conveyor("b", 100.0, 100.0, 100.0)],
        vec![connect("a", "b"), connect("b", "a")],
    );
    let graph = ConnectivityGraph::build(&layout);
    assert!(graph.has_cycle());
    assert!(graph.topological_sort().is_none());
}

#[test]
fn tokens_circulate_in_a_loop() {
    let layout = EditorLayout::new(
        vec![
            conveyor("a", 0.0, 100.0, 100.0).with_state(DeviceState::Running),
            conveyor("b", 100.0, 100.0, 100.0).with_state(DeviceState::Running),
            source("src", -50.0, 1.0).with_state(DeviceState::Running),
        ],
        vec![connect("src", "a"), connect("a", "b"), connect("b", "a")],
    );
    let clock = ManualScheduler::new();
    let mut engine = Engine::new(layout, clock.clone());
    let log = EventLog::attach(&mut engine, &[EventKind::TokenRemoved]);
    engine.play();
    drive_frames(&mut engine, &clock, 40, 250.0);

    assert!(log.is_empty());
    assert_eq!(engine.get_tokens().len(), 10);
}

// ===========================================================================
// Scenario 4: reset with live tokens
// ===========================================================================

#[test]
fn scenario_reset_removes_every_token() {
    let (mut engine, clock) = running_line();
    engine.play();
    drive_frames(&mut engine, &clock, 4, 250.0);
    let live = engine.get_tokens().len();
    assert_eq!(live, 2);

    let log = EventLog::attach_all(&mut engine);
    engine.reset();

    assert!(engine.get_tokens().is_empty());
    assert_eq!(engine.get_elapsed_time(), 0.0);
    assert_eq!(engine.get_status(), SimulationStatus::Stopped);
    assert_eq!(log.count(EventKind::TokenRemoved), live);
    assert_eq!(log.count(EventKind::StatusChange), 1);
    assert!(clock.pending().is_none());
    assert!(engine.source_timer("src").is_none());
}

#[test]
fn token_ids_restart_after_reset() {
    let (mut engine, clock) = running_line();
    engine.play();
    drive_frames(&mut engine, &clock, 4, 250.0);
    engine.reset();

    engine.play();
    drive_frames(&mut engine, &clock, 2, 250.0);
    assert_eq!(engine.get_tokens()[0].id, TokenId(1));
    assert_eq!(engine.get_tokens()[0].id.to_string(), "token-1");
}

#[test]
fn reset_while_stopped_still_reports_status() {
    let (mut engine, _) = running_line();
    let log = EventLog::attach_all(&mut engine);
    engine.reset();
    match log.events()[0].data {
        EventData::StatusChange {
            previous_status,
            new_status,
        } => {
            assert_eq!(previous_status, SimulationStatus::Stopped);
            assert_eq!(new_status, SimulationStatus::Stopped);
        }
        ref other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn reset_reverts_faults_silently() {
    let (mut engine, _) = running_line();
    engine.set_device_fault("belt", "Motor jam");
    let log = EventLog::attach(&mut engine, &[EventKind::DeviceStateChange]);

    engine.reset();

    let belt = engine.get_graph().device("belt").unwrap();
    assert_eq!(belt.state, DeviceState::Stopped);
    assert!(belt.fault_reason.is_none());
    assert!(log.is_empty());
    // Running devices are left alone.
    assert_eq!(
        engine.get_graph().device("src").unwrap().state,
        DeviceState::Running
    );
}

// ===========================================================================
// Scenario 5: fault then clear
// ===========================================================================

#[test]
fn scenario_fault_then_clear_stays_stopped() {
    let (mut engine, _) = running_line();
    let log = EventLog::attach(&mut engine, &[EventKind::DeviceStateChange]);

    engine.set_device_fault("belt", "Motor jam");
    {
        let belt = engine.get_graph().device("belt").unwrap();
        assert_eq!(belt.state, DeviceState::Faulted);
        assert_eq!(belt.fault_reason.as_deref(), Some("Motor jam"));
    }

    engine.clear_device_fault("belt");
    let belt = engine.get_graph().device("belt").unwrap();
    assert_eq!(belt.state, DeviceState::Stopped);
    assert!(belt.fault_reason.is_none());

    let events = log.events();
    assert_eq!(events.len(), 2);
    match &events[0].data {
        EventData::DeviceStateChange {
            device_id,
            previous_state,
            new_state,
            fault_reason,
        } => {
            assert_eq!(device_id.as_str(), "belt");
            assert_eq!(*previous_state, DeviceState::Running);
            assert_eq!(*new_state, DeviceState::Faulted);
            assert_eq!(fault_reason.as_deref(), Some("Motor jam"));
        }
        other => panic!("unexpected payload {other:?}"),
    }
    match &events[1].data {
        EventData::DeviceStateChange {
            previous_state,
            new_state,
            fault_reason,
            ..
        } => {
            assert_eq!(*previous_state, DeviceState::Faulted);
            assert_eq!(*new_state, DeviceState::Stopped);
            assert!(fault_reason.is_none());
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn faulted_conveyor_holds_its_tokens() {
    let (mut engine, clock) = running_line();
    engine.play();
    drive_frames(&mut engine, &clock, 4, 250.0);
    engine.set_device_fault("belt", "Motor jam");
    let before = engine.get_tokens()[0].clone();

    drive_frames(&mut engine, &clock, 8, 250.0);
    let held = engine
        .get_tokens()
        .iter()
        .find(|t| t.id == before.id)
        .unwrap();
    assert_eq!(held.progress, before.progress);
    assert_eq!(held.position, before.position);
}

#[test]
fn stopped_source_does_not_spawn() {
    let (mut engine, clock) = running_line();
    engine.set_device_state("src", DeviceState::Stopped);
    engine.play();
    drive_frames(&mut engine, &clock, 20, 250.0);
    assert!(engine.get_tokens().is_empty());
}

// ===========================================================================
// Run control
// ===========================================================================

#[test]
fn play_twice_emits_one_status_change() {
    let (mut engine, _) = running_line();
    let log = EventLog::attach(&mut engine, &[EventKind::StatusChange]);
    engine.play();
    engine.play();
    assert_eq!(log.len(), 1);
}

#[test]
fn pause_while_stopped_is_silent() {
    let (mut engine, _) = running_line();
    let log = EventLog::attach_all(&mut engine);
    engine.pause();
    assert!(log.is_empty());
    assert_eq!(engine.get_status(), SimulationStatus::Stopped);
}

#[test]
fn resume_from_pause_keeps_source_timers() {
    let (mut engine, clock) = running_line();
    engine.play();
    drive_frames(&mut engine, &clock, 1, 100.0);
    assert!(approx(engine.source_timer("src").unwrap(), 0.1));

    engine.pause();
    clock.advance(5_000.0);
    engine.play();
    assert!(approx(engine.source_timer("src").unwrap(), 0.1));

    // The first frame after resuming measures from the play call.
    drive_frames(&mut engine, &clock, 1, 100.0);
    assert!(approx(engine.get_elapsed_time(), 0.2));
    assert!(approx(engine.source_timer("src").unwrap(), 0.2));
}

#[test]
fn play_from_stopped_zeroes_source_timers() {
    let (mut engine, clock) = running_line();
    engine.play();
    drive_frames(&mut engine, &clock, 1, 100.0);
    engine.reset();
    engine.play();
    assert_eq!(engine.source_timer("src"), Some(0.0));
}

#[test]
fn frames_after_pause_do_nothing() {
    let (mut engine, clock) = running_line();
    engine.play();
    let handle = clock.pending().unwrap();
    engine.pause();
    assert!(!engine.on_animation_frame(handle, clock.advance(250.0)));
    assert_eq!(engine.get_elapsed_time(), 0.0);
    assert!(clock.pending().is_none());
}

// ===========================================================================
// Events
// ===========================================================================

#[test]
fn panicking_listener_does_not_abort_the_frame() {
    let (mut engine, clock) = running_line();
    let ticks = Rc::new(Cell::new(0));

    engine.on(EventKind::Tick, Box::new(|_| panic!("listener failure")));
    let counter = Rc::clone(&ticks);
    engine.on(
        EventKind::Tick,
        Box::new(move |_| counter.set(counter.get() + 1)),
    );

    engine.play();
    assert_eq!(drive_frames(&mut engine, &clock, 3, 250.0), 3);
    assert_eq!(ticks.get(), 3);
    assert_eq!(engine.get_status(), SimulationStatus::Running);
    assert!(approx(engine.get_elapsed_time(), 0.75));
}

#[test]
fn off_stops_delivery() {
    let (mut engine, clock) = running_line();
    let ticks = Rc::new(Cell::new(0));
    let counter = Rc::clone(&ticks);
    let id = engine.on(
        EventKind::Tick,
        Box::new(move |_| counter.set(counter.get() + 1)),
    );

    engine.play();
    drive_frames(&mut engine, &clock, 2, 250.0);
    assert!(engine.off(EventKind::Tick, id));
    drive_frames(&mut engine, &clock, 2, 250.0);

    assert_eq!(ticks.get(), 2);
    assert_eq!(engine.events().total_emitted(EventKind::Tick), 4);
}

#[test]
fn dispose_resets_before_dropping_listeners() {
    let (mut engine, clock) = running_line();
    engine.play();
    drive_frames(&mut engine, &clock, 4, 250.0);
    let log = EventLog::attach_all(&mut engine);

    engine.dispose();

    assert_eq!(log.count(EventKind::TokenRemoved), 2);
    assert_eq!(log.count(EventKind::StatusChange), 1);
    assert!(clock.pending().is_none());
}

// ===========================================================================
// Layout replacement
// ===========================================================================

#[test]
fn orphaned_tokens_are_dropped_on_the_next_frame() {
    let (mut engine, clock) = running_line();
    engine.play();
    drive_frames(&mut engine, &clock, 3, 250.0);
    assert_eq!(engine.get_tokens()[0].current_device_id.as_str(), "belt");

    let log = EventLog::attach(&mut engine, &[EventKind::TokenRemoved]);
    engine.update_layout(EditorLayout::new(
        vec![
            source("src", 0.0, 2.0).with_state(DeviceState::Running),
            sink("sink", 250.0).with_state(DeviceState::Running),
        ],
        vec![],
    ));

    // Still present until a frame runs.
    assert_eq!(engine.get_tokens().len(), 1);
    assert!(log.is_empty());

    drive_frames(&mut engine, &clock, 1, 250.0);
    let removed = log.events();
    assert_eq!(removed.len(), 1);
    match &removed[0].data {
        EventData::TokenRemoved { token } => assert_eq!(token.id, TokenId(1)),
        other => panic!("unexpected payload {other:?}"),
    }
    // The surviving source timer kept running and spawned again.
    assert_eq!(engine.get_tokens().len(), 1);
    assert_eq!(engine.get_tokens()[0].id, TokenId(2));
}

#[test]
fn junction_forwards_to_first_output() {
    let layout = EditorLayout::new(
        vec![
            source("src", 0.0, 1.0).with_state(DeviceState::Running),
            junction("j", 50.0).with_state(DeviceState::Running),
            conveyor("left", 100.0, 100.0, 100.0).with_state(DeviceState::Running),
            conveyor("right", 100.0, 100.0, 100.0).with_state(DeviceState::Running),
        ],
        vec![connect("src", "j"), connect("j", "left"), connect("j", "right")],
    );
    let clock = ManualScheduler::new();
    let mut engine = Engine::new(layout, clock.clone());
    let log = EventLog::attach(&mut engine, &[EventKind::TokenMoved]);
    engine.play();
    drive_frames(&mut engine, &clock, 12, 250.0);

    let destinations: Vec<String> = log
        .events()
        .into_iter()
        .filter_map(|e| match e.data {
            EventData::TokenMoved { to_device, .. } => Some(to_device.to_string()),
            _ => None,
        })
        .filter(|to| to != "j")
        .collect();
    assert!(!destinations.is_empty());
    assert!(destinations.iter().all(|to| to == "left"));
}

// ===========================================================================
// Rendering
// ===========================================================================

#[test]
fn renderer_draws_on_attach_frames_and_reset() {
    let (mut engine, clock) = running_line();
    let mut surface = RecordingSurface::default();
    engine.attach_renderer(&mut surface).unwrap();
    assert_eq!(surface.renderer.passes(), 1);

    engine.play();
    drive_frames(&mut engine, &clock, 4, 250.0);
    assert_eq!(surface.renderer.passes(), 5);
    assert_eq!(surface.renderer.last_tokens().unwrap().len(), 2);
    assert_eq!(
        surface.renderer.last_status(),
        Some(SimulationStatus::Running)
    );

    engine.pause();
    assert_eq!(surface.renderer.passes(), 5);

    engine.reset();
    assert_eq!(surface.renderer.passes(), 6);
    assert_eq!(surface.renderer.last_tokens(), Some(vec![]));
    assert_eq!(
        surface.renderer.last_status(),
        Some(SimulationStatus::Stopped)
    );
}

#[test]
fn draw_pass_order() {
    let (mut engine, _) = running_line();
    let mut surface = RecordingSurface::default();
    engine.attach_renderer(&mut surface).unwrap();

    let calls = surface.renderer.calls();
    assert_eq!(calls.len(), 5);
    assert_eq!(calls[0], DrawCall::Clear);
    assert_eq!(calls[1], DrawCall::Connections(2));
    assert!(matches!(&calls[2], DrawCall::Devices(d) if d.len() == 3));
    assert_eq!(calls[3], DrawCall::Tokens(vec![]));
    let (x, y) = STATUS_POSITION;
    assert_eq!(calls[4], DrawCall::Status(SimulationStatus::Stopped, x, y));
}

#[test]
fn detached_renderer_stops_receiving_passes() {
    let (mut engine, _) = running_line();
    let mut surface = RecordingSurface::default();
    engine.attach_renderer(&mut surface).unwrap();
    engine.detach_renderer();
    engine.force_render();
    assert_eq!(surface.renderer.passes(), 1);
    assert!(!engine.has_renderer());
}

#[test]
fn renderer_acquisition_failure_is_returned() {
    let (mut engine, _) = running_line();
    let mut surface = RecordingSurface::failing("no 2d context");
    let err = engine.attach_renderer(&mut surface).unwrap_err();
    match err {
        EngineError::RendererUnavailable(RenderError::ContextUnavailable { reason }) => {
            assert_eq!(reason, "no 2d context");
        }
    }
    assert!(!engine.has_renderer());
}
