//! Beltline Core -- a frame-driven simulation engine for conveyor networks.
//!
//! Tokens (units of material) are spawned at source devices, carried along
//! conveyors at each device's speed, handed from device to device along the
//! layout's connections, and consumed at sinks. Stopped or faulted devices
//! hold their tokens in place.
//!
//! # Frame Pipeline
//!
//! The engine owns no clock. It requests frames from a host-provided
//! [`schedule::FrameScheduler`], and each delivered frame through
//! [`engine::Engine::on_animation_frame`] runs:
//!
//! 1. **Clock** -- real delta since the previous frame; simulated time accrues.
//! 2. **Sources** -- running sources spawn one token per elapsed interval.
//! 3. **Tokens** -- advance along their device; transfer or drop on completion.
//! 4. **Tick** -- emit the per-frame `Tick` event.
//! 5. **Render** -- draw once if a renderer is attached.
//!
//! ```rust,ignore
//! let clock = ManualScheduler::new();
//! let mut engine = Engine::new(layout, clock.clone());
//! engine.play();
//! let handle = clock.take_pending().unwrap();
//! engine.on_animation_frame(handle, clock.advance(16.0));
//! ```
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- run-state machine and frame orchestrator.
//! - [`graph::ConnectivityGraph`] -- directed graph over devices; single
//!   owner of the device records.
//! - [`device::Device`] -- a conveyor, source, sink, or junction.
//! - [`token::Token`] -- a unit of material in flight.
//! - [`event::EventBus`] -- typed listener registry with per-kind history.
//! - [`render::Renderer`] -- drawing capability supplied by the host.

pub mod device;
pub mod engine;
pub mod event;
pub mod graph;
pub mod id;
pub mod path;
pub mod query;
pub mod render;
pub mod schedule;
pub mod sim;
pub mod token;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
