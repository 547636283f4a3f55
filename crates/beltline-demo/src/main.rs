//! Beltline headless demo
//!
//! Loads a layout, drives the engine with a manual frame clock, and prints
//! text frames of the simulation.
//!
//! # Example
//!
//! ```bash
//! # Run the built-in layout for ten simulated seconds
//! beltline-demo --frames 600 --frame-ms 16.667 --render-every 60
//!
//! # Jam the feed belt after two seconds
//! beltline-demo --fault "feed-belt=Motor jam" --fault-at 120
//! ```

mod error;
mod text;

use beltline_core::engine::Engine;
use beltline_core::event::{EventData, EventKind};
use beltline_core::schedule::ManualScheduler;
use beltline_core::sim::SimulationConfig;
use beltline_data::loader::{Format, deserialize_str};
use clap::Parser;
use error::DemoError;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use text::TextSurface;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const BUILTIN_LAYOUT: &str = include_str!("../layouts/basic_line.json");

/// Beltline demo
///
/// Runs a conveyor-network layout headlessly at a fixed frame interval.
#[derive(Parser, Debug)]
#[command(name = "beltline-demo")]
#[command(version, about, long_about = None)]
struct Args {
    /// Layout file (.ron, .toml or .json). Defaults to the built-in line.
    #[arg(short = 'l', long)]
    layout: Option<PathBuf>,

    /// Simulation config file (.ron, .toml or .json)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Number of frames to run
    #[arg(short = 'n', long, default_value = "300")]
    frames: usize,

    /// Milliseconds between frames
    #[arg(long, default_value = "16.667")]
    frame_ms: f64,

    /// Time scale override, clamped to [0.1, 10]
    #[arg(short = 't', long)]
    time_scale: Option<f64>,

    /// Fault a device, as <device>=<reason>. Repeatable.
    #[arg(long = "fault")]
    faults: Vec<String>,

    /// Frame (1..=frames) at which the faults are applied
    #[arg(long, default_value = "1")]
    fault_at: usize,

    /// Print every n-th frame (0 prints only the summary)
    #[arg(long, default_value = "60")]
    render_every: usize,
}

fn parse_fault(spec: &str) -> Result<(String, String), DemoError> {
    match spec.split_once('=') {
        Some((device, reason)) if !device.trim().is_empty() => {
            Ok((device.trim().to_string(), reason.trim().to_string()))
        }
        _ => Err(DemoError::InvalidFault {
            spec: spec.to_string(),
        }),
    }
}

fn run(args: &Args) -> Result<(), DemoError> {
    let layout = match &args.layout {
        Some(path) => beltline_data::load_layout(path)?,
        None => deserialize_str(BUILTIN_LAYOUT, Format::Json, Path::new("basic_line.json"))?,
    };
    let mut config = match &args.config {
        Some(path) => beltline_data::load_config(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(scale) = args.time_scale {
        config = config.with_time_scale(scale);
    }
    let faults = args
        .faults
        .iter()
        .map(|spec| parse_fault(spec))
        .collect::<Result<Vec<_>, _>>()?;
    if !faults.is_empty() && !(1..=args.frames).contains(&args.fault_at) {
        return Err(DemoError::FaultFrameOutOfRange {
            fault_at: args.fault_at,
            frames: args.frames,
        });
    }

    let clock = ManualScheduler::new();
    let mut engine = Engine::with_config(layout, config.clone(), clock.clone());
    let mut surface = TextSurface::new(config);
    engine.attach_renderer(&mut surface)?;

    let created = Rc::new(Cell::new(0usize));
    let consumed = Rc::new(Cell::new(0usize));
    {
        let created = Rc::clone(&created);
        engine.on(
            EventKind::TokenCreated,
            Box::new(move |_| created.set(created.get() + 1)),
        );
        let consumed = Rc::clone(&consumed);
        engine.on(
            EventKind::TokenRemoved,
            Box::new(move |_| consumed.set(consumed.get() + 1)),
        );
        engine.on(
            EventKind::DeviceStateChange,
            Box::new(|event| {
                if let EventData::DeviceStateChange {
                    device_id,
                    new_state,
                    fault_reason,
                    ..
                } = &event.data
                {
                    info!(
                        device = %device_id,
                        state = %new_state,
                        reason = fault_reason.as_deref().unwrap_or(""),
                        at_ms = event.timestamp,
                        "device state changed"
                    );
                }
            }),
        );
    }

    info!(
        devices = engine.get_graph().node_count(),
        connections = engine.get_graph().edge_count(),
        frames = args.frames,
        frame_ms = args.frame_ms,
        time_scale = engine.get_time_scale(),
        "starting simulation"
    );
    engine.play();

    for frame in 1..=args.frames {
        if frame == args.fault_at {
            for (device, reason) in &faults {
                engine.set_device_fault(device, reason);
            }
        }
        let Some(handle) = clock.take_pending() else {
            break;
        };
        let now = clock.advance(args.frame_ms);
        engine.on_animation_frame(handle, now);

        if args.render_every > 0 && frame % args.render_every == 0 {
            println!("frame {frame} ({:.2}s simulated)", engine.get_elapsed_time());
            print!("{}", surface.latest_frame());
        }
    }

    let snapshot = engine.get_snapshot();
    info!(
        elapsed_time = snapshot.elapsed_time,
        live_tokens = snapshot.token_count,
        created = created.get(),
        removed = consumed.get(),
        "simulation finished"
    );
    println!(
        "{:.2}s simulated: {} created, {} removed, {} in flight",
        snapshot.elapsed_time,
        created.get(),
        consumed.get(),
        snapshot.token_count
    );

    engine.dispose();
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,beltline=info")),
        )
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "demo failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_argument_parsing() {
        assert_eq!(
            parse_fault("feed-belt=Motor jam").unwrap(),
            ("feed-belt".to_string(), "Motor jam".to_string())
        );
        assert_eq!(
            parse_fault("belt=").unwrap(),
            ("belt".to_string(), String::new())
        );
        assert!(parse_fault("no-separator").is_err());
        assert!(parse_fault("=reason").is_err());
    }

    #[test]
    fn builtin_layout_parses() {
        let layout: beltline_core::device::EditorLayout =
            deserialize_str(BUILTIN_LAYOUT, Format::Json, Path::new("basic_line.json")).unwrap();
        assert_eq!(layout.devices.len(), 7);
        assert_eq!(layout.connections.len(), 6);
    }

    #[test]
    fn short_run_completes() {
        let args = Args::parse_from([
            "beltline-demo",
            "--frames",
            "120",
            "--render-every",
            "0",
            "--fault",
            "side-belt=Overheat",
            "--fault-at",
            "30",
        ]);
        run(&args).unwrap();
    }

    #[test]
    fn fault_frame_outside_run_is_rejected() {
        for fault_at in ["0", "121"] {
            let args = Args::parse_from([
                "beltline-demo",
                "--frames",
                "120",
                "--render-every",
                "0",
                "--fault",
                "side-belt=Overheat",
                "--fault-at",
                fault_at,
            ]);
            assert!(matches!(
                run(&args),
                Err(DemoError::FaultFrameOutOfRange { frames: 120, .. })
            ));
        }

        // Without faults the frame is irrelevant.
        let args = Args::parse_from([
            "beltline-demo",
            "--frames",
            "10",
            "--render-every",
            "0",
            "--fault-at",
            "0",
        ]);
        run(&args).unwrap();
    }
}
