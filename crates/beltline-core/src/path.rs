//! Path geometry: where a token enters and leaves a device, and how far it
//! moves per frame.
//!
//! Conveyors route tokens between opposite edge midpoints according to
//! their direction. Every other device type routes left-middle to
//! right-middle.

use crate::device::{Device, DeviceKind, Direction, Point};
use crate::id::DeviceId;

/// Speed, in canvas units per second, of running devices that have no
/// speed of their own (sources, sinks, junctions).
pub const DEFAULT_DEVICE_SPEED: f64 = 100.0;

/// The straight segment a token follows across one device. Derived from the
/// device's geometry; never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSegment {
    pub device_id: DeviceId,
    pub entry_point: Point,
    pub exit_point: Point,
    /// Euclidean distance between entry and exit.
    pub length: f64,
}

fn left_mid(d: &Device) -> Point {
    Point::new(d.position.x, d.position.y + d.height / 2.0)
}

fn right_mid(d: &Device) -> Point {
    Point::new(d.position.x + d.width, d.position.y + d.height / 2.0)
}

fn top_mid(d: &Device) -> Point {
    Point::new(d.position.x + d.width / 2.0, d.position.y)
}

fn bottom_mid(d: &Device) -> Point {
    Point::new(d.position.x + d.width / 2.0, d.position.y + d.height)
}

/// Point where tokens enter `device`.
pub fn entry_point(device: &Device) -> Point {
    match device.kind {
        DeviceKind::Conveyor { direction, .. } => match direction {
            Direction::Right => left_mid(device),
            Direction::Left => right_mid(device),
            Direction::Down => top_mid(device),
            Direction::Up => bottom_mid(device),
        },
        _ => left_mid(device),
    }
}

/// Point where tokens leave `device`.
pub fn exit_point(device: &Device) -> Point {
    match device.kind {
        DeviceKind::Conveyor { direction, .. } => match direction {
            Direction::Right => right_mid(device),
            Direction::Left => left_mid(device),
            Direction::Down => bottom_mid(device),
            Direction::Up => top_mid(device),
        },
        _ => right_mid(device),
    }
}

/// Compute the path segment across `device`.
pub fn segment(device: &Device) -> PathSegment {
    let entry_point = entry_point(device);
    let exit_point = exit_point(device);
    PathSegment {
        device_id: device.id.clone(),
        entry_point,
        exit_point,
        length: entry_point.distance(exit_point),
    }
}

/// Linear interpolation along `segment`. `progress` is clamped to `[0, 1]`
/// first, so the result never leaves the segment.
pub fn position_at_progress(segment: &PathSegment, progress: f64) -> Point {
    let t = progress.clamp(0.0, 1.0);
    Point::new(
        segment.entry_point.x + (segment.exit_point.x - segment.entry_point.x) * t,
        segment.entry_point.y + (segment.exit_point.y - segment.entry_point.y) * t,
    )
}

/// Speed at which tokens cross `device`. Zero unless the device is running.
pub fn effective_speed(device: &Device) -> f64 {
    if !device.is_running() {
        return 0.0;
    }
    match device.kind {
        DeviceKind::Conveyor { speed, .. } => speed,
        _ => DEFAULT_DEVICE_SPEED,
    }
}

/// Fraction of `segment` covered in `dt` seconds at `time_scale`:
/// `speed * dt * time_scale / length`. Zero for immobile devices and
/// degenerate segments.
pub fn progress_delta(device: &Device, segment: &PathSegment, dt: f64, time_scale: f64) -> f64 {
    let speed = effective_speed(device);
    if speed == 0.0 || segment.length == 0.0 {
        return 0.0;
    }
    speed * dt * time_scale / segment.length
}
