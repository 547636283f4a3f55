//! Rendering capability consumed by the engine.
//!
//! Drawing lives outside the core. A host hands the engine a
//! [`RenderSurface`]; the engine acquires a [`Renderer`] from it once and
//! issues read-only draw calls after every frame.

use crate::device::{Connection, Device};
use crate::sim::SimulationStatus;
use crate::token::Token;

/// Canvas position of the status label.
pub const STATUS_POSITION: (f64, f64) = (10.0, 20.0);

/// Failure to obtain a drawing context.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("rendering context unavailable: {reason}")]
    ContextUnavailable { reason: String },
}

/// Side-effecting draw calls. Implementations must not feed anything back
/// into the simulation.
pub trait Renderer {
    fn clear(&mut self);
    fn render_devices(&mut self, devices: &[Device]);
    fn render_connections(&mut self, devices: &[Device], connections: &[Connection]);
    fn render_tokens(&mut self, tokens: &[Token]);
    fn render_status(&mut self, status: SimulationStatus, x: f64, y: f64);
}

/// Something a renderer can be obtained from (a canvas, a terminal, ...).
pub trait RenderSurface {
    fn acquire_renderer(&mut self) -> Result<Box<dyn Renderer>, RenderError>;
}

/// One full draw pass: clear, connections, devices, tokens, status.
pub fn draw_frame(
    renderer: &mut dyn Renderer,
    devices: &[Device],
    connections: &[Connection],
    tokens: &[Token],
    status: SimulationStatus,
) {
    renderer.clear();
    renderer.render_connections(devices, connections);
    renderer.render_devices(devices);
    renderer.render_tokens(tokens);
    let (x, y) = STATUS_POSITION;
    renderer.render_status(status, x, y);
}
