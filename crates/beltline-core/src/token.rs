//! Token lifecycle: creation, per-frame advancement, transfer between
//! devices, and removal eligibility.
//!
//! Functions here take a token by value and hand back the updated token;
//! the engine owns the authoritative token list.

use crate::device::{Device, DeviceState, Point};
use crate::graph::ConnectivityGraph;
use crate::id::{DeviceId, TokenId, TokenIdGenerator};
use crate::path::{entry_point, position_at_progress, progress_delta, segment};
use serde::{Deserialize, Serialize};

/// Display color given to tokens when the caller does not pick one.
pub const DEFAULT_TOKEN_COLOR: &str = "#3b82f6";

/// A unit of material moving through the layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: TokenId,
    pub position: Point,
    /// The device the token is currently crossing.
    pub current_device_id: DeviceId,
    /// Fraction of the current device's path already covered, in `[0, 1]`.
    pub progress: f64,
    pub color: String,
}

/// Result of [`advance_token`].
#[derive(Debug, Clone, PartialEq)]
pub struct TokenAdvance {
    pub token: Token,
    /// True when the unclamped progress reached 1.
    pub completed: bool,
}

/// Create a token at the entry point of `device`.
pub fn create_token(ids: &mut TokenIdGenerator, device: &Device, color: Option<&str>) -> Token {
    Token {
        id: ids.next_id(),
        position: entry_point(device),
        current_device_id: device.id.clone(),
        progress: 0.0,
        color: color.unwrap_or(DEFAULT_TOKEN_COLOR).to_string(),
    }
}

/// Move `token` along `device` for `dt` seconds at `time_scale`.
///
/// Progress is clamped to 1 and the position recomputed from the clamped
/// value; `completed` reports whether the raw progress got there.
pub fn advance_token(mut token: Token, device: &Device, dt: f64, time_scale: f64) -> TokenAdvance {
    let seg = segment(device);
    let raw = token.progress + progress_delta(device, &seg, dt, time_scale);
    token.progress = raw.min(1.0);
    token.position = position_at_progress(&seg, token.progress);
    TokenAdvance {
        token,
        completed: raw >= 1.0,
    }
}

/// Hand `token` over to `next_device`, placing it at that device's entry
/// with zero progress. Id and color are preserved.
pub fn transfer_token(mut token: Token, next_device: &Device) -> Token {
    token.current_device_id = next_device.id.clone();
    token.progress = 0.0;
    token.position = entry_point(next_device);
    token
}

/// The first output of the token's current device. There is no routing
/// policy beyond first match.
pub fn next_device_id<'g>(token: &Token, graph: &'g ConnectivityGraph) -> Option<&'g DeviceId> {
    graph.connected_outputs(token.current_device_id.as_str()).first()
}

/// Whether the engine should drop `token`: its device is gone, or it has
/// finished a device that is a sink or has nowhere to send it.
pub fn should_remove_token(token: &Token, graph: &ConnectivityGraph) -> bool {
    let Some(node) = graph.get_node(token.current_device_id.as_str()) else {
        return true;
    };
    if token.progress < 1.0 {
        return false;
    }
    node.outputs().is_empty() || node.device().is_sink()
}

/// One fresh token on every running source of `graph`, in layout order.
///
/// This is the bulk spawn path; the engine's per-frame generation goes
/// through the source timers instead.
pub fn create_tokens_at_sources(
    graph: &ConnectivityGraph,
    ids: &mut TokenIdGenerator,
    color: Option<&str>,
) -> Vec<Token> {
    graph
        .devices()
        .filter(|d| d.is_source() && d.state == DeviceState::Running)
        .map(|d| create_token(ids, d, color))
        .collect()
}
