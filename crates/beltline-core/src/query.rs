//! Read-only views of the engine state.

use crate::device::Device;
use crate::sim::SimulationStatus;
use crate::token::Token;
use serde::Serialize;

/// Owned copy of the engine state at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSnapshot {
    pub status: SimulationStatus,
    /// Simulated seconds since the last reset.
    pub elapsed_time: f64,
    pub time_scale: f64,
    /// Devices in layout order.
    pub devices: Vec<Device>,
    pub tokens: Vec<Token>,
    pub token_count: usize,
}

impl SimulationSnapshot {
    /// Tokens currently on `device_id`.
    pub fn tokens_on<'a>(&'a self, device_id: &'a str) -> impl Iterator<Item = &'a Token> + 'a {
        self.tokens
            .iter()
            .filter(move |t| t.current_device_id.as_str() == device_id)
    }

    pub fn device(&self, device_id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id.as_str() == device_id)
    }
}
