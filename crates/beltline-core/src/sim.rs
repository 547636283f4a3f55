//! Simulation run status and tunable configuration.

use crate::device::{Device, DeviceState};
use serde::{Deserialize, Serialize};

/// Lower bound of the time scale.
pub const MIN_TIME_SCALE: f64 = 0.1;
/// Upper bound of the time scale.
pub const MAX_TIME_SCALE: f64 = 10.0;

/// Clamp `scale` into `[MIN_TIME_SCALE, MAX_TIME_SCALE]`. NaN falls back to 1.
pub fn clamp_time_scale(scale: f64) -> f64 {
    if scale.is_nan() {
        return 1.0;
    }
    scale.clamp(MIN_TIME_SCALE, MAX_TIME_SCALE)
}

/// Run status of the engine.
///
/// `Stopped -> Running <-> Paused`, and reset returns any status to
/// `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationStatus {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl std::fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            SimulationStatus::Stopped => "stopped",
            SimulationStatus::Running => "running",
            SimulationStatus::Paused => "paused",
        })
    }
}

/// Engine configuration. Every field has a default, so a partial record
/// only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationConfig {
    pub time_scale: f64,
    pub token_color: String,
    pub fault_color: String,
    pub running_color: String,
    pub stopped_color: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            token_color: crate::token::DEFAULT_TOKEN_COLOR.to_string(),
            fault_color: "#ef4444".to_string(),
            running_color: "#22c55e".to_string(),
            stopped_color: "#6b7280".to_string(),
        }
    }
}

impl SimulationConfig {
    /// Copy of `self` with the time scale clamped into range.
    pub fn normalized(mut self) -> Self {
        self.time_scale = clamp_time_scale(self.time_scale);
        self
    }

    /// Builder-style time scale override (clamped).
    pub fn with_time_scale(mut self, scale: f64) -> Self {
        self.time_scale = clamp_time_scale(scale);
        self
    }

    /// Display color for `device` given its run state.
    pub fn device_color(&self, device: &Device) -> &str {
        match device.state {
            DeviceState::Running => &self.running_color,
            DeviceState::Stopped => &self.stopped_color,
            DeviceState::Faulted => &self.fault_color,
        }
    }
}
