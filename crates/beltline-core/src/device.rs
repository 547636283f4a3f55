//! Layout data model: devices, connections, and the editor layout that
//! carries them into the engine.
//!
//! Records serialize as flat camelCase objects with a `type` tag, matching
//! the editor's JSON:
//!
//! ```json
//! { "id": "belt", "type": "conveyor", "position": { "x": 50, "y": 0 },
//!   "width": 200, "height": 50, "state": "running",
//!   "speed": 100, "direction": "right" }
//! ```

use crate::id::DeviceId;
use serde::{Deserialize, Serialize};

/// Fallback reason recorded when a device is put into the faulted state
/// without an explicit reason.
pub const UNSPECIFIED_FAULT: &str = "unspecified fault";

// ---------------------------------------------------------------------------
// Geometry primitives
// ---------------------------------------------------------------------------

/// A point on the layout canvas.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(self, other: Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// Travel direction of a conveyor (and the declared output side of a junction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    #[default]
    Right,
    Up,
    Down,
}

// ---------------------------------------------------------------------------
// Device state
// ---------------------------------------------------------------------------

/// Run state of a device. Only running devices move tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Running,
    #[default]
    Stopped,
    Faulted,
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            DeviceState::Running => "running",
            DeviceState::Stopped => "stopped",
            DeviceState::Faulted => "faulted",
        })
    }
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

/// Variant-specific device data. The `type` tag of the serialized record
/// selects the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceKind {
    Conveyor {
        /// Canvas units per second.
        speed: f64,
        direction: Direction,
    },
    Source {
        /// Tokens per second.
        generation_rate: f64,
    },
    Sink,
    Junction {
        /// Declared but not consulted by transfer logic; tokens always leave
        /// through the first connected output.
        output_direction: Direction,
    },
}

/// Plain discriminant of [`DeviceKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Conveyor,
    Source,
    Sink,
    Junction,
}

impl DeviceKind {
    pub fn device_type(&self) -> DeviceType {
        match self {
            DeviceKind::Conveyor { .. } => DeviceType::Conveyor,
            DeviceKind::Source { .. } => DeviceType::Source,
            DeviceKind::Sink => DeviceType::Sink,
            DeviceKind::Junction { .. } => DeviceType::Junction,
        }
    }
}

/// A stationary node of the layout.
///
/// `state` and `fault_reason` are public for (de)serialization, but the
/// engine only changes them through [`set_state`](Self::set_state),
/// [`fault`](Self::fault) and [`clear_fault`](Self::clear_fault), which keep
/// `fault_reason` present exactly when the device is faulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DeviceRecord", into = "DeviceRecord")]
pub struct Device {
    pub id: DeviceId,
    /// Top-left corner of the bounding box.
    pub position: Point,
    pub width: f64,
    pub height: f64,
    pub state: DeviceState,
    pub fault_reason: Option<String>,
    pub kind: DeviceKind,
}

/// Error converting a flat device record into a [`Device`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceRecordError {
    #[error("device {device} ({device_type:?}) is missing `{field}`")]
    MissingField {
        device: DeviceId,
        device_type: DeviceType,
        field: &'static str,
    },
}

/// Serialized shape of a [`Device`]: one flat record with a `type` tag and
/// the variant fields as optional siblings. Formats without flattening
/// support (RON) read and write this shape directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceRecord {
    id: DeviceId,
    #[serde(rename = "type")]
    device_type: DeviceType,
    position: Point,
    width: f64,
    height: f64,
    #[serde(default)]
    state: DeviceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fault_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    generation_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_direction: Option<Direction>,
}

impl TryFrom<DeviceRecord> for Device {
    type Error = DeviceRecordError;

    fn try_from(record: DeviceRecord) -> Result<Self, Self::Error> {
        let missing = |field: &'static str| DeviceRecordError::MissingField {
            device: record.id.clone(),
            device_type: record.device_type,
            field,
        };
        let kind = match record.device_type {
            DeviceType::Conveyor => DeviceKind::Conveyor {
                speed: record.speed.ok_or_else(|| missing("speed"))?,
                direction: record.direction.unwrap_or_default(),
            },
            DeviceType::Source => DeviceKind::Source {
                generation_rate: record
                    .generation_rate
                    .ok_or_else(|| missing("generationRate"))?,
            },
            DeviceType::Sink => DeviceKind::Sink,
            DeviceType::Junction => DeviceKind::Junction {
                output_direction: record.output_direction.unwrap_or_default(),
            },
        };
        Ok(Device {
            id: record.id,
            position: record.position,
            width: record.width,
            height: record.height,
            state: record.state,
            fault_reason: record.fault_reason,
            kind,
        })
    }
}

impl From<Device> for DeviceRecord {
    fn from(device: Device) -> Self {
        let mut record = DeviceRecord {
            id: device.id,
            device_type: device.kind.device_type(),
            position: device.position,
            width: device.width,
            height: device.height,
            state: device.state,
            fault_reason: device.fault_reason,
            speed: None,
            direction: None,
            generation_rate: None,
            output_direction: None,
        };
        match device.kind {
            DeviceKind::Conveyor { speed, direction } => {
                record.speed = Some(speed);
                record.direction = Some(direction);
            }
            DeviceKind::Source { generation_rate } => {
                record.generation_rate = Some(generation_rate);
            }
            DeviceKind::Sink => {}
            DeviceKind::Junction { output_direction } => {
                record.output_direction = Some(output_direction);
            }
        }
        record
    }
}

impl Device {
    /// Create a stopped device.
    pub fn new(
        id: impl Into<DeviceId>,
        kind: DeviceKind,
        position: Point,
        width: f64,
        height: f64,
    ) -> Self {
        Self {
            id: id.into(),
            position,
            width,
            height,
            state: DeviceState::Stopped,
            fault_reason: None,
            kind,
        }
    }

    /// Builder-style state override. A faulted state gets the unspecified
    /// fault reason.
    pub fn with_state(mut self, state: DeviceState) -> Self {
        self.set_state(state);
        self
    }

    pub fn device_type(&self) -> DeviceType {
        self.kind.device_type()
    }

    pub fn is_source(&self) -> bool {
        self.device_type() == DeviceType::Source
    }

    pub fn is_sink(&self) -> bool {
        self.device_type() == DeviceType::Sink
    }

    pub fn is_running(&self) -> bool {
        self.state == DeviceState::Running
    }

    /// Source generation rate, or `None` for other device types.
    pub fn generation_rate(&self) -> Option<f64> {
        match self.kind {
            DeviceKind::Source { generation_rate } => Some(generation_rate),
            _ => None,
        }
    }

    /// Set the run state. Leaving the faulted state drops the fault reason;
    /// entering it without a reason records [`UNSPECIFIED_FAULT`].
    pub fn set_state(&mut self, state: DeviceState) {
        self.state = state;
        if state == DeviceState::Faulted {
            if self.fault_reason.is_none() {
                self.fault_reason = Some(UNSPECIFIED_FAULT.to_string());
            }
        } else {
            self.fault_reason = None;
        }
    }

    /// Fault the device with a human-readable reason.
    pub fn fault(&mut self, reason: impl Into<String>) {
        self.state = DeviceState::Faulted;
        self.fault_reason = Some(reason.into());
    }

    /// Clear a fault, leaving the device stopped. Returns false (and changes
    /// nothing) if the device was not faulted.
    pub fn clear_fault(&mut self) -> bool {
        if self.state != DeviceState::Faulted {
            return false;
        }
        self.state = DeviceState::Stopped;
        self.fault_reason = None;
        true
    }
}

// ---------------------------------------------------------------------------
// Connections and layouts
// ---------------------------------------------------------------------------

/// Connection endpoint label. Carries no behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Port {
    Input,
    Output,
}

fn output_port() -> Port {
    Port::Output
}

fn input_port() -> Port {
    Port::Input
}

/// A directed connection between two devices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub from_device_id: DeviceId,
    pub to_device_id: DeviceId,
    #[serde(default = "output_port")]
    pub from_port: Port,
    #[serde(default = "input_port")]
    pub to_port: Port,
}

impl Connection {
    pub fn new(from: impl Into<DeviceId>, to: impl Into<DeviceId>) -> Self {
        Self {
            from_device_id: from.into(),
            to_device_id: to.into(),
            from_port: Port::Output,
            to_port: Port::Input,
        }
    }
}

/// Devices plus connections, as produced by the layout editor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EditorLayout {
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl EditorLayout {
    pub fn new(devices: Vec<Device>, connections: Vec<Connection>) -> Self {
        Self {
            devices,
            connections,
        }
    }
}
