//! Format detection and deserialization of layout and config files.

use beltline_core::device::EditorLayout;
use beltline_core::sim::SimulationConfig;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur while loading a data file.
#[derive(Debug, thiserror::Error)]
pub enum LayoutLoadError {
    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, LayoutLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(LayoutLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Deserialize `content` in `format`. `file` only labels errors.
pub fn deserialize_str<T: DeserializeOwned>(
    content: &str,
    format: Format,
    file: &Path,
) -> Result<T, LayoutLoadError> {
    let parse_error = |detail: String| LayoutLoadError::Parse {
        file: file.to_path_buf(),
        detail,
    };
    match format {
        Format::Ron => ron::from_str(content).map_err(|e| parse_error(e.to_string())),
        Format::Json => serde_json::from_str(content).map_err(|e| parse_error(e.to_string())),
        Format::Toml => toml::from_str(content).map_err(|e| parse_error(e.to_string())),
    }
}

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, LayoutLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    deserialize_str(&content, format, path)
}

// ===========================================================================
// Loaders
// ===========================================================================

/// Load an editor layout.
pub fn load_layout(path: &Path) -> Result<EditorLayout, LayoutLoadError> {
    let layout: EditorLayout = deserialize_file(path)?;
    debug!(
        file = %path.display(),
        devices = layout.devices.len(),
        connections = layout.connections.len(),
        "layout loaded"
    );
    Ok(layout)
}

/// Load a simulation config. Fields the file omits keep their defaults and
/// the time scale is clamped into range.
pub fn load_config(path: &Path) -> Result<SimulationConfig, LayoutLoadError> {
    let config: SimulationConfig = deserialize_file(path)?;
    let config = config.normalized();
    debug!(file = %path.display(), time_scale = config.time_scale, "config loaded");
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
