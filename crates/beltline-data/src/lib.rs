//! Beltline Data -- loads editor layouts and simulation configuration from
//! RON, TOML or JSON files.
//!
//! The format is picked from the file extension. Layout records use the
//! editor's camelCase field names in every format.

pub mod loader;

pub use loader::{Format, LayoutLoadError, detect_format, load_config, load_layout};
