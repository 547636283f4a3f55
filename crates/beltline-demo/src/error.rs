/// Errors that can stop the demo run.
#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    /// A layout or config file could not be loaded.
    #[error(transparent)]
    Load(#[from] beltline_data::LayoutLoadError),

    /// The engine rejected the text surface.
    #[error(transparent)]
    Engine(#[from] beltline_core::engine::EngineError),

    /// A `--fault` argument is not of the form `device=reason`.
    #[error("invalid fault '{spec}', expected <device>=<reason>")]
    InvalidFault { spec: String },

    /// `--fault-at` names a frame the run never reaches.
    #[error("--fault-at {fault_at} is outside the run's frames 1..={frames}")]
    FaultFrameOutOfRange { fault_at: usize, frames: usize },
}
