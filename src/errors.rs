use crate::config::ConfigError;

/// Errors raised by the bridge.
///
/// Setup errors (`InvalidArgument`, `SurfaceAlreadyBound`, `Config`) are returned to the
/// caller. Capability errors (`UnsupportedContext`, `MissingCapability`) are never returned:
/// they are delivered to the rendering-exception listeners so the host can decide whether to
/// keep rendering in a degraded mode.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Invalid argument: {0} is required")]
    InvalidArgument(&'static str),

    #[error("Offscreen surface is already bound")]
    SurfaceAlreadyBound,

    #[error("Incompatible GPU context: {profile} does not provide the GL2 profile")]
    UnsupportedContext { profile: String },

    #[error("{0} not available")]
    MissingCapability(String),

    #[error("Scene controller is missing on repaint")]
    SceneControllerMissing,

    #[error("Pixel target mismatch: expected {expected} bytes, image has {actual}")]
    PixelTargetMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
