//! Bridge configuration.
//!
//! `BridgeConfig` controls how a [`GlobeNode`](crate::bridge::GlobeNode) drives its offscreen
//! surface: the initial drawable size, the frame cadence of the async driver, how long the
//! view must stay unchanged before the model is told the view stopped, and what the GPU
//! context must provide.
//!
//! `BridgeConfig` provides sensible defaults via [`Default`] and a fluent
//! [`BridgeConfig::builder()`] for customization with validation.
//!
//! # Examples
//!
//! ## Use defaults
//! ```rust
//! use globeview::config::BridgeConfig;
//! let cfg = BridgeConfig::default();
//! assert_eq!(cfg.view_stop_delay.as_millis(), 1000);
//! ```
//!
//! ## Customize with the builder
//! ```rust
//! use globeview::config::BridgeConfig;
//! use std::time::Duration;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = BridgeConfig::builder()
//!     .frame_rate(30)
//!     .view_stop_delay(Duration::from_millis(250))
//!     .require_extension("GL_ARB_texture_non_power_of_two")
//!     .build()?; // returns Result<BridgeConfig, ConfigError>
//! # Ok(()) }
//! ```
//!
//! # Fields (summary)
//! - `initial_size`: Size of the offscreen drawable before the first layout (default: 640x480).
//! - `view_stop_delay`: Quiet period before a view-stopped message is sent (default: 1000 ms).
//! - `frame_rate`: Ticks per second of [`GlobeNode::run`](crate::bridge::GlobeNode::run), 1 to
//!   [`MAX_FRAME_RATE`] (default: 60).
//! - `enable_gpu_cache_reinitialization`: Clear GPU caches when the context is recreated (default: true).
//! - `gpu_cache_capacity`: Byte budget of the default GPU resource cache (default: 300 MB).
//! - `required_functions`: GPU functions that must be available on every context.
//! - `required_extensions`: GPU extensions that must be available on every context.

use crate::render::SurfaceSize;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_VIEW_STOP_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_GPU_CACHE_CAPACITY: u64 = 300_000_000;

/// Highest accepted `frame_rate`.
pub const MAX_FRAME_RATE: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub initial_size: SurfaceSize,
    pub view_stop_delay: Duration,
    pub frame_rate: u32,
    pub enable_gpu_cache_reinitialization: bool,
    pub gpu_cache_capacity: u64,
    pub required_functions: Vec<String>,
    pub required_extensions: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            initial_size: SurfaceSize { width: 640, height: 480 },
            view_stop_delay: DEFAULT_VIEW_STOP_DELAY,
            frame_rate: 60,
            enable_gpu_cache_reinitialization: true,
            gpu_cache_capacity: DEFAULT_GPU_CACHE_CAPACITY,
            required_functions: vec!["glActiveTexture".into(), "glClientActiveTexture".into()],
            required_extensions: vec![],
        }
    }
}

impl BridgeConfig {
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Parses a (partial) JSON configuration. Missing fields take their default value.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let cfg: BridgeConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks every field for a usable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate(self)
    }

    /// Interval between two frame ticks.
    pub fn frame_interval(&self) -> Duration {
        let fps = self.frame_rate.clamp(1, MAX_FRAME_RATE);
        Duration::from_nanos(1_000_000_000 / fps as u64)
    }
}

/// Builder for [`BridgeConfig`].
#[derive(Debug, Clone, Default)]
pub struct BridgeConfigBuilder {
    inner: BridgeConfig,
}

impl BridgeConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut BridgeConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn initial_size(self, width: u32, height: u32) -> Self { self.map(|c| c.initial_size = SurfaceSize { width, height }) }
    pub fn view_stop_delay(self, delay: Duration) -> Self { self.map(|c| c.view_stop_delay = delay) }
    pub fn frame_rate(self, fps: u32) -> Self { self.map(|c| c.frame_rate = fps) }
    pub fn enable_gpu_cache_reinitialization(self, on: bool) -> Self { self.map(|c| c.enable_gpu_cache_reinitialization = on) }
    pub fn gpu_cache_capacity(self, bytes: u64) -> Self { self.map(|c| c.gpu_cache_capacity = bytes) }
    pub fn require_function<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.required_functions.push(name.into())) }
    pub fn require_extension<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.required_extensions.push(name.into())) }

    /// Replaces the list of required functions.
    pub fn required_functions<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        self.map(|c| c.required_functions = names)
    }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut BridgeConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<BridgeConfig, ConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("frame_rate must be at least 1")]
    ZeroFrameRate,
    #[error("frame_rate {0} exceeds the maximum of {max}", max = MAX_FRAME_RATE)]
    FrameRateTooHigh(u32),
    #[error("initial_size {width}x{height} must be non-empty")]
    EmptyInitialSize { width: u32, height: u32 },
    #[error("gpu_cache_capacity must be at least 1 byte")]
    ZeroCacheCapacity,
    #[error("view_stop_delay must be longer than zero")]
    ZeroViewStopDelay,
    #[error("cannot parse configuration: {0}")]
    Parse(String),
}

fn validate(c: &BridgeConfig) -> Result<(), ConfigError> {
    if c.frame_rate == 0 {
        return Err(ConfigError::ZeroFrameRate);
    }
    if c.frame_rate > MAX_FRAME_RATE {
        return Err(ConfigError::FrameRateTooHigh(c.frame_rate));
    }
    if c.initial_size.is_empty() {
        return Err(ConfigError::EmptyInitialSize {
            width: c.initial_size.width,
            height: c.initial_size.height,
        });
    }
    if c.gpu_cache_capacity == 0 {
        return Err(ConfigError::ZeroCacheCapacity);
    }
    if c.view_stop_delay.is_zero() {
        return Err(ConfigError::ZeroViewStopDelay);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.initial_size, SurfaceSize { width: 640, height: 480 });
        assert_eq!(cfg.view_stop_delay, Duration::from_millis(1000));
        assert_eq!(cfg.frame_rate, 60);
        assert!(cfg.enable_gpu_cache_reinitialization);
        assert_eq!(cfg.required_functions, vec!["glActiveTexture", "glClientActiveTexture"]);
        assert!(cfg.required_extensions.is_empty());
    }

    #[test]
    fn builder_validates() {
        assert_eq!(
            BridgeConfig::builder().frame_rate(0).build().unwrap_err(),
            ConfigError::ZeroFrameRate
        );
        assert_eq!(
            BridgeConfig::builder().frame_rate(2_000_000_000).build().unwrap_err(),
            ConfigError::FrameRateTooHigh(2_000_000_000)
        );
        assert_eq!(
            BridgeConfig::builder().initial_size(0, 10).build().unwrap_err(),
            ConfigError::EmptyInitialSize { width: 0, height: 10 }
        );
        assert_eq!(
            BridgeConfig::builder().view_stop_delay(Duration::ZERO).build().unwrap_err(),
            ConfigError::ZeroViewStopDelay
        );

        let cfg = BridgeConfig::builder()
            .frame_rate(30)
            .required_functions(["glReadPixels"])
            .require_extension("GL_EXT_bgra")
            .build()
            .unwrap();
        assert_eq!(cfg.frame_rate, 30);
        assert_eq!(cfg.required_functions, vec!["glReadPixels"]);
        assert_eq!(cfg.required_extensions, vec!["GL_EXT_bgra"]);
    }

    #[test]
    fn frame_interval_follows_frame_rate() {
        let cfg = BridgeConfig::builder().frame_rate(50).build().unwrap();
        assert_eq!(cfg.frame_interval(), Duration::from_millis(20));

        let cfg = BridgeConfig::builder().frame_rate(MAX_FRAME_RATE).build().unwrap();
        assert_eq!(cfg.frame_interval(), Duration::from_millis(1));

        let mut unchecked = BridgeConfig::default();
        unchecked.frame_rate = u32::MAX;
        assert!(!unchecked.frame_interval().is_zero());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg = BridgeConfig::from_json_str(r#"{ "frame_rate": 24 }"#).unwrap();
        assert_eq!(cfg.frame_rate, 24);
        assert_eq!(cfg.view_stop_delay, Duration::from_millis(1000));

        assert!(matches!(
            BridgeConfig::from_json_str("{ nope"),
            Err(ConfigError::Parse(_))
        ));
        assert_eq!(
            BridgeConfig::from_json_str(r#"{ "gpu_cache_capacity": 0 }"#).unwrap_err(),
            ConfigError::ZeroCacheCapacity
        );
    }
}
