use crate::config::BridgeConfig;
use crate::errors::BridgeError;
use crate::render::GpuContext;
use std::fmt::{Display, Formatter};

/// State of the offscreen surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceState {
    /// No context was ever created.
    Uninitialized,
    Ready,
    /// A context was recreated; GPU caches are being rebuilt.
    ReinitializingContext,
    ShuttingDown,
    /// Terminal.
    Shutdown,
}

impl Display for SurfaceState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceState::Uninitialized => write!(f, "Uninitialized"),
            SurfaceState::Ready => write!(f, "Ready"),
            SurfaceState::ReinitializingContext => write!(f, "ReinitializingContext"),
            SurfaceState::ShuttingDown => write!(f, "ShuttingDown"),
            SurfaceState::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// What a freshly created context looks like.
#[derive(Debug)]
pub struct ContextReport {
    /// Missing requirements. Rendering continues; these go to the rendering-exception
    /// listeners.
    pub problems: Vec<BridgeError>,
    /// GPU caches must be cleared and the scene controller reinitialized.
    pub reinitialize: bool,
}

/// Tracks surface (re)initialization and shutdown.
#[derive(Debug)]
pub struct SurfaceLifecycleManager {
    state: SurfaceState,
    enable_gpu_cache_reinitialization: bool,
    required_functions: Vec<String>,
    required_extensions: Vec<String>,
    contexts_created: u64,
}

impl SurfaceLifecycleManager {
    pub fn new(required_functions: Vec<String>, required_extensions: Vec<String>) -> Self {
        Self {
            state: SurfaceState::Uninitialized,
            enable_gpu_cache_reinitialization: true,
            required_functions,
            required_extensions,
            contexts_created: 0,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        let mut lm = Self::new(config.required_functions.clone(), config.required_extensions.clone());
        lm.enable_gpu_cache_reinitialization = config.enable_gpu_cache_reinitialization;
        lm
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn contexts_created(&self) -> u64 {
        self.contexts_created
    }

    pub fn is_enable_gpu_cache_reinitialization(&self) -> bool {
        self.enable_gpu_cache_reinitialization
    }

    pub fn set_enable_gpu_cache_reinitialization(&mut self, enabled: bool) {
        self.enable_gpu_cache_reinitialization = enabled;
    }

    /// Lists every requirement `gpu` does not meet.
    pub fn check_capabilities(&self, gpu: &dyn GpuContext) -> Vec<BridgeError> {
        let mut problems = Vec::new();

        let profile = gpu.profile();
        if !profile.provides_gl2() {
            problems.push(BridgeError::UnsupportedContext { profile: profile.to_string() });
        }
        for name in &self.required_functions {
            if !gpu.is_function_available(name) {
                problems.push(BridgeError::MissingCapability(name.clone()));
            }
        }
        for name in &self.required_extensions {
            if !gpu.is_extension_available(name) {
                problems.push(BridgeError::MissingCapability(name.clone()));
            }
        }
        problems
    }

    /// Called whenever a context was created. The first context only gets checked; later
    /// ones also request cache reinitialization when that is enabled.
    pub fn on_context_created(&mut self, gpu: &dyn GpuContext) -> ContextReport {
        let problems = self.check_capabilities(gpu);
        for p in &problems {
            log::warn!("{p}");
        }

        self.contexts_created += 1;
        let first = self.state == SurfaceState::Uninitialized;
        let reinitialize = match self.state {
            SurfaceState::Uninitialized => {
                self.state = SurfaceState::Ready;
                false
            }
            SurfaceState::Ready | SurfaceState::ReinitializingContext if self.enable_gpu_cache_reinitialization => {
                self.state = SurfaceState::ReinitializingContext;
                true
            }
            _ => false,
        };
        log::debug!(
            "context #{} created (first: {first}, reinitialize: {reinitialize})",
            self.contexts_created
        );

        ContextReport { problems, reinitialize }
    }

    /// Called after the handler has seen the context report.
    pub fn context_ready(&mut self) {
        if self.state == SurfaceState::ReinitializingContext {
            self.state = SurfaceState::Ready;
        }
    }

    pub fn begin_shutdown(&mut self) {
        if self.state != SurfaceState::Shutdown {
            self.state = SurfaceState::ShuttingDown;
        }
    }

    pub fn finish_shutdown(&mut self) {
        self.state = SurfaceState::Shutdown;
    }
}
