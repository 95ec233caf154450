pub mod bridge;
pub mod config;
pub mod errors;
pub mod render;
pub mod scheduler;
pub mod world;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::{GlobeNode, GlobeNodeBuilder, HostNode, ImageDisplay, TickOutcome};
pub use config::BridgeConfig;
pub use errors::BridgeError;
