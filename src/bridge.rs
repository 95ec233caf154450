//! The bridge between the globe engine and a UI toolkit.
//!
//! # Main Types
//!
//! - [`GlobeNode`]: The embeddable node. Owns everything below.
//! - [`OffscreenRenderLoop`]: Renders into the offscreen surface whenever the scene is dirty.
//! - [`FrameCompositor`]: The work done for one frame.
//! - [`ViewSettleDebouncer`]: Tells the model when the view stopped moving.
//! - [`SurfaceLifecycleManager`]: Context creation, recreation and shutdown.

pub mod compositor;
pub mod debounce;
pub mod lifecycle;
pub mod node;
pub mod render_loop;

pub use compositor::{FrameCompositor, FrameState};
pub use debounce::{DebounceState, ViewSettleDebouncer};
pub use lifecycle::{ContextReport, SurfaceLifecycleManager, SurfaceState};
pub use node::{GlobeNode, GlobeNodeBuilder, HostNode, ImageDisplay};
pub use render_loop::{DirtyReason, OffscreenRenderLoop, RedrawRequester, SurfaceHandler, TickOutcome};
