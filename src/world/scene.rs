//! Seams to the globe rendering engine.
//!
//! The engine itself (terrain, layers, picking) lives behind these traits. The bridge only
//! needs to drive a render pass, sample the view state, collect pick results and deliver
//! messages to the model.

use crate::bridge::RedrawRequester;
use crate::render::{GpuContext, SurfaceSize};
use crate::world::cache::SharedGpuResourceCache;
use crate::world::events::{Message, NodeId};
use crate::world::listeners::SelectListener;
use crate::world::pick::{PickedObjectList, ScreenPoint, ScreenRect};
use std::time::Duration;

/// Layers and globe of a window.
pub trait Model {
    fn on_message(&mut self, msg: &Message);

    /// Releases everything the model holds. Called once on shutdown.
    fn dispose(&mut self) {}
}

/// Camera of a window.
pub trait View {
    /// Changes whenever anything about the view changes. Equal ids mean equal views.
    fn view_state_id(&self) -> u64;
}

/// Translates UI input into engine actions and select events.
pub trait InputHandler {
    /// Attaches the handler to the node that emits input, or detaches it with `None`.
    fn set_event_source(&mut self, source: Option<NodeId>);

    fn event_source(&self) -> Option<NodeId>;

    fn add_select_listener(&mut self, listener: SelectListener);

    fn remove_select_listener(&mut self, listener: &SelectListener);

    fn dispose(&mut self) {}
}

/// Input handler that ignores everything.
#[derive(Debug, Default)]
pub struct NoOpInputHandler {
    source: Option<NodeId>,
}

impl InputHandler for NoOpInputHandler {
    fn set_event_source(&mut self, source: Option<NodeId>) {
        self.source = source;
    }

    fn event_source(&self) -> Option<NodeId> {
        self.source
    }

    fn add_select_listener(&mut self, _listener: SelectListener) {}

    fn remove_select_listener(&mut self, _listener: &SelectListener) {}
}

/// Everything a scene controller may touch while rendering one frame.
pub struct RenderPass<'a> {
    pub gpu: &'a mut dyn GpuContext,
    pub model: Option<&'a mut dyn Model>,
    pub view: Option<&'a mut dyn View>,
    pub viewport: SurfaceSize,
    pub gpu_cache: Option<&'a SharedGpuResourceCache>,
}

/// Renders the model through the view.
pub trait SceneController {
    /// Renders one frame. `Some(delay)` asks for another frame after `delay` (animations,
    /// tiles still loading).
    fn repaint(&mut self, pass: &mut RenderPass<'_>) -> anyhow::Result<Option<Duration>>;

    /// Errors collected during the last frame that did not abort it.
    fn take_rendering_exceptions(&mut self) -> Vec<anyhow::Error> {
        Vec::new()
    }

    /// Duration of the last frame in milliseconds.
    fn frame_time(&self) -> Option<f64> {
        None
    }

    fn frames_per_second(&self) -> Option<f64> {
        None
    }

    /// Objects under the pick point after the last frame.
    fn picked_object_list(&self) -> Option<&PickedObjectList> {
        None
    }

    /// Objects inside the pick rectangle after the last frame.
    fn objects_in_pick_rectangle(&self) -> Option<&PickedObjectList> {
        None
    }

    fn pick_point(&self) -> Option<ScreenPoint> {
        None
    }

    fn pick_rectangle(&self) -> Option<ScreenRect> {
        None
    }

    /// Drops every GPU handle; the context they belonged to is gone.
    fn reinitialize(&mut self) {}

    fn dispose(&mut self) {}

    /// Hands the controller a way to request frames outside of a render pass.
    fn attach(&mut self, _redraw: RedrawRequester) {}
}
