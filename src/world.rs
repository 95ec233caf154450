pub mod cache;
pub mod events;
pub mod listeners;
pub mod pick;
pub mod properties;
pub mod scene;
pub mod window;

pub use cache::{BasicGpuResourceCache, GpuResource, GpuResourceCache, ResourceKind, SharedGpuResourceCache};
pub use events::{
    Message, NodeId, PositionEvent, PropertyChangeEvent, RenderingEvent, RenderingStage, SelectEvent,
    SelectEventKind, WindowProperty,
};
pub use listeners::{
    listener, Listener, ListenerSet, PositionListener, RenderingExceptionListener, RenderingListener, SelectListener,
};
pub use pick::{PickedObject, PickedObjectList, Position, ScreenPoint, ScreenRect};
pub use properties::{AttributeKey, Attributes, PerformanceStatistic, PropertyObserver, StatisticKey};
pub use scene::{InputHandler, Model, NoOpInputHandler, RenderPass, SceneController, View};
pub use window::WorldWindow;
