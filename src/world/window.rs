use crate::bridge::RedrawRequester;
use crate::world::cache::SharedGpuResourceCache;
use crate::world::events::{Message, NodeId, PropertyChangeEvent, WindowProperty};
use crate::world::listeners::{
    ListenerRegistries, PositionListener, RenderingExceptionListener, RenderingListener, SelectListener,
};
use crate::world::pick::{PickedObject, PickedObjectList, Position};
use crate::world::properties::{Attributes, FrameStatistics, PerformanceStatistic, PropertyObserver, PropertyObservers, StatisticKey};
use crate::world::scene::{InputHandler, Model, NoOpInputHandler, SceneController, View};

/// The engine side of a globe node: model, view, scene controller, input handler, the GPU
/// resource cache and every listener and attribute attached to the window.
pub struct WorldWindow {
    pub(crate) id: NodeId,
    pub(crate) model: Option<Box<dyn Model>>,
    pub(crate) view: Option<Box<dyn View>>,
    pub(crate) scene_controller: Option<Box<dyn SceneController>>,
    pub(crate) input_handler: Box<dyn InputHandler>,
    pub(crate) gpu_cache: Option<SharedGpuResourceCache>,
    pub(crate) listeners: ListenerRegistries,
    pub(crate) observers: PropertyObservers,
    pub(crate) attributes: Attributes,
    pub(crate) statistics: FrameStatistics,
    redraw: RedrawRequester,
}

impl WorldWindow {
    pub fn new(id: NodeId, redraw: RedrawRequester) -> Self {
        Self {
            id,
            model: None,
            view: None,
            scene_controller: None,
            input_handler: Box::new(NoOpInputHandler::default()),
            gpu_cache: None,
            listeners: ListenerRegistries::default(),
            observers: PropertyObservers::default(),
            attributes: Attributes::new(),
            statistics: FrameStatistics::default(),
            redraw,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn model(&self) -> Option<&dyn Model> {
        self.model.as_deref()
    }

    pub fn set_model(&mut self, model: Option<Box<dyn Model>>) -> Option<Box<dyn Model>> {
        let old = std::mem::replace(&mut self.model, model);
        self.fire_property_change(&PropertyChangeEvent::new(WindowProperty::Model));
        old
    }

    pub fn view(&self) -> Option<&dyn View> {
        self.view.as_deref()
    }

    pub fn set_view(&mut self, view: Option<Box<dyn View>>) -> Option<Box<dyn View>> {
        let old = std::mem::replace(&mut self.view, view);
        self.fire_property_change(&PropertyChangeEvent::new(WindowProperty::View));
        old
    }

    pub fn scene_controller(&self) -> Option<&dyn SceneController> {
        self.scene_controller.as_deref()
    }

    /// Installs `controller` and gives it this window's redraw requester.
    pub fn set_scene_controller(
        &mut self,
        controller: Option<Box<dyn SceneController>>,
    ) -> Option<Box<dyn SceneController>> {
        let controller = controller.map(|mut sc| {
            sc.attach(self.redraw.clone());
            sc
        });
        let old = std::mem::replace(&mut self.scene_controller, controller);
        self.fire_property_change(&PropertyChangeEvent::new(WindowProperty::SceneController));
        old
    }

    pub fn input_handler(&self) -> &dyn InputHandler {
        self.input_handler.as_ref()
    }

    /// Detaches the current input handler from this window and attaches `handler`. `None`
    /// installs a handler that ignores all input. Returns the detached handler.
    pub fn set_input_handler(&mut self, handler: Option<Box<dyn InputHandler>>) -> Box<dyn InputHandler> {
        self.input_handler.set_event_source(None);

        let next: Box<dyn InputHandler> = match handler {
            Some(mut h) => {
                h.set_event_source(Some(self.id));
                h
            }
            None => Box::new(NoOpInputHandler::default()),
        };
        let old = std::mem::replace(&mut self.input_handler, next);
        self.fire_property_change(&PropertyChangeEvent::new(WindowProperty::InputHandler));
        old
    }

    pub fn gpu_resource_cache(&self) -> Option<SharedGpuResourceCache> {
        self.gpu_cache.clone()
    }

    pub fn init_gpu_resource_cache(&mut self, cache: SharedGpuResourceCache) {
        self.gpu_cache = Some(cache);
        self.fire_property_change(&PropertyChangeEvent::new(WindowProperty::GpuResourceCache));
    }

    /// Drops every cached GPU resource.
    pub fn clear_gpu_resource_cache(&self) {
        if let Some(cache) = &self.gpu_cache {
            cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
        }
    }

    pub fn add_rendering_listener(&mut self, l: RenderingListener) -> bool {
        self.listeners.rendering.add(l)
    }

    pub fn remove_rendering_listener(&mut self, l: &RenderingListener) -> bool {
        self.listeners.rendering.remove(l)
    }

    pub fn add_rendering_exception_listener(&mut self, l: RenderingExceptionListener) -> bool {
        self.listeners.rendering_exception.add(l)
    }

    pub fn remove_rendering_exception_listener(&mut self, l: &RenderingExceptionListener) -> bool {
        self.listeners.rendering_exception.remove(l)
    }

    pub fn add_position_listener(&mut self, l: PositionListener) -> bool {
        self.listeners.position.add(l)
    }

    pub fn remove_position_listener(&mut self, l: &PositionListener) -> bool {
        self.listeners.position.remove(l)
    }

    /// Select listeners hear both the input handler's events and the window's rollovers.
    pub fn add_select_listener(&mut self, l: SelectListener) -> bool {
        self.input_handler.add_select_listener(l.clone());
        self.listeners.select.add(l)
    }

    pub fn remove_select_listener(&mut self, l: &SelectListener) -> bool {
        self.input_handler.remove_select_listener(l);
        self.listeners.select.remove(l)
    }

    pub fn current_position(&self) -> Option<Position> {
        self.scene_controller.as_ref()?.picked_object_list()?.current_position()
    }

    pub fn current_selection(&self) -> Option<PickedObject> {
        self.scene_controller
            .as_ref()?
            .picked_object_list()?
            .current_selection()
            .cloned()
    }

    /// Objects in the selection box, when there are any.
    pub fn current_box_selection(&self) -> Option<PickedObjectList> {
        self.objects_in_selection_box().filter(|l| !l.is_empty())
    }

    pub fn objects_at_current_position(&self) -> Option<PickedObjectList> {
        self.scene_controller.as_ref()?.picked_object_list().cloned()
    }

    pub fn objects_in_selection_box(&self) -> Option<PickedObjectList> {
        self.scene_controller.as_ref()?.objects_in_pick_rectangle().cloned()
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    pub fn add_property_observer(&mut self, observer: PropertyObserver) -> bool {
        self.observers.add(observer)
    }

    pub fn remove_property_observer(&mut self, observer: &PropertyObserver) -> bool {
        self.observers.remove(observer)
    }

    pub fn add_property_observer_for(&mut self, property: WindowProperty, observer: PropertyObserver) -> bool {
        self.observers.add_for(property, observer)
    }

    pub fn remove_property_observer_for(&mut self, property: &WindowProperty, observer: &PropertyObserver) -> bool {
        self.observers.remove_for(property, observer)
    }

    pub fn fire_property_change(&self, event: &PropertyChangeEvent) -> bool {
        self.observers.fire(event)
    }

    pub fn set_per_frame_statistics_keys(&mut self, keys: impl IntoIterator<Item = StatisticKey>) {
        self.statistics.set_keys(keys);
    }

    pub fn per_frame_statistics(&self) -> Vec<PerformanceStatistic> {
        self.statistics.snapshot()
    }

    /// Delivers `msg` to the model, if there is one.
    pub fn on_message(&mut self, msg: &Message) {
        if let Some(model) = self.model.as_mut() {
            model.on_message(msg);
        }
    }

    /// Releases the engine side: input handler, GPU resources, model, scene controller and
    /// every listener.
    pub(crate) fn dispose(&mut self) {
        self.input_handler.set_event_source(None);
        self.input_handler.dispose();
        self.input_handler = Box::new(NoOpInputHandler::default());

        self.clear_gpu_resource_cache();

        if let Some(model) = self.model.as_mut() {
            model.dispose();
        }
        if let Some(sc) = self.scene_controller.as_mut() {
            sc.dispose();
        }

        self.listeners.clear();
        self.observers.clear();
    }
}
