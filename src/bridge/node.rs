//! The globe node: what a UI toolkit embeds to show a globe.
//!
//! A [`GlobeNode`] owns the offscreen surface, the engine-side [`WorldWindow`] and the image
//! the UI displays. The host calls [`GlobeNode::tick`] once per UI frame (or awaits
//! [`GlobeNode::run`]); everything else is forwarded from UI events.

use crate::bridge::compositor::{FrameCompositor, FrameState};
use crate::bridge::debounce::ViewSettleDebouncer;
use crate::bridge::lifecycle::{ContextReport, SurfaceLifecycleManager, SurfaceState};
use crate::bridge::render_loop::{DirtyReason, OffscreenRenderLoop, SurfaceHandler, TickOutcome};
use crate::config::BridgeConfig;
use crate::errors::BridgeError;
use crate::render::{
    DrawableFactory, GpuContext, ImageFactory, PixelBufferExchange, PixelImageFactory, SurfaceCapabilities,
    SurfaceSize, WritableImage,
};
use crate::scheduler::{main_thread_channel, MainThreadReceiver, MainThreadTask, Scheduler, TokioScheduler};
use crate::world::cache::{BasicGpuResourceCache, SharedGpuResourceCache};
use crate::world::events::{Message, NodeId, PropertyChangeEvent, WindowProperty};
use crate::world::listeners::{
    listener, PositionListener, RenderingExceptionListener, RenderingListener, SelectListener,
};
use crate::world::pick::{PickedObject, PickedObjectList, Position};
use crate::world::properties::{AttributeKey, Attributes, PerformanceStatistic, PropertyObserver, StatisticKey};
use crate::world::scene::{InputHandler, Model, SceneController, View};
use crate::world::window::WorldWindow;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use tokio::time::MissedTickBehavior;

/// The UI node the globe is shown in.
pub trait HostNode {
    /// Output scale of the window showing the node; `None` while the node is not shown.
    fn output_scale(&self) -> Option<(f64, f64)>;

    fn is_focused(&self) -> bool;

    fn request_focus(&mut self);

    /// Readback rows come bottom-up; the node is flipped with a scale of -1.
    fn set_scale_y(&mut self, scale: f64);
}

/// Shows the pixel target inside the host node.
pub trait ImageDisplay {
    /// `None` removes the image. `fit_width`/`fit_height` are in logical units.
    fn set_image(&mut self, image: Option<Rc<dyn WritableImage>>, fit_width: f64, fit_height: f64);
}

/// Builder for [`GlobeNode`].
#[derive(Default)]
pub struct GlobeNodeBuilder {
    config: Option<BridgeConfig>,
    host: Option<Box<dyn HostNode>>,
    display: Option<Box<dyn ImageDisplay>>,
    drawable_factory: Option<Box<dyn DrawableFactory>>,
    image_factory: Option<Box<dyn ImageFactory>>,
    scheduler: Option<Rc<dyn Scheduler>>,
}

impl GlobeNodeBuilder {
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn host(mut self, host: impl HostNode + 'static) -> Self {
        self.host = Some(Box::new(host));
        self
    }

    pub fn display(mut self, display: impl ImageDisplay + 'static) -> Self {
        self.display = Some(Box::new(display));
        self
    }

    pub fn drawable_factory(mut self, factory: impl DrawableFactory + 'static) -> Self {
        self.drawable_factory = Some(Box::new(factory));
        self
    }

    /// Defaults to in-memory [`PixelImage`](crate::render::PixelImage)s.
    pub fn image_factory(mut self, factory: impl ImageFactory + 'static) -> Self {
        self.image_factory = Some(Box::new(factory));
        self
    }

    /// Defaults to a [`TokioScheduler`] on the current runtime.
    pub fn scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn build(self) -> Result<GlobeNode, BridgeError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let mut host = self.host.ok_or(BridgeError::InvalidArgument("host node"))?;
        let display = self.display.ok_or(BridgeError::InvalidArgument("image display"))?;
        let mut drawables = self
            .drawable_factory
            .ok_or(BridgeError::InvalidArgument("drawable factory"))?;
        let images = self
            .image_factory
            .unwrap_or_else(|| Box::new(PixelImageFactory::new()));
        let scheduler: Rc<dyn Scheduler> = match self.scheduler {
            Some(s) => s,
            None => Rc::new(TokioScheduler::current()?),
        };

        let id = NodeId::new();
        let redraw = crate::bridge::RedrawRequester::new();

        let mut render_loop = OffscreenRenderLoop::new(redraw.clone(), SurfaceLifecycleManager::from_config(&config));
        let drawable = drawables.create_offscreen(SurfaceCapabilities::offscreen(), config.initial_size)?;
        render_loop.init_surface(Some(drawable))?;

        let mut window = WorldWindow::new(id, redraw.clone());
        window.init_gpu_resource_cache(BasicGpuResourceCache::shared(config.gpu_cache_capacity));
        let dirty = redraw;
        window.add_property_observer(listener(move |_: &PropertyChangeEvent| {
            dirty.mark(DirtyReason::PROPERTY_CHANGE);
            Ok(())
        }));

        host.set_scale_y(-1.0);

        let (tx, rx) = main_thread_channel();
        let debouncer = ViewSettleDebouncer::new(config.view_stop_delay, scheduler.clone(), tx.clone());
        let compositor = FrameCompositor::new(scheduler, tx);

        log::debug!("globe node {id} created ({})", config.initial_size);
        Ok(GlobeNode {
            config,
            host,
            display,
            render_loop,
            window,
            compositor,
            debouncer,
            pixels: PixelBufferExchange::new(images),
            rx,
        })
    }
}

/// Everything the render loop needs while a context is current.
struct NodeSurface<'a> {
    window: &'a mut WorldWindow,
    compositor: &'a mut FrameCompositor,
    debouncer: &'a mut ViewSettleDebouncer,
    pixels: &'a PixelBufferExchange,
}

impl SurfaceHandler for NodeSurface<'_> {
    fn init(&mut self, _gpu: &mut dyn GpuContext, report: ContextReport) {
        for problem in report.problems {
            self.window
                .listeners
                .rendering_exception
                .dispatch(&anyhow::Error::from(problem));
        }

        if report.reinitialize {
            log::debug!("context recreated, reinitializing GPU resources");
            self.window.clear_gpu_resource_cache();
            if let Some(sc) = self.window.scene_controller.as_mut() {
                sc.reinitialize();
            }
        }
    }

    fn display(&mut self, gpu: &mut dyn GpuContext, viewport: SurfaceSize) {
        self.compositor
            .display(gpu, viewport, self.window, self.debouncer, self.pixels);
    }

    fn teardown(&mut self, _gpu: Option<&mut dyn GpuContext>) -> anyhow::Result<()> {
        self.debouncer.shutdown();
        self.window.dispose();
        Ok(())
    }
}

/// A globe rendered offscreen and shown as an image inside a UI node.
pub struct GlobeNode {
    config: BridgeConfig,
    host: Box<dyn HostNode>,
    display: Box<dyn ImageDisplay>,
    render_loop: OffscreenRenderLoop,
    window: WorldWindow,
    compositor: FrameCompositor,
    debouncer: ViewSettleDebouncer,
    pixels: PixelBufferExchange,
    rx: MainThreadReceiver,
}

impl GlobeNode {
    pub fn builder() -> GlobeNodeBuilder {
        GlobeNodeBuilder::default()
    }

    pub fn id(&self) -> NodeId {
        self.window.id()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn window(&self) -> &WorldWindow {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut WorldWindow {
        &mut self.window
    }

    pub fn model(&self) -> Option<&dyn Model> {
        self.window.model()
    }

    pub fn set_model(&mut self, model: Option<Box<dyn Model>>) -> Option<Box<dyn Model>> {
        self.window.set_model(model)
    }

    pub fn view(&self) -> Option<&dyn View> {
        self.window.view()
    }

    pub fn set_view(&mut self, view: Option<Box<dyn View>>) -> Option<Box<dyn View>> {
        self.window.set_view(view)
    }

    pub fn scene_controller(&self) -> Option<&dyn SceneController> {
        self.window.scene_controller()
    }

    pub fn set_scene_controller(
        &mut self,
        controller: Option<Box<dyn SceneController>>,
    ) -> Option<Box<dyn SceneController>> {
        self.window.set_scene_controller(controller)
    }

    pub fn input_handler(&self) -> &dyn InputHandler {
        self.window.input_handler()
    }

    /// Replaces the input handler. `None` installs one that ignores all input.
    pub fn set_input_handler(&mut self, handler: Option<Box<dyn InputHandler>>) -> Box<dyn InputHandler> {
        self.window.set_input_handler(handler)
    }

    pub fn add_rendering_listener(&mut self, l: RenderingListener) -> bool {
        self.window.add_rendering_listener(l)
    }

    pub fn remove_rendering_listener(&mut self, l: &RenderingListener) -> bool {
        self.window.remove_rendering_listener(l)
    }

    pub fn add_rendering_exception_listener(&mut self, l: RenderingExceptionListener) -> bool {
        self.window.add_rendering_exception_listener(l)
    }

    pub fn remove_rendering_exception_listener(&mut self, l: &RenderingExceptionListener) -> bool {
        self.window.remove_rendering_exception_listener(l)
    }

    pub fn add_position_listener(&mut self, l: PositionListener) -> bool {
        self.window.add_position_listener(l)
    }

    pub fn remove_position_listener(&mut self, l: &PositionListener) -> bool {
        self.window.remove_position_listener(l)
    }

    pub fn add_select_listener(&mut self, l: SelectListener) -> bool {
        self.window.add_select_listener(l)
    }

    pub fn remove_select_listener(&mut self, l: &SelectListener) -> bool {
        self.window.remove_select_listener(l)
    }

    pub fn redraw(&self) {
        self.render_loop.request_redraw();
    }

    pub fn redraw_now(&self) {
        self.render_loop.request_redraw_now();
    }

    /// Tears the node down on the next tick that gets a current context.
    pub fn shutdown(&mut self) {
        log::debug!("globe node {} shutting down", self.window.id());
        self.render_loop.shutdown();
    }

    pub fn current_position(&self) -> Option<Position> {
        self.window.current_position()
    }

    pub fn current_selection(&self) -> Option<PickedObject> {
        self.window.current_selection()
    }

    pub fn objects_at_current_position(&self) -> Option<PickedObjectList> {
        self.window.objects_at_current_position()
    }

    pub fn objects_in_selection_box(&self) -> Option<PickedObjectList> {
        self.window.objects_in_selection_box()
    }

    pub fn gpu_resource_cache(&self) -> Option<SharedGpuResourceCache> {
        self.window.gpu_resource_cache()
    }

    pub fn init_gpu_resource_cache(&mut self, cache: SharedGpuResourceCache) {
        self.window.init_gpu_resource_cache(cache);
    }

    pub fn is_enable_gpu_cache_reinitialization(&self) -> bool {
        self.render_loop.lifecycle().is_enable_gpu_cache_reinitialization()
    }

    pub fn set_enable_gpu_cache_reinitialization(&mut self, enabled: bool) {
        self.render_loop
            .lifecycle_mut()
            .set_enable_gpu_cache_reinitialization(enabled);
    }

    pub fn set_value(&mut self, key: impl Into<AttributeKey>, value: impl Into<Value>) -> Option<Value> {
        self.window.attributes_mut().set(key.into(), value)
    }

    pub fn set_values(&mut self, values: &Attributes) {
        self.window.attributes_mut().set_all(values);
    }

    pub fn get_value(&self, key: impl Into<AttributeKey>) -> Option<&Value> {
        self.window.attributes().get(&key.into())
    }

    pub fn get_string_value(&self, key: impl Into<AttributeKey>) -> Option<&str> {
        self.window.attributes().get_str(&key.into())
    }

    pub fn values(&self) -> Vec<Value> {
        self.window.attributes().values().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(AttributeKey, Value)> {
        self.window
            .attributes()
            .entries()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn has_key(&self, key: impl Into<AttributeKey>) -> bool {
        self.window.attributes().has(&key.into())
    }

    pub fn remove_key(&mut self, key: impl Into<AttributeKey>) -> Option<Value> {
        self.window.attributes_mut().remove(&key.into())
    }

    pub fn clear_values(&mut self) {
        self.window.attributes_mut().clear();
    }

    /// A detached copy of the attribute bag.
    pub fn copy_values(&self) -> Attributes {
        self.window.attributes().clone()
    }

    pub fn add_property_observer(&mut self, observer: PropertyObserver) -> bool {
        self.window.add_property_observer(observer)
    }

    pub fn remove_property_observer(&mut self, observer: &PropertyObserver) -> bool {
        self.window.remove_property_observer(observer)
    }

    pub fn add_property_observer_for(&mut self, property: WindowProperty, observer: PropertyObserver) -> bool {
        self.window.add_property_observer_for(property, observer)
    }

    pub fn remove_property_observer_for(&mut self, property: &WindowProperty, observer: &PropertyObserver) -> bool {
        self.window.remove_property_observer_for(property, observer)
    }

    pub fn fire_property_change(&self, event: &PropertyChangeEvent) -> bool {
        self.window.fire_property_change(event)
    }

    pub fn set_per_frame_statistics_keys(&mut self, keys: impl IntoIterator<Item = StatisticKey>) {
        self.window.set_per_frame_statistics_keys(keys);
    }

    pub fn per_frame_statistics(&self) -> Vec<PerformanceStatistic> {
        self.window.per_frame_statistics()
    }

    /// The node was resized to `width` x `height` logical units.
    ///
    /// The pixel target and the offscreen surface follow in device pixels. Nothing happens
    /// while the node is not shown in a window. A zero-sized node has no pixel target, so
    /// frames render without readback.
    pub fn on_size_changed(&mut self, width: f64, height: f64) -> Result<(), BridgeError> {
        let Some((scale_x, scale_y)) = self.host.output_scale() else {
            log::trace!("size change to {width}x{height} ignored, node not shown");
            return Ok(());
        };

        let size = SurfaceSize::from_logical(width, height, scale_x, scale_y);
        if !size.is_empty() {
            // The bound target must always match the surface it is read back from.
            self.render_loop.resize(size)?;
        }
        let image = self.pixels.rebind(size)?;
        self.display.set_image(image, width, height);
        self.render_loop.requester().mark(DirtyReason::RESIZE);
        Ok(())
    }

    pub fn on_pointer_pressed(&mut self) {
        self.focus();
    }

    pub fn on_touch_pressed(&mut self) {
        self.focus();
    }

    fn focus(&mut self) {
        if !self.host.is_focused() {
            self.host.request_focus();
        }
    }

    /// Runs the work posted by scheduled tasks, then renders at most one frame.
    pub fn tick(&mut self) -> TickOutcome {
        self.drain_main_thread_queue();

        let mut surface = NodeSurface {
            window: &mut self.window,
            compositor: &mut self.compositor,
            debouncer: &mut self.debouncer,
            pixels: &self.pixels,
        };
        self.render_loop.tick(&mut surface)
    }

    fn drain_main_thread_queue(&mut self) {
        while let Ok(task) = self.rx.try_recv() {
            match task {
                MainThreadTask::Redraw => self.render_loop.requester().mark(DirtyReason::REARM),
                MainThreadTask::ViewStopped { generation } => {
                    if self.debouncer.settle(generation) {
                        let source = self.window.id();
                        log::debug!("view of {source} stopped");
                        let window = &mut self.window;
                        let delivered = catch_unwind(AssertUnwindSafe(|| {
                            window.on_message(&Message::ViewStopped { source })
                        }));
                        if delivered.is_err() {
                            log::error!("model panicked while handling view-stopped");
                        }
                    }
                }
            }
        }
    }

    /// Ticks at the configured frame rate until the node is shut down.
    pub async fn run(&mut self) {
        let mut interval = tokio::time::interval(self.config.frame_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            match self.tick() {
                TickOutcome::ShutDown | TickOutcome::Stopped => break,
                _ => {}
            }
        }
    }

    pub fn frame_state(&self) -> &FrameState {
        self.compositor.state()
    }

    /// The image currently shown, if the node has a non-empty size.
    pub fn image(&self) -> Option<Rc<dyn WritableImage>> {
        self.pixels.image()
    }

    pub fn surface_size(&self) -> Option<SurfaceSize> {
        self.render_loop.surface_size()
    }

    pub fn lifecycle_state(&self) -> SurfaceState {
        self.render_loop.lifecycle().state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::headless::{HeadlessContext, HeadlessDrawableFactory};
    use crate::render::{GlProfile, PixelImage};
    use crate::scheduler::ManualScheduler;
    use crate::testing::{
        FakeModel, FakeModelProbe, FakeScene, FakeSceneProbe, FakeView, RecordingDisplay, RecordingHost,
        RecordingInputHandler,
    };
    use crate::world::cache::{GpuResource, ResourceKind};
    use crate::world::events::RenderingEvent;
    use std::cell::{Cell, RefCell};
    use std::time::Duration;

    struct Rig {
        node: GlobeNode,
        host: RecordingHost,
        display: RecordingDisplay,
        drawables: HeadlessDrawableFactory,
        sched: ManualScheduler,
        scene: FakeSceneProbe,
        model: FakeModelProbe,
    }

    fn rig_with(drawables: HeadlessDrawableFactory) -> Rig {
        let host = RecordingHost::new((2.0, 2.0));
        let display = RecordingDisplay::new();
        let sched = ManualScheduler::new();
        let mut node = GlobeNode::builder()
            .host(host.clone())
            .display(display.clone())
            .drawable_factory(drawables.clone())
            .scheduler(Rc::new(sched.clone()))
            .build()
            .unwrap();

        let (scene, scene_probe) = FakeScene::new();
        node.set_scene_controller(Some(Box::new(scene)));
        let (model, model_probe) = FakeModel::new();
        node.set_model(Some(Box::new(model)));

        Rig { node, host, display, drawables, sched, scene: scene_probe, model: model_probe }
    }

    fn rig() -> Rig {
        rig_with(HeadlessDrawableFactory::new())
    }

    #[test]
    fn builder_requires_its_collaborators() {
        let err = GlobeNode::builder()
            .display(RecordingDisplay::new())
            .drawable_factory(HeadlessDrawableFactory::new())
            .scheduler(Rc::new(ManualScheduler::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::InvalidArgument("host node")));

        let err = GlobeNode::builder()
            .host(RecordingHost::new((1.0, 1.0)))
            .display(RecordingDisplay::new())
            .scheduler(Rc::new(ManualScheduler::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::InvalidArgument("drawable factory")));
    }

    #[test]
    fn builder_rejects_invalid_config() {
        let mut config = BridgeConfig::default();
        config.frame_rate = 0;
        let err = GlobeNode::builder()
            .config(config)
            .host(RecordingHost::new((1.0, 1.0)))
            .display(RecordingDisplay::new())
            .drawable_factory(HeadlessDrawableFactory::new())
            .scheduler(Rc::new(ManualScheduler::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn construction_binds_an_offscreen_surface_and_flips_the_host() {
        let rig = rig();
        let caps = rig.drawables.last_capabilities().unwrap();
        assert!(!caps.onscreen);
        assert!(!caps.double_buffered);
        assert_eq!(rig.node.surface_size(), Some(SurfaceSize::new(640, 480)));
        assert!(!rig.drawables.last_handle().unwrap().snapshot().auto_swap);
        assert_eq!(rig.host.log().scale_y, Some(-1.0));
        assert!(rig.node.gpu_resource_cache().is_some());
        assert_eq!(rig.node.lifecycle_state(), SurfaceState::Uninitialized);
    }

    #[test]
    fn property_changes_mark_the_scene_dirty() {
        let mut rig = rig();
        assert_eq!(rig.node.tick(), TickOutcome::Rendered);
        assert_eq!(rig.node.tick(), TickOutcome::Idle);

        rig.node.fire_property_change(&PropertyChangeEvent::new(WindowProperty::Custom("layers".into())));
        assert_eq!(rig.node.tick(), TickOutcome::Rendered);
        assert_eq!(rig.scene.state().repaints, 2);
    }

    #[test]
    fn coalesced_requests_render_once_and_idle_renders_nothing() {
        let mut rig = rig();
        rig.node.tick();
        for _ in 0..20 {
            rig.node.redraw();
            rig.node.redraw_now();
            rig.scene.request_redraw();
        }
        assert_eq!(rig.node.tick(), TickOutcome::Rendered);
        for _ in 0..10 {
            assert_eq!(rig.node.tick(), TickOutcome::Idle);
        }
        assert_eq!(rig.scene.state().repaints, 2);
    }

    #[test]
    fn resize_allocates_target_in_device_pixels() {
        let mut rig = rig();
        rig.node.on_size_changed(200.0, 100.5).unwrap();

        let image = rig.node.image().unwrap();
        assert_eq!(image.size(), SurfaceSize::new(400, 201));
        assert_eq!(image.byte_len(), 400 * 201 * 4);
        assert_eq!(rig.node.surface_size(), Some(SurfaceSize::new(400, 201)));
        assert_eq!(rig.display.last(), Some((Some(SurfaceSize::new(400, 201)), 200.0, 100.5)));

        assert_eq!(rig.node.tick(), TickOutcome::Rendered);
        let px = image.as_any().downcast_ref::<PixelImage>().unwrap();
        assert_eq!(image.serial(), 1);
        assert_eq!(px.pixels(), HeadlessContext::expected_pixels(SurfaceSize::new(400, 201), 0));
    }

    #[test]
    fn resize_to_zero_drops_the_target_and_skips_readback() {
        let mut rig = rig();
        rig.node.on_size_changed(100.0, 100.0).unwrap();
        rig.node.tick();
        let old = rig.node.image().unwrap();
        assert_eq!(old.serial(), 1);

        rig.node.on_size_changed(0.0, 100.0).unwrap();
        assert!(rig.node.image().is_none());
        assert_eq!(rig.display.last(), Some((None, 0.0, 100.0)));

        assert_eq!(rig.node.tick(), TickOutcome::Rendered);
        assert_eq!(old.serial(), 1);
        assert_eq!(rig.node.frame_state().frames_abandoned, 0);
        assert_eq!(rig.drawables.last_handle().unwrap().snapshot().resizes, vec![SurfaceSize::new(200, 200)]);
    }

    #[test]
    fn failed_surface_resize_keeps_the_old_target() {
        let mut rig = rig();
        rig.node.on_size_changed(100.0, 50.0).unwrap();
        let old = rig.node.image().unwrap();
        let shown = rig.display.count();

        rig.drawables.last_handle().unwrap().set_fail_set_size(true);
        assert!(rig.node.on_size_changed(300.0, 300.0).is_err());
        assert_eq!(rig.node.surface_size(), Some(SurfaceSize::new(200, 100)));
        assert_eq!(rig.node.image().unwrap().size(), SurfaceSize::new(200, 100));
        assert_eq!(rig.display.count(), shown);

        assert_eq!(rig.node.tick(), TickOutcome::Rendered);
        assert_eq!(old.serial(), 1);
        assert_eq!(rig.node.frame_state().frames_abandoned, 0);
    }

    #[test]
    fn resize_is_ignored_until_the_node_is_shown() {
        let mut rig = rig();
        rig.host.set_output_scale(None);
        rig.node.on_size_changed(300.0, 300.0).unwrap();
        assert!(rig.node.image().is_none());
        assert_eq!(rig.display.count(), 0);
    }

    #[test]
    fn pointer_and_touch_request_focus_once() {
        let mut rig = rig();
        rig.node.on_pointer_pressed();
        rig.node.on_touch_pressed();
        assert_eq!(rig.host.log().focus_requests, 1);

        rig.host.set_focused(false);
        rig.node.on_touch_pressed();
        assert_eq!(rig.host.log().focus_requests, 2);
    }

    #[test]
    fn view_stop_reaches_the_model_once_after_the_last_change() {
        let mut rig = rig();
        let (view, view_id) = FakeView::new(0);
        rig.node.set_view(Some(Box::new(view)));

        for id in 1..=4 {
            view_id.set(id);
            rig.node.redraw();
            rig.node.tick();
            rig.sched.advance(Duration::from_millis(400));
            rig.node.tick();
        }
        assert!(rig.model.messages().is_empty());

        rig.sched.advance(Duration::from_millis(599));
        rig.node.tick();
        assert!(rig.model.messages().is_empty());

        rig.sched.advance(Duration::from_millis(1));
        rig.node.tick();
        assert_eq!(rig.model.messages(), vec![Message::ViewStopped { source: rig.node.id() }]);

        rig.sched.advance(Duration::from_secs(10));
        rig.node.tick();
        assert_eq!(rig.model.messages().len(), 1);
    }

    #[test]
    fn redraw_hint_renders_a_follow_up_frame() {
        let mut rig = rig();
        rig.scene.set_redraw_hint(Some(Duration::from_millis(100)));
        rig.node.tick();
        rig.scene.set_redraw_hint(None);

        assert_eq!(rig.node.tick(), TickOutcome::Idle);
        rig.sched.advance(Duration::from_millis(100));
        assert_eq!(rig.node.tick(), TickOutcome::Rendered);
        assert_eq!(rig.node.tick(), TickOutcome::Idle);
    }

    #[test]
    fn incompatible_context_is_reported_but_keeps_rendering() {
        let mut rig = rig_with(
            HeadlessDrawableFactory::new()
                .with_profile(GlProfile::Gl3Core)
                .without_function("glClientActiveTexture"),
        );
        let problems = Rc::new(RefCell::new(Vec::new()));
        let p = problems.clone();
        rig.node.add_rendering_exception_listener(listener(move |e: &anyhow::Error| {
            p.borrow_mut().push(e.to_string());
            Ok(())
        }));

        assert_eq!(rig.node.tick(), TickOutcome::Rendered);
        let problems = problems.borrow();
        assert_eq!(problems.len(), 2);
        assert!(problems[1].contains("glClientActiveTexture"));
        assert_eq!(rig.scene.state().repaints, 1);
    }

    #[test]
    fn context_recreation_clears_cache_and_reinitializes_once() {
        let mut rig = rig();
        let cache = rig.node.gpu_resource_cache().unwrap();
        rig.node.tick();

        cache
            .lock()
            .unwrap()
            .put("globe", GpuResource { kind: ResourceKind::Texture, handle: 1, size: 64 });
        rig.drawables.last_handle().unwrap().lose_context();
        rig.node.redraw();
        rig.node.tick();
        rig.node.redraw();
        rig.node.tick();

        assert!(cache.lock().unwrap().is_empty());
        assert_eq!(rig.scene.state().reinitializations, 1);
        assert_eq!(rig.node.lifecycle_state(), SurfaceState::Ready);
    }

    #[test]
    fn reinitialization_can_be_turned_off() {
        let mut rig = rig();
        rig.node.set_enable_gpu_cache_reinitialization(false);
        assert!(!rig.node.is_enable_gpu_cache_reinitialization());
        rig.node.tick();

        rig.drawables.last_handle().unwrap().lose_context();
        rig.node.redraw();
        rig.node.tick();
        assert_eq!(rig.scene.state().reinitializations, 0);
    }

    #[test]
    fn shutdown_tears_down_once_and_releases_the_engine() {
        let mut rig = rig();
        let (handler, handler_probe) = RecordingInputHandler::new();
        rig.node.set_input_handler(Some(Box::new(handler)));
        let frames = Rc::new(Cell::new(0));
        let f = frames.clone();
        rig.node.add_rendering_listener(listener(move |_: &RenderingEvent| {
            f.set(f.get() + 1);
            Ok(())
        }));
        rig.node.tick();
        let rendered = frames.get();

        rig.node.shutdown();
        rig.node.shutdown();
        assert_eq!(rig.node.tick(), TickOutcome::ShutDown);
        assert_eq!(rig.node.tick(), TickOutcome::Stopped);
        rig.node.redraw();
        assert_eq!(rig.node.tick(), TickOutcome::Stopped);

        assert_eq!(frames.get(), rendered);
        assert!(rig.model.disposed());
        assert!(handler_probe.disposed());
        assert_eq!(rig.scene.state().disposals, 1);
        assert!(rig.drawables.last_handle().unwrap().snapshot().destroyed);
        assert_eq!(rig.node.lifecycle_state(), SurfaceState::Shutdown);
    }

    struct ExplodingModel;

    impl Model for ExplodingModel {
        fn on_message(&mut self, _msg: &Message) {}

        fn dispose(&mut self) {
            panic!("model dispose failed");
        }
    }

    #[test]
    fn panicking_dispose_does_not_escape_the_tick() {
        let mut rig = rig();
        rig.node.set_model(Some(Box::new(ExplodingModel)));
        rig.node.tick();

        rig.node.shutdown();
        assert_eq!(rig.node.tick(), TickOutcome::ShutDown);
        assert_eq!(rig.node.lifecycle_state(), SurfaceState::Shutdown);
        assert!(rig.drawables.last_handle().unwrap().snapshot().destroyed);
        assert_eq!(rig.node.tick(), TickOutcome::Stopped);
    }

    #[test]
    fn shutdown_cancels_a_pending_view_stop() {
        let mut rig = rig();
        let (view, view_id) = FakeView::new(0);
        rig.node.set_view(Some(Box::new(view)));
        view_id.set(3);
        rig.node.tick();
        assert_eq!(rig.sched.pending(), 1);

        rig.node.shutdown();
        rig.node.tick();
        assert_eq!(rig.sched.pending(), 0);
        rig.sched.advance(Duration::from_secs(5));
        rig.node.tick();
        assert!(rig.model.messages().is_empty());
    }

    #[test]
    fn attributes_round_through_the_facade() {
        let mut rig = rig();
        assert_eq!(rig.node.set_value("layer.count", 3), None);
        rig.node.set_value("title", "Blue Marble");
        assert!(rig.node.has_key("title"));
        assert_eq!(rig.node.get_string_value("title"), Some("Blue Marble"));
        assert_eq!(rig.node.entries().len(), 2);

        let copy = rig.node.copy_values();
        assert_eq!(rig.node.remove_key("layer.count"), Some(serde_json::json!(3)));
        rig.node.clear_values();
        assert!(rig.node.values().is_empty());

        rig.node.set_values(&copy);
        assert_eq!(rig.node.values().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_delivers_view_stops_through_the_tokio_scheduler() {
        let host = RecordingHost::new((1.0, 1.0));
        let mut node = GlobeNode::builder()
            .host(host)
            .display(RecordingDisplay::new())
            .drawable_factory(HeadlessDrawableFactory::new())
            .build()
            .unwrap();
        let (scene, _scene_probe) = FakeScene::new();
        node.set_scene_controller(Some(Box::new(scene)));
        let (model, model_probe) = FakeModel::new();
        node.set_model(Some(Box::new(model)));
        let (view, _view_id) = FakeView::new(42);
        node.set_view(Some(Box::new(view)));

        let r = tokio::time::timeout(Duration::from_secs(3), node.run()).await;
        assert!(r.is_err());
        assert_eq!(model_probe.messages().len(), 1);

        node.shutdown();
        node.run().await;
        assert_eq!(node.lifecycle_state(), SurfaceState::Shutdown);
    }
}
