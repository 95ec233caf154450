use globeview::bridge::{HostNode, ImageDisplay, TickOutcome};
use globeview::render::backends::headless::HeadlessDrawableFactory;
use globeview::render::WritableImage;
use globeview::world::{
    listener, Message, Model, PickedObject, PickedObjectList, Position, PositionEvent, RenderPass, RenderingEvent,
    SceneController, View,
};
use globeview::{BridgeConfig, BridgeError, GlobeNode};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// A host that is always shown on a 2x (hidpi) output.
struct DemoHost;

impl HostNode for DemoHost {
    fn output_scale(&self) -> Option<(f64, f64)> {
        Some((2.0, 2.0))
    }

    fn is_focused(&self) -> bool {
        true
    }

    fn request_focus(&mut self) {}

    fn set_scale_y(&mut self, scale: f64) {
        log::info!("host flipped vertically (scale y = {scale})");
    }
}

struct DemoDisplay;

impl ImageDisplay for DemoDisplay {
    fn set_image(&mut self, image: Option<Rc<dyn WritableImage>>, fit_width: f64, fit_height: f64) {
        match image {
            Some(img) => log::info!("showing {} image fitted to {fit_width}x{fit_height}", img.size()),
            None => log::info!("image removed"),
        }
    }
}

struct DemoModel;

impl Model for DemoModel {
    fn on_message(&mut self, msg: &Message) {
        log::info!("model received {msg:?}");
    }
}

/// A camera that spins for a while and then stops.
struct SpinningView {
    state: Rc<Cell<u64>>,
}

impl View for SpinningView {
    fn view_state_id(&self) -> u64 {
        self.state.get()
    }
}

/// Pretends the pointer moves over the globe every frame.
#[derive(Default)]
struct DemoScene {
    frame: u64,
    picks: Option<PickedObjectList>,
}

impl SceneController for DemoScene {
    fn repaint(&mut self, pass: &mut RenderPass<'_>) -> anyhow::Result<Option<Duration>> {
        self.frame += 1;
        let here = Position::new(52.0 + self.frame as f64 * 0.01, 4.9, 0.0);
        self.picks = Some(vec![PickedObject::terrain(1, here)].into());
        log::debug!("frame {} rendered at {}", self.frame, pass.viewport);
        Ok(None)
    }

    fn frame_time(&self) -> Option<f64> {
        Some(16.0)
    }

    fn picked_object_list(&self) -> Option<&PickedObjectList> {
        self.picks.as_ref()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), BridgeError> {
    env_logger::init();

    // Configure the bridge. Anything left out takes its default value.
    let config = BridgeConfig::builder()
        .initial_size(320, 240)
        .frame_rate(30)
        .view_stop_delay(Duration::from_millis(500))
        .build()?;

    // The headless factory creates drawables without a GPU. Readbacks produce a test
    // pattern, which is all we need here.
    let mut node = GlobeNode::builder()
        .config(config)
        .host(DemoHost)
        .display(DemoDisplay)
        .drawable_factory(HeadlessDrawableFactory::new())
        .build()?;

    let view_state = Rc::new(Cell::new(0));
    node.set_model(Some(Box::new(DemoModel)));
    node.set_view(Some(Box::new(SpinningView { state: view_state.clone() })));
    node.set_scene_controller(Some(Box::new(DemoScene::default())));

    node.add_rendering_listener(listener(|e: &RenderingEvent| {
        log::trace!("{}", e.stage);
        Ok(())
    }));
    node.add_position_listener(listener(|e: &PositionEvent| {
        log::info!("position {:?} -> {:?}", e.previous, e.current);
        Ok(())
    }));

    // The UI lays the node out at 320x240 logical units.
    node.on_size_changed(320.0, 240.0)?;

    // Spin the globe for ten frames, then let it settle.
    for step in 1..=10 {
        view_state.set(step);
        node.redraw();
        node.tick();
        tokio::time::sleep(Duration::from_millis(33)).await;
    }

    // Keep ticking for a second; the model hears about the stopped view after 500ms.
    let _ = tokio::time::timeout(Duration::from_secs(1), node.run()).await;

    let stats = node.frame_state();
    log::info!("{} frames rendered, {} abandoned", stats.frames_rendered, stats.frames_abandoned);

    node.shutdown();
    if node.tick() != TickOutcome::ShutDown {
        log::warn!("node did not shut down on the first tick");
    }

    Ok(())
}
