//! Fakes for the engine and host seams, shared by the unit tests.

use crate::bridge::{HostNode, ImageDisplay, RedrawRequester};
use crate::render::backends::headless::HeadlessContext;
use crate::render::{SurfaceSize, WritableImage};
use crate::world::events::{Message, NodeId};
use crate::world::listeners::SelectListener;
use crate::world::pick::{PickedObjectList, ScreenPoint, ScreenRect};
use crate::world::scene::{InputHandler, Model, RenderPass, SceneController, View};
use crate::world::window::WorldWindow;
use anyhow::anyhow;
use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;
use std::time::Duration;

#[derive(Default)]
pub struct FakeSceneState {
    pub repaints: usize,
    pub reinitializations: usize,
    pub disposals: usize,
    pub viewports: Vec<SurfaceSize>,
    pub saw_gpu_cache: bool,
    redraw: Option<RedrawRequester>,
    redraw_hint: Option<Duration>,
    fail_next: bool,
    panic_next: bool,
    exceptions: Vec<String>,
    frame_time: Option<f64>,
    frames_per_second: Option<f64>,
    picks: Option<PickedObjectList>,
    boxed: Option<PickedObjectList>,
}

/// Scene controller whose pick results and failures are scripted through a
/// [`FakeSceneProbe`]. Scripted picks become visible after the next repaint.
pub struct FakeScene {
    state: Rc<RefCell<FakeSceneState>>,
    picks: Option<PickedObjectList>,
    boxed: Option<PickedObjectList>,
}

#[derive(Clone)]
pub struct FakeSceneProbe {
    state: Rc<RefCell<FakeSceneState>>,
}

impl FakeScene {
    pub fn new() -> (Self, FakeSceneProbe) {
        let state = Rc::new(RefCell::new(FakeSceneState::default()));
        let scene = Self { state: state.clone(), picks: None, boxed: None };
        (scene, FakeSceneProbe { state })
    }
}

impl FakeSceneProbe {
    pub fn state(&self) -> Ref<'_, FakeSceneState> {
        self.state.borrow()
    }

    pub fn show_picks(&self, picks: Option<PickedObjectList>) {
        self.state.borrow_mut().picks = picks;
    }

    pub fn show_box(&self, boxed: Option<PickedObjectList>) {
        self.state.borrow_mut().boxed = boxed;
    }

    /// Requests a frame the way an engine object outside the render pass would.
    pub fn request_redraw(&self) {
        if let Some(r) = self.state.borrow().redraw.as_ref() {
            r.request();
        }
    }

    pub fn set_redraw_hint(&self, hint: Option<Duration>) {
        self.state.borrow_mut().redraw_hint = hint;
    }

    pub fn fail_next_repaint(&self) {
        self.state.borrow_mut().fail_next = true;
    }

    pub fn panic_next_repaint(&self) {
        self.state.borrow_mut().panic_next = true;
    }

    pub fn queue_exception(&self, message: &str) {
        self.state.borrow_mut().exceptions.push(message.to_string());
    }

    pub fn set_frame_stats(&self, frame_time: Option<f64>, frames_per_second: Option<f64>) {
        let mut st = self.state.borrow_mut();
        st.frame_time = frame_time;
        st.frames_per_second = frames_per_second;
    }
}

impl SceneController for FakeScene {
    fn repaint(&mut self, pass: &mut RenderPass<'_>) -> anyhow::Result<Option<Duration>> {
        let mut st = self.state.borrow_mut();
        if std::mem::take(&mut st.panic_next) {
            drop(st);
            panic!("scripted repaint panic");
        }
        if std::mem::take(&mut st.fail_next) {
            return Err(anyhow!("scripted repaint failure"));
        }
        st.repaints += 1;
        st.viewports.push(pass.viewport);
        st.saw_gpu_cache = pass.gpu_cache.is_some();
        self.picks = st.picks.clone();
        self.boxed = st.boxed.clone();
        Ok(st.redraw_hint)
    }

    fn take_rendering_exceptions(&mut self) -> Vec<anyhow::Error> {
        let mut st = self.state.borrow_mut();
        st.exceptions.drain(..).map(|m| anyhow!(m)).collect()
    }

    fn frame_time(&self) -> Option<f64> {
        self.state.borrow().frame_time
    }

    fn frames_per_second(&self) -> Option<f64> {
        self.state.borrow().frames_per_second
    }

    fn picked_object_list(&self) -> Option<&PickedObjectList> {
        self.picks.as_ref()
    }

    fn objects_in_pick_rectangle(&self) -> Option<&PickedObjectList> {
        self.boxed.as_ref()
    }

    fn pick_point(&self) -> Option<ScreenPoint> {
        self.picks.as_ref().map(|_| ScreenPoint { x: 10.0, y: 20.0 })
    }

    fn pick_rectangle(&self) -> Option<ScreenRect> {
        self.boxed.as_ref().map(|_| ScreenRect { x: 0.0, y: 0.0, width: 40.0, height: 30.0 })
    }

    fn reinitialize(&mut self) {
        self.state.borrow_mut().reinitializations += 1;
    }

    fn dispose(&mut self) {
        self.state.borrow_mut().disposals += 1;
    }

    fn attach(&mut self, redraw: RedrawRequester) {
        self.state.borrow_mut().redraw = Some(redraw);
    }
}

#[derive(Default)]
struct ModelLog {
    messages: Vec<Message>,
    disposed: bool,
}

pub struct FakeModel {
    log: Rc<RefCell<ModelLog>>,
}

#[derive(Clone)]
pub struct FakeModelProbe {
    log: Rc<RefCell<ModelLog>>,
}

impl FakeModel {
    pub fn new() -> (Self, FakeModelProbe) {
        let log = Rc::new(RefCell::new(ModelLog::default()));
        (Self { log: log.clone() }, FakeModelProbe { log })
    }
}

impl FakeModelProbe {
    pub fn messages(&self) -> Vec<Message> {
        self.log.borrow().messages.clone()
    }

    pub fn disposed(&self) -> bool {
        self.log.borrow().disposed
    }
}

impl Model for FakeModel {
    fn on_message(&mut self, msg: &Message) {
        self.log.borrow_mut().messages.push(msg.clone());
    }

    fn dispose(&mut self) {
        self.log.borrow_mut().disposed = true;
    }
}

/// View whose state id is driven from the outside.
pub struct FakeView {
    id: Rc<Cell<u64>>,
}

impl FakeView {
    pub fn new(initial: u64) -> (Self, Rc<Cell<u64>>) {
        let id = Rc::new(Cell::new(initial));
        (Self { id: id.clone() }, id)
    }
}

impl View for FakeView {
    fn view_state_id(&self) -> u64 {
        self.id.get()
    }
}

#[derive(Default)]
struct HandlerLog {
    source: Option<NodeId>,
    select_listeners: Vec<SelectListener>,
    disposed: bool,
}

pub struct RecordingInputHandler {
    log: Rc<RefCell<HandlerLog>>,
}

#[derive(Clone)]
pub struct InputHandlerProbe {
    log: Rc<RefCell<HandlerLog>>,
}

impl RecordingInputHandler {
    pub fn new() -> (Self, InputHandlerProbe) {
        let log = Rc::new(RefCell::new(HandlerLog::default()));
        (Self { log: log.clone() }, InputHandlerProbe { log })
    }
}

impl InputHandlerProbe {
    pub fn source(&self) -> Option<NodeId> {
        self.log.borrow().source
    }

    pub fn select_listeners(&self) -> usize {
        self.log.borrow().select_listeners.len()
    }

    pub fn disposed(&self) -> bool {
        self.log.borrow().disposed
    }
}

impl InputHandler for RecordingInputHandler {
    fn set_event_source(&mut self, source: Option<NodeId>) {
        self.log.borrow_mut().source = source;
    }

    fn event_source(&self) -> Option<NodeId> {
        self.log.borrow().source
    }

    fn add_select_listener(&mut self, listener: SelectListener) {
        self.log.borrow_mut().select_listeners.push(listener);
    }

    fn remove_select_listener(&mut self, listener: &SelectListener) {
        self.log
            .borrow_mut()
            .select_listeners
            .retain(|l| !std::ptr::eq(Rc::as_ptr(l) as *const u8, Rc::as_ptr(listener) as *const u8));
    }

    fn dispose(&mut self) {
        self.log.borrow_mut().disposed = true;
    }
}

#[derive(Default)]
pub struct HostLog {
    pub output_scale: Option<(f64, f64)>,
    pub focused: bool,
    pub focus_requests: usize,
    pub scale_y: Option<f64>,
}

/// Host node whose window and focus state are scripted.
#[derive(Clone)]
pub struct RecordingHost {
    log: Rc<RefCell<HostLog>>,
}

impl RecordingHost {
    /// A host shown in a window with the given output scale.
    pub fn new(scale: (f64, f64)) -> Self {
        let log = HostLog { output_scale: Some(scale), ..HostLog::default() };
        Self { log: Rc::new(RefCell::new(log)) }
    }

    pub fn log(&self) -> Ref<'_, HostLog> {
        self.log.borrow()
    }

    pub fn set_output_scale(&self, scale: Option<(f64, f64)>) {
        self.log.borrow_mut().output_scale = scale;
    }

    pub fn set_focused(&self, focused: bool) {
        self.log.borrow_mut().focused = focused;
    }
}

impl HostNode for RecordingHost {
    fn output_scale(&self) -> Option<(f64, f64)> {
        self.log.borrow().output_scale
    }

    fn is_focused(&self) -> bool {
        self.log.borrow().focused
    }

    fn request_focus(&mut self) {
        let mut log = self.log.borrow_mut();
        log.focus_requests += 1;
        log.focused = true;
    }

    fn set_scale_y(&mut self, scale: f64) {
        self.log.borrow_mut().scale_y = Some(scale);
    }
}

/// Image display that remembers every image it was given.
#[derive(Clone, Default)]
pub struct RecordingDisplay {
    shown: Rc<RefCell<Vec<(Option<Rc<dyn WritableImage>>, f64, f64)>>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.shown.borrow().len()
    }

    /// Size of the last image shown (`None` when the image was removed) and its fit size.
    pub fn last(&self) -> Option<(Option<SurfaceSize>, f64, f64)> {
        self.shown
            .borrow()
            .last()
            .map(|(img, w, h)| (img.as_ref().map(|i| i.size()), *w, *h))
    }

    pub fn last_image(&self) -> Option<Rc<dyn WritableImage>> {
        self.shown.borrow().last().and_then(|(img, _, _)| img.clone())
    }
}

impl ImageDisplay for RecordingDisplay {
    fn set_image(&mut self, image: Option<Rc<dyn WritableImage>>, fit_width: f64, fit_height: f64) {
        self.shown.borrow_mut().push((image, fit_width, fit_height));
    }
}

/// Runs one render pass of the window's scene controller on a headless context.
pub fn render_once(window: &mut WorldWindow) {
    let mut gpu = HeadlessContext::default();
    let Some(sc) = window.scene_controller.as_mut() else {
        return;
    };
    let mut pass = RenderPass {
        gpu: &mut gpu,
        model: window.model.as_deref_mut().map(|m| m as &mut dyn Model),
        view: window.view.as_deref_mut().map(|v| v as &mut dyn View),
        viewport: SurfaceSize::new(4, 4),
        gpu_cache: window.gpu_cache.as_ref(),
    };
    if let Err(e) = sc.repaint(&mut pass) {
        panic!("render pass failed: {e:#}");
    }
}
