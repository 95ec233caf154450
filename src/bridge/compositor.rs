//! Per-frame work with a current context.
//!
//! One accepted frame runs, in order: pre-frame pick snapshots, pre-render listeners, the
//! view-change check, the engine render pass, statistics, rendering exceptions, post-render
//! listeners, position and select notifications and finally the readback into the pixel
//! target. Any failure abandons the rest of the frame; the loop carries on next tick.

use crate::bridge::debounce::ViewSettleDebouncer;
use crate::errors::BridgeError;
use crate::render::{GpuContext, PixelBufferExchange, SurfaceSize};
use crate::scheduler::{MainThreadSender, MainThreadTask, Scheduler};
use crate::world::events::{PositionEvent, RenderingEvent, RenderingStage, SelectEvent, SelectEventKind};
use crate::world::pick::Position;
use crate::world::properties::{AttributeKey, StatisticKey};
use crate::world::scene::{Model, RenderPass, View};
use crate::world::window::WorldWindow;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

/// Bookkeeping kept across frames.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameState {
    /// View-state id seen on the last frame. Starts at 0.
    pub last_view_id: u64,
    pub frames_rendered: u64,
    pub frames_abandoned: u64,
}

/// Position events fire on a transition only: something appeared, disappeared or moved.
pub(crate) fn position_changed(before: Option<Position>, after: Option<Position>) -> bool {
    match (before, after) {
        (None, None) => false,
        (Some(a), Some(b)) => a != b,
        _ => true,
    }
}

pub struct FrameCompositor {
    state: FrameState,
    scheduler: Rc<dyn Scheduler>,
    tx: MainThreadSender,
}

impl FrameCompositor {
    pub fn new(scheduler: Rc<dyn Scheduler>, tx: MainThreadSender) -> Self {
        Self {
            state: FrameState::default(),
            scheduler,
            tx,
        }
    }

    pub fn state(&self) -> &FrameState {
        &self.state
    }

    /// Renders one frame. Never fails: errors and panics are logged and the frame counted
    /// as abandoned.
    pub fn display(
        &mut self,
        gpu: &mut dyn GpuContext,
        viewport: SurfaceSize,
        window: &mut WorldWindow,
        debouncer: &mut ViewSettleDebouncer,
        pixels: &PixelBufferExchange,
    ) {
        let result = catch_unwind(AssertUnwindSafe(|| self.render_frame(gpu, viewport, window, debouncer, pixels)));
        match result {
            Ok(Ok(())) => self.state.frames_rendered += 1,
            Ok(Err(e)) => {
                self.state.frames_abandoned += 1;
                log::error!("exception while repainting the globe: {e:#}");
            }
            Err(_) => {
                self.state.frames_abandoned += 1;
                log::error!("panic while repainting the globe");
            }
        }
    }

    fn render_frame(
        &mut self,
        gpu: &mut dyn GpuContext,
        viewport: SurfaceSize,
        window: &mut WorldWindow,
        debouncer: &mut ViewSettleDebouncer,
        pixels: &PixelBufferExchange,
    ) -> anyhow::Result<()> {
        if window.scene_controller.is_none() {
            return Err(BridgeError::SceneControllerMissing.into());
        }
        let source = window.id;

        let position_before = window.current_position();
        let selection_before = window.current_selection();
        let box_before = window.current_box_selection();

        window.listeners.rendering.dispatch(&RenderingEvent {
            source,
            stage: RenderingStage::BeforeRendering,
        });

        if let Some(view) = window.view.as_ref() {
            let id = view.view_state_id();
            if id != self.state.last_view_id {
                self.state.last_view_id = id;
                debouncer.view_changed();
            }
        }

        let sc = window
            .scene_controller
            .as_mut()
            .ok_or(BridgeError::SceneControllerMissing)?;
        let redraw_delay = {
            let mut pass = RenderPass {
                gpu: &mut *gpu,
                model: window.model.as_deref_mut().map(|m| m as &mut dyn Model),
                view: window.view.as_deref_mut().map(|v| v as &mut dyn View),
                viewport,
                gpu_cache: window.gpu_cache.as_ref(),
            };
            sc.repaint(&mut pass)?
        };

        if let Some(delay) = redraw_delay.filter(|d| !d.is_zero()) {
            let tx = self.tx.clone();
            self.scheduler.schedule(
                delay,
                Box::new(move || {
                    let _ = tx.send(MainThreadTask::Redraw);
                }),
            );
        }

        if let Some(ft) = sc.frame_time() {
            window.attributes.set(AttributeKey::FrameTime, ft);
            window.statistics.record(StatisticKey::FrameTime, ft);
        }
        if let Some(fps) = sc.frames_per_second() {
            window.attributes.set(AttributeKey::FrameRate, fps);
            window.statistics.record(StatisticKey::FrameRate, fps);
        }

        for e in sc.take_rendering_exceptions() {
            window.listeners.rendering_exception.dispatch(&e);
        }

        window.listeners.rendering.dispatch(&RenderingEvent {
            source,
            stage: RenderingStage::AfterRendering,
        });

        let pick_point = window.scene_controller.as_ref().and_then(|sc| sc.pick_point());

        let position_after = window.current_position();
        if position_changed(position_before, position_after) {
            window.listeners.position.dispatch(&PositionEvent {
                source,
                screen_point: pick_point,
                previous: position_before,
                current: position_after,
            });
        }

        // Selections notify whenever something is (or was) selected, even if unchanged.
        let selection_after = window.current_selection();
        if selection_before.is_some() || selection_after.is_some() {
            window.listeners.select.dispatch(&SelectEvent {
                source,
                kind: SelectEventKind::Rollover,
                pick_point,
                pick_rect: None,
                objects: window.objects_at_current_position().unwrap_or_default(),
            });
        }

        let box_after = window.current_box_selection();
        if box_before.is_some() || box_after.is_some() {
            window.listeners.select.dispatch(&SelectEvent {
                source,
                kind: SelectEventKind::BoxRollover,
                pick_point: None,
                pick_rect: window.scene_controller.as_ref().and_then(|sc| sc.pick_rectangle()),
                objects: window.objects_in_selection_box().unwrap_or_default(),
            });
        }

        pixels.readback(gpu)?;
        Ok(())
    }
}
