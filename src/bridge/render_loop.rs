use crate::bridge::lifecycle::{ContextReport, SurfaceLifecycleManager, SurfaceState};
use crate::errors::BridgeError;
use crate::render::{ContextStatus, GpuContext, OffscreenDrawable, SurfaceSize};
use bitflags::bitflags;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

bitflags! {
    /// Why the scene needs another frame.
    pub struct DirtyReason: u8 {
        const REDRAW_REQUEST  = 0b0000_0001;
        const PROPERTY_CHANGE = 0b0000_0010;
        const RESIZE          = 0b0000_0100;
        /// Follow-up frame asked for by the previous render pass.
        const REARM           = 0b0000_1000;
        const SHUTDOWN        = 0b0001_0000;
    }
}

/// Marks the scene dirty. Cloned into engine objects so they can ask for a frame; any
/// number of requests between two ticks result in a single frame.
#[derive(Clone, Debug, Default)]
pub struct RedrawRequester {
    flags: Arc<AtomicU8>,
}

impl RedrawRequester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, reason: DirtyReason) {
        self.flags.fetch_or(reason.bits(), Ordering::AcqRel);
    }

    /// Asks for a frame.
    pub fn request(&self) {
        self.mark(DirtyReason::REDRAW_REQUEST);
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.load(Ordering::Acquire) != 0
    }

    /// Returns the pending reasons and clears them.
    pub fn take(&self) -> DirtyReason {
        DirtyReason::from_bits_truncate(self.flags.swap(0, Ordering::AcqRel))
    }
}

/// Result of a single [`OffscreenRenderLoop::tick`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The frame timer is stopped; nothing will ever render again.
    Stopped,
    /// Nothing is dirty, no GPU work was done.
    Idle,
    Rendered,
    /// Teardown ran during this tick.
    ShutDown,
    /// The context could not be made current. Nothing was rendered.
    ContextUnavailable,
}

/// The parts of the bridge that run with a current context.
pub trait SurfaceHandler {
    /// Runs once per context creation, before the first frame on that context.
    fn init(&mut self, gpu: &mut dyn GpuContext, report: ContextReport);

    /// Renders one frame.
    fn display(&mut self, gpu: &mut dyn GpuContext, viewport: SurfaceSize);

    /// Releases everything attached to the surface. `gpu` is `None` when no surface was
    /// ever bound.
    fn teardown(&mut self, gpu: Option<&mut dyn GpuContext>) -> anyhow::Result<()>;
}

/// Owns the offscreen surface and renders into it whenever the scene is dirty.
pub struct OffscreenRenderLoop {
    drawable: Option<Box<dyn OffscreenDrawable>>,
    dirty: RedrawRequester,
    running: bool,
    shutting_down: bool,
    lifecycle: SurfaceLifecycleManager,
}

impl OffscreenRenderLoop {
    pub fn new(dirty: RedrawRequester, lifecycle: SurfaceLifecycleManager) -> Self {
        Self {
            drawable: None,
            dirty,
            running: true,
            shutting_down: false,
            lifecycle,
        }
    }

    /// Binds the offscreen surface. Presentation is driven by the loop, so automatic buffer
    /// swapping is turned off.
    pub fn init_surface(&mut self, drawable: Option<Box<dyn OffscreenDrawable>>) -> Result<(), BridgeError> {
        let mut drawable = drawable.ok_or(BridgeError::InvalidArgument("drawable"))?;
        if self.drawable.is_some() || self.lifecycle.state() == SurfaceState::Shutdown {
            return Err(BridgeError::SurfaceAlreadyBound);
        }
        drawable.set_auto_swap_buffer_mode(false);
        log::debug!("offscreen surface bound ({})", drawable.size());
        self.drawable = Some(drawable);
        Ok(())
    }

    pub fn requester(&self) -> RedrawRequester {
        self.dirty.clone()
    }

    pub fn request_redraw(&self) {
        self.dirty.request();
    }

    pub fn request_redraw_now(&self) {
        self.dirty.request();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub fn lifecycle(&self) -> &SurfaceLifecycleManager {
        &self.lifecycle
    }

    pub fn lifecycle_mut(&mut self) -> &mut SurfaceLifecycleManager {
        &mut self.lifecycle
    }

    pub fn surface_size(&self) -> Option<SurfaceSize> {
        self.drawable.as_ref().map(|d| d.size())
    }

    /// Resizes the offscreen surface to `size` device pixels.
    pub fn resize(&mut self, size: SurfaceSize) -> anyhow::Result<()> {
        if let Some(d) = self.drawable.as_mut() {
            d.set_size(size)?;
            self.dirty.mark(DirtyReason::RESIZE);
        }
        Ok(())
    }

    /// Asks for an orderly shutdown. Teardown runs on the next tick that gets a current
    /// context, so GPU resources can still be released.
    pub fn shutdown(&mut self) {
        if !self.running || self.shutting_down {
            return;
        }
        self.shutting_down = true;
        self.lifecycle.begin_shutdown();
        self.dirty.mark(DirtyReason::SHUTDOWN);
    }

    /// Renders at most one frame.
    pub fn tick(&mut self, handler: &mut dyn SurfaceHandler) -> TickOutcome {
        if !self.running {
            return TickOutcome::Stopped;
        }

        let reasons = self.dirty.take();
        if reasons.is_empty() {
            return TickOutcome::Idle;
        }
        log::trace!("frame tick: {reasons:?}");

        let Some(mut drawable) = self.drawable.take() else {
            if self.shutting_down {
                return self.teardown(handler, None);
            }
            log::warn!("no offscreen surface bound, frame skipped");
            return TickOutcome::ContextUnavailable;
        };

        let status = match drawable.make_current() {
            Ok(status) => status,
            Err(e) => {
                log::warn!("offscreen context unavailable: {e:#}");
                if self.shutting_down {
                    // Teardown needs a current context; try again next tick.
                    self.dirty.mark(DirtyReason::SHUTDOWN);
                }
                self.drawable = Some(drawable);
                return TickOutcome::ContextUnavailable;
            }
        };

        if status == ContextStatus::Created {
            let report = self.lifecycle.on_context_created(drawable.context());
            handler.init(drawable.context(), report);
            self.lifecycle.context_ready();
        }

        if self.shutting_down {
            return self.teardown(handler, Some(drawable));
        }

        let viewport = drawable.size();
        handler.display(drawable.context(), viewport);
        drawable.release_current();
        self.drawable = Some(drawable);
        TickOutcome::Rendered
    }

    fn teardown(&mut self, handler: &mut dyn SurfaceHandler, drawable: Option<Box<dyn OffscreenDrawable>>) -> TickOutcome {
        self.running = false;

        let result = match drawable {
            Some(mut d) => {
                let result = catch_unwind(AssertUnwindSafe(|| handler.teardown(Some(d.context()))));
                d.release_current();
                d.destroy();
                result
            }
            None => catch_unwind(AssertUnwindSafe(|| handler.teardown(None))),
        };
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("error while shutting down the offscreen surface: {e:#}"),
            Err(_) => log::error!("panic while shutting down the offscreen surface"),
        }

        self.shutting_down = false;
        self.lifecycle.finish_shutdown();
        log::debug!("offscreen surface shut down");
        TickOutcome::ShutDown
    }
}
