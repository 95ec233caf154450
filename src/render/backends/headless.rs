use crate::render::surface::{
    ContextStatus, DrawableFactory, GlProfile, GpuContext, OffscreenDrawable, PixelLayout, SurfaceCapabilities,
    SurfaceSize,
};
use anyhow::{anyhow, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// What a headless context reports about itself.
#[derive(Clone, Debug)]
pub struct HeadlessProfile {
    pub profile: GlProfile,
    pub functions: HashSet<String>,
    pub extensions: HashSet<String>,
}

impl Default for HeadlessProfile {
    fn default() -> Self {
        Self {
            profile: GlProfile::Gl4Compat,
            functions: ["glActiveTexture", "glClientActiveTexture", "glReadPixels"]
                .into_iter()
                .map(String::from)
                .collect(),
            extensions: HashSet::new(),
        }
    }
}

/// GPU context that renders nothing. Readbacks produce a deterministic pattern that changes
/// with every frame, so tests can tell frames apart.
#[derive(Debug, Default)]
pub struct HeadlessContext {
    profile: HeadlessProfile,
    readbacks: u64,
}

impl HeadlessContext {
    pub fn new(profile: HeadlessProfile) -> Self {
        Self { profile, readbacks: 0 }
    }

    /// Bytes that the `frame`-th readback (0-based) of a `size` region produces.
    pub fn expected_pixels(size: SurfaceSize, frame: u64) -> Vec<u8> {
        let mut buf = vec![0u8; size.byte_len(PixelLayout::Bgra8)];
        fill_pattern(&mut buf, frame);
        buf
    }

    pub fn readbacks(&self) -> u64 {
        self.readbacks
    }
}

fn fill_pattern(buf: &mut [u8], frame: u64) {
    for (i, px) in buf.chunks_exact_mut(4).enumerate() {
        px[0] = (frame % 256) as u8;
        px[1] = (i % 256) as u8;
        px[2] = ((i / 256) % 256) as u8;
        px[3] = 0xff;
    }
}

impl GpuContext for HeadlessContext {
    fn profile(&self) -> GlProfile {
        self.profile.profile
    }

    fn is_function_available(&self, name: &str) -> bool {
        self.profile.functions.contains(name)
    }

    fn is_extension_available(&self, name: &str) -> bool {
        self.profile.extensions.contains(name)
    }

    fn read_pixels(&mut self, _x: u32, _y: u32, size: SurfaceSize, layout: PixelLayout, dst: &mut [u8]) -> Result<()> {
        let needed = size.byte_len(layout);
        if dst.len() < needed {
            return Err(anyhow!("readback buffer too small: {} < {needed}", dst.len()));
        }
        fill_pattern(&mut dst[..needed], self.readbacks);
        self.readbacks += 1;
        Ok(())
    }
}

/// Counters and switches shared between a headless drawable and whoever created it.
#[derive(Clone, Debug, Default)]
pub struct HeadlessState {
    pub size: SurfaceSize,
    pub auto_swap: bool,
    pub make_current_calls: usize,
    pub release_calls: usize,
    pub contexts_created: usize,
    pub readbacks: u64,
    pub resizes: Vec<SurfaceSize>,
    pub destroyed: bool,
    /// When set, `make_current` fails.
    pub fail_make_current: bool,
    /// When set, `set_size` fails.
    pub fail_set_size: bool,
    /// When set, the next `make_current` drops the context and creates a new one.
    pub lose_context: bool,
}

/// Shared view on a [`HeadlessDrawable`].
#[derive(Clone, Debug, Default)]
pub struct HeadlessHandle {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessHandle {
    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> HeadlessState {
        self.lock().clone()
    }

    pub fn lose_context(&self) {
        self.lock().lose_context = true;
    }

    pub fn set_fail_make_current(&self, fail: bool) {
        self.lock().fail_make_current = fail;
    }

    pub fn set_fail_set_size(&self, fail: bool) {
        self.lock().fail_set_size = fail;
    }
}

/// Offscreen drawable that needs no GPU.
pub struct HeadlessDrawable {
    profile: HeadlessProfile,
    context: Option<HeadlessContext>,
    handle: HeadlessHandle,
}

impl HeadlessDrawable {
    pub fn new(size: SurfaceSize, profile: HeadlessProfile) -> Self {
        let handle = HeadlessHandle::default();
        {
            let mut st = handle.lock();
            st.size = size;
            st.auto_swap = true;
        }
        Self { profile, context: None, handle }
    }

    pub fn handle(&self) -> HeadlessHandle {
        self.handle.clone()
    }
}

impl OffscreenDrawable for HeadlessDrawable {
    fn size(&self) -> SurfaceSize {
        self.handle.lock().size
    }

    fn set_size(&mut self, size: SurfaceSize) -> Result<()> {
        let mut st = self.handle.lock();
        if st.destroyed {
            return Err(anyhow!("drawable is destroyed"));
        }
        if st.fail_set_size {
            return Err(anyhow!("surface cannot be resized to {size}"));
        }
        st.size = size;
        st.resizes.push(size);
        Ok(())
    }

    fn set_auto_swap_buffer_mode(&mut self, enabled: bool) {
        self.handle.lock().auto_swap = enabled;
    }

    fn auto_swap_buffer_mode(&self) -> bool {
        self.handle.lock().auto_swap
    }

    fn make_current(&mut self) -> Result<ContextStatus> {
        let mut st = self.handle.lock();
        st.make_current_calls += 1;
        if st.destroyed {
            return Err(anyhow!("drawable is destroyed"));
        }
        if st.fail_make_current {
            return Err(anyhow!("context could not be made current"));
        }

        if st.lose_context {
            st.lose_context = false;
            self.context = None;
        }
        if self.context.is_some() {
            return Ok(ContextStatus::Current);
        }

        self.context = Some(HeadlessContext::new(self.profile.clone()));
        st.contexts_created += 1;
        log::trace!("headless context #{} created", st.contexts_created);
        Ok(ContextStatus::Created)
    }

    fn context(&mut self) -> &mut dyn GpuContext {
        let profile = &self.profile;
        self.context.get_or_insert_with(|| HeadlessContext::new(profile.clone()))
    }

    fn release_current(&mut self) {
        let mut st = self.handle.lock();
        st.release_calls += 1;
        if let Some(ctx) = &self.context {
            st.readbacks = ctx.readbacks();
        }
    }

    fn destroy(&mut self) {
        self.context = None;
        self.handle.lock().destroyed = true;
    }
}

/// Creates [`HeadlessDrawable`]s that all report the same profile. Clones share the list of
/// created drawables, so a clone kept aside can inspect what the bridge created.
#[derive(Clone, Default)]
pub struct HeadlessDrawableFactory {
    profile: HeadlessProfile,
    created: Arc<Mutex<Vec<(SurfaceCapabilities, HeadlessHandle)>>>,
}

impl HeadlessDrawableFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, profile: GlProfile) -> Self {
        self.profile.profile = profile;
        self
    }

    pub fn without_function(mut self, name: &str) -> Self {
        self.profile.functions.remove(name);
        self
    }

    pub fn with_extension(mut self, name: &str) -> Self {
        self.profile.extensions.insert(name.to_string());
        self
    }

    fn created(&self) -> MutexGuard<'_, Vec<(SurfaceCapabilities, HeadlessHandle)>> {
        self.created.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of drawables created so far.
    pub fn created_count(&self) -> usize {
        self.created().len()
    }

    /// Handle of the most recently created drawable.
    pub fn last_handle(&self) -> Option<HeadlessHandle> {
        self.created().last().map(|(_, h)| h.clone())
    }

    pub fn last_capabilities(&self) -> Option<SurfaceCapabilities> {
        self.created().last().map(|(c, _)| *c)
    }
}

impl DrawableFactory for HeadlessDrawableFactory {
    fn create_offscreen(&mut self, caps: SurfaceCapabilities, size: SurfaceSize) -> Result<Box<dyn OffscreenDrawable>> {
        if caps.onscreen {
            return Err(anyhow!("headless drawables cannot be shown on screen"));
        }
        let drawable = HeadlessDrawable::new(size, self.profile.clone());
        self.created().push((caps, drawable.handle()));
        Ok(Box::new(drawable))
    }
}
