use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of a surface in device pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A surface is empty when either dimension is zero. Nothing is allocated or read back
    /// for an empty surface.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of bytes a buffer of this size needs in the given layout.
    pub fn byte_len(&self, layout: PixelLayout) -> usize {
        self.width as usize * self.height as usize * layout.bytes_per_pixel()
    }

    /// Converts a logical (UI unit) size into device pixels. Fractional pixels are truncated.
    pub fn from_logical(width: f64, height: f64, scale_x: f64, scale_y: f64) -> Self {
        let to_px = |v: f64| if v.is_finite() && v > 0.0 { v as u32 } else { 0 };
        Self {
            width: to_px(width * scale_x),
            height: to_px(height * scale_y),
        }
    }
}

impl fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Layout of pixels in a readback buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelLayout {
    /// 8-bit blue, green, red, alpha; unsigned bytes. Matches premultiplied
    /// ARGB32 image surfaces on little-endian hosts.
    Bgra8,
}

impl PixelLayout {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelLayout::Bgra8 => 4,
        }
    }
}

/// Profile provided by a GPU context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlProfile {
    Gl2,
    Gl3Compat,
    Gl4Compat,
    Gl3Core,
    Gl4Core,
    Gles2,
    Gles3,
}

impl GlProfile {
    /// Returns true when the fixed-function GL2 API is available on this profile. The globe
    /// renderer needs it; core and ES profiles do not provide it.
    pub fn provides_gl2(&self) -> bool {
        matches!(self, GlProfile::Gl2 | GlProfile::Gl3Compat | GlProfile::Gl4Compat)
    }
}

impl fmt::Display for GlProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GlProfile::Gl2 => "GL2",
            GlProfile::Gl3Compat => "GL3 compatibility",
            GlProfile::Gl4Compat => "GL4 compatibility",
            GlProfile::Gl3Core => "GL3 core",
            GlProfile::Gl4Core => "GL4 core",
            GlProfile::Gles2 => "GLES2",
            GlProfile::Gles3 => "GLES3",
        };
        f.write_str(name)
    }
}

/// Capabilities requested when creating an offscreen drawable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    pub onscreen: bool,
    pub double_buffered: bool,
    pub hardware_accelerated: bool,
}

impl SurfaceCapabilities {
    /// Single-buffered, hardware accelerated, never shown on screen. The rendered frame is
    /// read back instead of presented.
    pub fn offscreen() -> Self {
        Self {
            onscreen: false,
            double_buffered: false,
            hardware_accelerated: true,
        }
    }
}

/// What happened when a drawable's context was made current.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextStatus {
    /// The same context as the previous frame.
    Current,
    /// A new context was created (first use, or the old one was lost and recreated). Every
    /// GPU handle created on an earlier context is stale.
    Created,
}

/// A current GPU context. Only valid between [`OffscreenDrawable::make_current`] and
/// [`OffscreenDrawable::release_current`].
pub trait GpuContext {
    fn profile(&self) -> GlProfile;

    fn is_function_available(&self, name: &str) -> bool;

    fn is_extension_available(&self, name: &str) -> bool;

    /// Copies a `size` region starting at `(x, y)` of the color buffer into `dst`.
    /// Rows are written bottom-up, as the GPU stores them.
    fn read_pixels(
        &mut self,
        x: u32,
        y: u32,
        size: SurfaceSize,
        layout: PixelLayout,
        dst: &mut [u8],
    ) -> anyhow::Result<()>;
}

/// An offscreen render target together with the context that draws into it.
pub trait OffscreenDrawable {
    fn size(&self) -> SurfaceSize;

    fn set_size(&mut self, size: SurfaceSize) -> anyhow::Result<()>;

    /// Presentation is driven by the bridge, so this is turned off on bind.
    fn set_auto_swap_buffer_mode(&mut self, enabled: bool);

    fn auto_swap_buffer_mode(&self) -> bool;

    /// Makes the context current on the calling thread, creating it when needed.
    fn make_current(&mut self) -> anyhow::Result<ContextStatus>;

    fn context(&mut self) -> &mut dyn GpuContext;

    fn release_current(&mut self);

    /// Releases the drawable and its context. The drawable must not be used afterwards.
    fn destroy(&mut self);
}

/// Creates offscreen drawables for a host.
pub trait DrawableFactory {
    fn create_offscreen(
        &mut self,
        caps: SurfaceCapabilities,
        size: SurfaceSize,
    ) -> anyhow::Result<Box<dyn OffscreenDrawable>>;
}
