pub mod backends;
pub mod pixels;
pub mod surface;

pub use pixels::{ImageFactory, PixelBufferExchange, PixelImage, PixelImageFactory, PixelTarget, WritableImage};
pub use surface::{
    ContextStatus, DrawableFactory, GlProfile, GpuContext, OffscreenDrawable, PixelLayout, SurfaceCapabilities,
    SurfaceSize,
};
