//! CPU-writable images and the exchange that fills them from the GPU.
//!
//! A [`WritableImage`] exposes its backing buffer directly. After the GPU color buffer has
//! been copied into that buffer the image's own change tracking is signaled: first its
//! pixels-dirty mark, then its serial counter. The display pipeline picks up the new pixels
//! from the serial change without a re-layout.

use crate::errors::BridgeError;
use crate::render::surface::{GpuContext, PixelLayout, SurfaceSize};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// An image whose pixel storage can be written directly from the CPU.
pub trait WritableImage {
    fn as_any(&self) -> &dyn Any;

    fn size(&self) -> SurfaceSize;

    /// Length of the backing buffer in bytes.
    fn byte_len(&self) -> usize;

    /// Hands the backing buffer to `f`. No copy is made.
    fn with_pixels_mut(&self, f: &mut dyn FnMut(&mut [u8]) -> anyhow::Result<()>) -> anyhow::Result<()>;

    /// Marks the whole image as changed.
    fn mark_pixels_dirty(&self);

    fn serial(&self) -> u64;

    fn increment_serial(&self);
}

/// Allocates images for the display.
pub trait ImageFactory {
    fn create_image(&mut self, size: SurfaceSize) -> anyhow::Result<Rc<dyn WritableImage>>;
}

/// In-memory BGRA image.
pub struct PixelImage {
    size: SurfaceSize,
    buf: RefCell<Box<[u8]>>,
    dirty: Cell<bool>,
    serial: Cell<u64>,
}

impl PixelImage {
    pub fn new(size: SurfaceSize) -> Self {
        Self {
            size,
            buf: RefCell::new(vec![0u8; size.byte_len(PixelLayout::Bgra8)].into_boxed_slice()),
            dirty: Cell::new(false),
            serial: Cell::new(0),
        }
    }

    /// Returns and clears the dirty mark.
    pub fn take_dirty(&self) -> bool {
        self.dirty.replace(false)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Copy of the current pixels.
    pub fn pixels(&self) -> Vec<u8> {
        self.buf.borrow().to_vec()
    }
}

impl WritableImage for PixelImage {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn byte_len(&self) -> usize {
        self.buf.borrow().len()
    }

    fn with_pixels_mut(&self, f: &mut dyn FnMut(&mut [u8]) -> anyhow::Result<()>) -> anyhow::Result<()> {
        let mut buf = self
            .buf
            .try_borrow_mut()
            .map_err(|_| anyhow::anyhow!("pixel buffer is already borrowed"))?;
        f(&mut buf)
    }

    fn mark_pixels_dirty(&self) {
        self.dirty.set(true);
    }

    fn serial(&self) -> u64 {
        self.serial.get()
    }

    fn increment_serial(&self) {
        self.serial.set(self.serial.get().wrapping_add(1));
    }
}

/// Creates [`PixelImage`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct PixelImageFactory;

impl PixelImageFactory {
    pub fn new() -> Self {
        Self
    }
}

impl ImageFactory for PixelImageFactory {
    fn create_image(&mut self, size: SurfaceSize) -> anyhow::Result<Rc<dyn WritableImage>> {
        Ok(Rc::new(PixelImage::new(size)))
    }
}

/// A bound image ready to receive GPU readbacks.
pub struct PixelTarget {
    image: Rc<dyn WritableImage>,
}

impl PixelTarget {
    /// Binds `image`. Its buffer must hold exactly `width * height * 4` bytes.
    pub fn bind(image: Rc<dyn WritableImage>) -> Result<Self, BridgeError> {
        let expected = image.size().byte_len(PixelLayout::Bgra8);
        let actual = image.byte_len();
        if expected != actual {
            return Err(BridgeError::PixelTargetMismatch { expected, actual });
        }
        Ok(Self { image })
    }

    pub fn image(&self) -> &Rc<dyn WritableImage> {
        &self.image
    }

    pub fn size(&self) -> SurfaceSize {
        self.image.size()
    }

    pub fn with_pixels_mut(&self, f: &mut dyn FnMut(&mut [u8]) -> anyhow::Result<()>) -> anyhow::Result<()> {
        self.image.with_pixels_mut(f)
    }

    /// Signals that the pixels were written out-of-band.
    pub fn mark_dirty(&self) {
        self.image.mark_pixels_dirty();
        self.image.increment_serial();
    }
}

/// Owns the current pixel target and replaces it whenever the displayed size changes.
pub struct PixelBufferExchange {
    factory: Box<dyn ImageFactory>,
    target: Option<PixelTarget>,
}

impl PixelBufferExchange {
    pub fn new(factory: Box<dyn ImageFactory>) -> Self {
        Self { factory, target: None }
    }

    pub fn target(&self) -> Option<&PixelTarget> {
        self.target.as_ref()
    }

    /// The image currently bound, if any.
    pub fn image(&self) -> Option<Rc<dyn WritableImage>> {
        self.target.as_ref().map(|t| t.image().clone())
    }

    /// Drops the current target and allocates a new one for `size`. An empty size leaves the
    /// exchange without a target.
    pub fn rebind(&mut self, size: SurfaceSize) -> anyhow::Result<Option<Rc<dyn WritableImage>>> {
        self.target = None;
        if size.is_empty() {
            log::debug!("pixel target released ({size})");
            return Ok(None);
        }

        let image = self.factory.create_image(size)?;
        let target = PixelTarget::bind(image.clone())?;
        log::debug!("pixel target bound ({size}, {} bytes)", target.image().byte_len());
        self.target = Some(target);
        Ok(Some(image))
    }

    /// Copies the GPU color buffer into the current target and marks it dirty. Returns
    /// `false` when there is no target to fill.
    pub fn readback(&self, gpu: &mut dyn GpuContext) -> anyhow::Result<bool> {
        let Some(target) = self.target.as_ref() else {
            return Ok(false);
        };

        let size = target.size();
        target.with_pixels_mut(&mut |buf: &mut [u8]| gpu.read_pixels(0, 0, size, PixelLayout::Bgra8, buf))?;
        target.mark_dirty();
        Ok(true)
    }
}
