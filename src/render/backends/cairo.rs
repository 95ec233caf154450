use crate::render::pixels::{ImageFactory, WritableImage};
use crate::render::surface::{PixelLayout, SurfaceSize};
use anyhow::{anyhow, Result};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Cairo image whose surface sits directly on top of the readback buffer. A readback
/// writes straight into the pixels cairo paints from; no copy is involved.
pub struct CairoImage {
    surface: cairo::ImageSurface, // Paints from `buf`
    buf: RefCell<Box<[u8]>>,      // Readback destination; owned here, borrowed by `surface`
    size: SurfaceSize,
    serial: Cell<u64>,
}

impl CairoImage {
    pub fn new(size: SurfaceSize) -> Result<Self> {
        let stride = cairo::Format::ARgb32
            .stride_for_width(size.width)
            .unwrap_or((size.width * 4) as i32);

        // Readbacks are tightly packed BGRA rows, which is what ARGB32 is on little-endian hosts.
        if stride as usize != size.width as usize * PixelLayout::Bgra8.bytes_per_pixel() {
            return Err(anyhow!("cairo stride {stride} does not match a packed {size} image"));
        }

        let mut buf: Box<[u8]> = vec![0u8; size.byte_len(PixelLayout::Bgra8)].into_boxed_slice();

        // SAFETY: `buf` is stored in `Self` and outlives `surface`
        let slice_static: &'static mut [u8] = unsafe {
            std::mem::transmute::<&mut [u8], &'static mut [u8]>(&mut *buf)
        };
        let surface = cairo::ImageSurface::create_for_data(
            slice_static,
            cairo::Format::ARgb32,
            size.width as i32,
            size.height as i32,
            stride,
        )?;

        Ok(Self {
            surface,
            buf: RefCell::new(buf),
            size,
            serial: Cell::new(0),
        })
    }

    /// The surface the host paints from.
    pub fn surface(&self) -> &cairo::ImageSurface {
        &self.surface
    }
}

impl WritableImage for CairoImage {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn byte_len(&self) -> usize {
        self.buf.borrow().len()
    }

    fn with_pixels_mut(&self, f: &mut dyn FnMut(&mut [u8]) -> Result<()>) -> Result<()> {
        // Pending cairo drawing must land before the buffer is overwritten.
        self.surface.flush();
        let mut buf = self
            .buf
            .try_borrow_mut()
            .map_err(|_| anyhow!("cairo pixel buffer is already borrowed"))?;
        f(&mut buf)
    }

    fn mark_pixels_dirty(&self) {
        self.surface.mark_dirty();
    }

    fn serial(&self) -> u64 {
        self.serial.get()
    }

    fn increment_serial(&self) {
        self.serial.set(self.serial.get().wrapping_add(1));
    }
}

/// Creates [`CairoImage`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct CairoImageFactory;

impl ImageFactory for CairoImageFactory {
    fn create_image(&mut self, size: SurfaceSize) -> Result<Rc<dyn WritableImage>> {
        Ok(Rc::new(CairoImage::new(size)?))
    }
}
