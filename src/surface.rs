//! Pixel surfaces
//!
//! A [`PixelSurface`] owns the decoded pixels of one rendered region of
//! one page. The backend's transient buffer is copied out and released
//! immediately; the displayable image is built lazily from the decoded
//! copy and cached until the next draw.

use std::sync::{Arc, Mutex, PoisonError};

use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use log::{debug, error, warn};

use crate::document::Page;
use crate::error::{BackendError, PageError};
use crate::geom::PageRect;
use crate::options::{ColorMode, ImageFormat, RenderOptions};

/// Decoded pixel data in the layout the color mode dictates.
#[derive(Clone, Debug)]
pub enum Pixels {
    /// One byte per pixel: gray and binary modes.
    Bytes(Vec<u8>),
    /// One packed native-endian word per pixel: RGB-family modes.
    Packed(Vec<u32>),
}

/// Coordinate space of an already-rendered view.
///
/// Used when draw coordinates are expressed in a rotated, zoomed view
/// rather than canonical page space.
#[derive(Clone, Copy, Debug)]
pub struct ViewCoords {
    pub zoom: f32,
    pub rotation: i32,
}

/// Rendered pixels for one page at one configuration.
pub struct PixelSurface {
    page: Arc<Page>,
    options: Arc<Mutex<RenderOptions>>,
    pixels: Option<Pixels>,
    image: Option<Arc<DynamicImage>>,
}

impl PixelSurface {
    /// Create a surface for a page. Returns `None` if the page has
    /// been disposed.
    #[must_use]
    pub fn new(page: Arc<Page>) -> Option<Self> {
        let options = page.options()?;
        options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_format(ImageFormat::Display);
        Some(Self {
            page,
            options,
            pixels: None,
            image: None,
        })
    }

    #[must_use]
    pub fn page(&self) -> &Arc<Page> {
        &self.page
    }

    /// The page-scoped options this surface renders with.
    #[must_use]
    pub fn options(&self) -> Arc<Mutex<RenderOptions>> {
        Arc::clone(&self.options)
    }

    #[must_use]
    pub fn pixels(&self) -> Option<&Pixels> {
        self.pixels.as_ref()
    }

    #[must_use]
    pub fn has_pixels(&self) -> bool {
        self.pixels.is_some()
    }

    /// Render a region of the page.
    ///
    /// With `view` present the coordinates are in that view's rotated
    /// and zoomed space and are converted back to canonical page space
    /// first. Without it they are canonical page coordinates.
    ///
    /// When the backend cannot allocate a buffer the previous pixels
    /// stay untouched and no error is raised; the caller retries or
    /// requests a smaller region. Invalid option combinations skip the
    /// render the same way.
    pub fn draw_page(
        &mut self,
        view: Option<ViewCoords>,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
    ) -> Result<(), BackendError> {
        let Some(handle) = self.page.handle() else {
            return Ok(());
        };

        let request = match view {
            Some(v) => {
                let zoom = if v.zoom > 0.0 { v.zoom } else { 1.0 };
                let rect = PageRect::new(x0 / zoom, y0 / zoom, x1 / zoom, y1 / zoom);
                rect.rotate_between(&self.page.bound_box(), v.rotation, 0)
            }
            None => PageRect::new(x0, y0, x1, y1),
        };

        let color = {
            let mut options = self.options.lock().unwrap_or_else(PoisonError::into_inner);
            options.set_bound_box(&request);
            if !options.is_valid() {
                debug!("skipping render, invalid option combination");
                return Ok(());
            }
            options.color_mode()
        };

        match self.page.backend().render_region(handle, &request)? {
            Some(buffer) => {
                let (width, height) = (buffer.width, buffer.height);
                self.pixels = Some(pack_pixels(&buffer.data, color));
                self.page.backend().release_buffer(handle, buffer);

                self.options
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .set_actual_box(0, 0, width, height);
                self.image = None;
            }
            None => {
                debug!("backend returned no pixel buffer, keeping previous pixels");
            }
        }

        Ok(())
    }

    /// Displayable image for the last rendered pixels, built on first
    /// access and cached until the next draw.
    ///
    /// Returns `None` when nothing has been rendered or the pixel data
    /// cannot back an image; decode problems release any partial state
    /// instead of crashing.
    #[must_use]
    pub fn image(&mut self) -> Option<Arc<DynamicImage>> {
        if self.image.is_none() {
            self.image = self.decode_image().map(Arc::new);
        }
        self.image.clone()
    }

    fn decode_image(&self) -> Option<DynamicImage> {
        let pixels = self.pixels.as_ref()?;
        let (color, bound_box) = {
            let options = self.options.lock().unwrap_or_else(PoisonError::into_inner);
            (options.color_mode(), options.bound_box())
        };

        let width = u32::try_from(bound_box.width()).ok()?;
        let height = u32::try_from(bound_box.height()).ok()?;
        let count = (width as usize).checked_mul(height as usize)?;
        if count == 0 {
            return None;
        }

        match (pixels, color) {
            (Pixels::Bytes(bytes), _) => {
                if bytes.len() != count {
                    error!(
                        "pixel buffer length {} does not match {}x{} region",
                        bytes.len(),
                        width,
                        height
                    );
                    return None;
                }
                GrayImage::from_raw(width, height, bytes.clone()).map(DynamicImage::ImageLuma8)
            }

            (Pixels::Packed(words), ColorMode::Argb | ColorMode::ArgbPre) => {
                if words.len() != count {
                    error!("pixel buffer length mismatch for {width}x{height} region");
                    return None;
                }
                let mut data = Vec::with_capacity(count.checked_mul(4)?);
                for word in words {
                    data.extend_from_slice(&[
                        (word >> 16) as u8,
                        (word >> 8) as u8,
                        *word as u8,
                        (word >> 24) as u8,
                    ]);
                }
                RgbaImage::from_raw(width, height, data).map(DynamicImage::ImageRgba8)
            }

            (Pixels::Packed(words), ColorMode::Bgr) => {
                if words.len() != count {
                    error!("pixel buffer length mismatch for {width}x{height} region");
                    return None;
                }
                let mut data = Vec::with_capacity(count.checked_mul(3)?);
                for word in words {
                    data.extend_from_slice(&[*word as u8, (word >> 8) as u8, (word >> 16) as u8]);
                }
                RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8)
            }

            (Pixels::Packed(words), _) => {
                if words.len() != count {
                    error!("pixel buffer length mismatch for {width}x{height} region");
                    return None;
                }
                let mut data = Vec::with_capacity(count.checked_mul(3)?);
                for word in words {
                    data.extend_from_slice(&[(word >> 16) as u8, (word >> 8) as u8, *word as u8]);
                }
                RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8)
            }
        }
    }

    /// Clone this surface onto a fresh backend page handle.
    ///
    /// Zoom, rotation, anti-alias, gamma and color mode carry over;
    /// pixels and the cached image do not. The clone is the sole owner
    /// of its page handle.
    pub fn try_clone(&self) -> Result<PixelSurface, PageError> {
        let page = self.page.reopen()?;
        let mut clone = PixelSurface::new(page).ok_or(PageError::PageClosed)?;

        let source = self.options.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let options = clone.options();
            let mut target = options.lock().unwrap_or_else(PoisonError::into_inner);
            target.set_zoom(source.zoom());
            target.set_rotation(source.rotation());
            target.set_anti_alias(source.anti_alias());
            target.set_gamma(source.gamma());
            target.set_color_mode(source.color_mode());
        }
        drop(source);

        Ok(clone)
    }

    /// Drop decoded pixels and the cached image. The page handle stays
    /// with its owner.
    pub fn dispose(&mut self) {
        self.image = None;
        self.pixels = None;
    }
}

impl std::fmt::Debug for PixelSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelSurface")
            .field("page", &self.page.number())
            .field("has_pixels", &self.has_pixels())
            .field("has_image", &self.image.is_some())
            .finish_non_exhaustive()
    }
}

/// Copy transient backend bytes into the owned layout for `color`.
fn pack_pixels(data: &[u8], color: ColorMode) -> Pixels {
    if color.is_byte_data() {
        Pixels::Bytes(data.to_vec())
    } else {
        if data.len() % 4 != 0 {
            warn!(
                "packed pixel buffer length {} is not word aligned, dropping {} trailing bytes",
                data.len(),
                data.len() % 4
            );
        }
        let words = data
            .chunks_exact(4)
            .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Pixels::Packed(words)
    }
}
