//! Validated per-page rendering configuration
//!
//! [`RenderOptions`] is created lazily, once per page, and every setter
//! writes through to a backend-owned fixed-layout options block so the
//! backend observes changes synchronously. After the page is disposed
//! all setters become silent no-ops; the backing block may already be
//! gone on the backend side.

use std::sync::{Arc, Mutex, PoisonError};

use log::warn;

use crate::geom::{self, PageRect};

/// Sentinel rotation resolved to the page's default (treated as 0).
pub const ROTATE_AUTO: i32 = -1;
/// Base rendering resolution in DPI at zoom 1.
pub const DEFAULT_RESOLUTION: f32 = 72.0;

/// Output image container format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Pbm,
    Pnm,
    Jpg,
    Bmp,
    Pam,
    Tif,
    /// In-memory display image, no container format.
    Display,
}

impl ImageFormat {
    #[must_use]
    pub fn wire_value(self) -> i32 {
        match self {
            Self::Png => 1,
            Self::Pbm => 2,
            Self::Pnm => 3,
            Self::Jpg => 4,
            Self::Bmp => 5,
            Self::Pam => 6,
            Self::Tif => 7,
            Self::Display => 8,
        }
    }
}

/// Pixel color interpretation of rendered output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorMode {
    Rgb,
    Argb,
    ArgbPre,
    Bgr,
    Gray,
    Binary,
    BinaryDither,
}

impl ColorMode {
    #[must_use]
    pub fn wire_value(self) -> i32 {
        match self {
            Self::Rgb => 1,
            Self::Argb => 2,
            Self::ArgbPre => 3,
            Self::Bgr => 4,
            Self::Gray => 10,
            Self::Binary => 12,
            Self::BinaryDither => 121,
        }
    }

    #[must_use]
    pub fn from_wire(value: i32) -> Self {
        match value {
            2 => Self::Argb,
            3 => Self::ArgbPre,
            4 => Self::Bgr,
            10 => Self::Gray,
            12 => Self::Binary,
            121 => Self::BinaryDither,
            _ => Self::Rgb,
        }
    }

    /// One byte per pixel in the packed buffer; everything else packs
    /// into 4-byte words.
    #[must_use]
    pub fn is_byte_data(self) -> bool {
        matches!(self, Self::Gray | Self::Binary | Self::BinaryDither)
    }

    #[must_use]
    pub fn has_alpha(self) -> bool {
        matches!(self, Self::Argb | Self::ArgbPre)
    }
}

/// TIFF compression scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TifCompression {
    None,
    CcittRle,
    CcittT4,
    CcittT6,
    Lzw,
    Jpeg,
    Zlib,
    Packbits,
    Deflate,
}

impl TifCompression {
    #[must_use]
    pub fn wire_value(self) -> i32 {
        match self {
            Self::None => 1,
            Self::CcittRle => 2,
            Self::CcittT4 => 3,
            Self::CcittT6 => 4,
            Self::Lzw => 5,
            Self::Jpeg => 7,
            Self::Zlib => 8,
            Self::Packbits => 32773,
            Self::Deflate => 32946,
        }
    }

    fn is_ccitt(self) -> bool {
        matches!(self, Self::CcittRle | Self::CcittT4 | Self::CcittT6)
    }
}

/// TIFF multi-page write mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TifMode {
    Discard,
    Append,
}

impl TifMode {
    #[must_use]
    pub fn wire_value(self) -> i32 {
        match self {
            Self::Discard => 0,
            Self::Append => 1,
        }
    }
}

/// Byte length of the backend options record.
pub const OPTIONS_BLOCK_LEN: usize = 52;

pub(crate) const IDX_IMAGE_FORMAT: usize = 0;
pub(crate) const IDX_COLOR_MODE: usize = 4;
pub(crate) const IDX_ROTATE: usize = 8;
pub(crate) const IDX_QUALITY: usize = 12;
pub(crate) const IDX_COMPRESSION: usize = 16;
pub(crate) const IDX_MODE: usize = 20;
pub(crate) const IDX_ANTI_ALIAS: usize = 24;
pub(crate) const IDX_ZOOM: usize = 28;
pub(crate) const IDX_GAMMA: usize = 32;
pub(crate) const IDX_X0: usize = 36;
pub(crate) const IDX_Y0: usize = 40;
pub(crate) const IDX_X1: usize = 44;
pub(crate) const IDX_Y1: usize = 48;

/// Backend-owned fixed-layout options record.
///
/// 4-byte native-endian fields at fixed offsets; the backend reads the
/// record directly, there is no separate commit step.
#[derive(Debug)]
pub struct OptionsBlock {
    bytes: Mutex<[u8; OPTIONS_BLOCK_LEN]>,
}

impl OptionsBlock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes: Mutex::new([0u8; OPTIONS_BLOCK_LEN]),
        }
    }

    pub fn put_i32(&self, offset: usize, value: i32) {
        let mut bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        bytes[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
    }

    pub fn put_f32(&self, offset: usize, value: f32) {
        let mut bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        bytes[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
    }

    #[must_use]
    pub fn get_i32(&self, offset: usize) -> i32 {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&bytes[offset..offset + 4]);
        i32::from_ne_bytes(buf)
    }

    #[must_use]
    pub fn get_f32(&self, offset: usize) -> f32 {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&bytes[offset..offset + 4]);
        f32::from_ne_bytes(buf)
    }
}

impl Default for OptionsBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Rendering configuration bound to one page.
#[derive(Debug)]
pub struct RenderOptions {
    format: ImageFormat,
    color: ColorMode,
    rotation: i32,
    anti_alias: i32,
    gamma: f32,
    zoom: f32,
    quality: i32,
    compression: TifCompression,
    mode: TifMode,
    bound_box: PageRect,
    block: Arc<OptionsBlock>,
    disposed: bool,
}

impl RenderOptions {
    /// Create options bound to a backend block, loaded with defaults.
    #[must_use]
    pub fn new(block: Arc<OptionsBlock>) -> Self {
        let mut options = Self {
            format: ImageFormat::Png,
            color: ColorMode::Rgb,
            rotation: 0,
            anti_alias: 8,
            gamma: 1.0,
            zoom: 1.0,
            quality: 0,
            compression: TifCompression::Zlib,
            mode: TifMode::Append,
            bound_box: PageRect::default(),
            block,
            disposed: false,
        };
        options.load_defaults();
        options
    }

    fn load_defaults(&mut self) {
        self.set_format(ImageFormat::Png);
        self.set_color_mode(ColorMode::Rgb);
        self.set_rotation(0);
        self.set_anti_alias(8);
        self.set_gamma(1.0);
        self.set_zoom(1.0);
        self.set_quality(0);
        self.set_compression(TifCompression::Zlib);
        self.set_mode(TifMode::Append);
        self.set_bound_box(&PageRect::default());
    }

    #[must_use]
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn set_format(&mut self, format: ImageFormat) {
        if self.disposed {
            return;
        }
        self.format = format;
        self.block.put_i32(IDX_IMAGE_FORMAT, format.wire_value());
    }

    #[must_use]
    pub fn color_mode(&self) -> ColorMode {
        self.color
    }

    pub fn set_color_mode(&mut self, color: ColorMode) {
        if self.disposed {
            return;
        }
        self.color = color;
        self.block.put_i32(IDX_COLOR_MODE, color.wire_value());
    }

    /// Rotation normalized into [0, 360).
    #[must_use]
    pub fn rotation(&self) -> i32 {
        self.rotation
    }

    /// Set rotation; [`ROTATE_AUTO`] falls back to 0, anything else is
    /// normalized into [0, 360).
    pub fn set_rotation(&mut self, rotation: i32) {
        if self.disposed {
            return;
        }
        let rotation = if rotation == ROTATE_AUTO { 0 } else { rotation };
        self.rotation = geom::normalize_angle(rotation);
        self.block.put_i32(IDX_ROTATE, rotation);
    }

    #[must_use]
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Set zoom; non-positive (or non-finite) values fall back to 1.
    pub fn set_zoom(&mut self, zoom: f32) {
        if self.disposed {
            return;
        }
        let zoom = if zoom.is_finite() && zoom > 0.0 {
            zoom
        } else {
            1.0
        };
        self.zoom = zoom;
        self.block.put_f32(IDX_ZOOM, zoom);
    }

    /// Effective resolution in DPI for the current zoom.
    #[must_use]
    pub fn resolution(&self) -> f32 {
        self.zoom * DEFAULT_RESOLUTION
    }

    #[must_use]
    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    /// Set gamma correction, clamped into (0, 2]. Typical values are
    /// 0.7 and 1.4 to thin or darken rendered text.
    pub fn set_gamma(&mut self, gamma: f32) {
        if self.disposed {
            return;
        }
        let gamma = if !gamma.is_finite() || gamma <= 0.0 {
            1.0
        } else if gamma > 2.0 {
            2.0
        } else {
            gamma
        };
        self.gamma = gamma;
        self.block.put_f32(IDX_GAMMA, gamma);
    }

    #[must_use]
    pub fn quality(&self) -> i32 {
        self.quality
    }

    pub fn set_quality(&mut self, quality: i32) {
        if self.disposed {
            return;
        }
        self.quality = quality;
        self.block.put_i32(IDX_QUALITY, quality);
    }

    #[must_use]
    pub fn compression(&self) -> TifCompression {
        self.compression
    }

    pub fn set_compression(&mut self, compression: TifCompression) {
        if self.disposed {
            return;
        }
        self.compression = compression;
        self.block.put_i32(IDX_COMPRESSION, compression.wire_value());
    }

    #[must_use]
    pub fn mode(&self) -> TifMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: TifMode) {
        if self.disposed {
            return;
        }
        self.mode = mode;
        self.block.put_i32(IDX_MODE, mode.wire_value());
    }

    #[must_use]
    pub fn anti_alias(&self) -> i32 {
        self.anti_alias
    }

    /// Set the anti-alias bit level, clamped into [0, 8]. Zero turns
    /// anti-aliasing off.
    pub fn set_anti_alias(&mut self, anti_alias: i32) {
        if self.disposed {
            return;
        }
        let anti_alias = anti_alias.clamp(0, 8);
        self.anti_alias = anti_alias;
        self.block.put_i32(IDX_ANTI_ALIAS, anti_alias);
    }

    /// Render region in canonical page coordinates.
    #[must_use]
    pub fn bound_box(&self) -> PageRect {
        self.bound_box
    }

    pub fn set_bound_box(&mut self, bound_box: &PageRect) {
        if self.disposed {
            return;
        }
        self.bound_box = *bound_box;
        self.block.put_f32(IDX_X0, bound_box.x0());
        self.block.put_f32(IDX_Y0, bound_box.y0());
        self.block.put_f32(IDX_X1, bound_box.x1());
        self.block.put_f32(IDX_Y1, bound_box.y1());
    }

    /// Record the bounding box the backend actually rendered.
    ///
    /// Updates only the in-memory rectangle; the block keeps the
    /// requested region.
    pub(crate) fn set_actual_box(&mut self, x: i32, y: i32, w: i32, h: i32) {
        self.bound_box.set_size(x, y, w, h);
    }

    /// Cross-validate format, color mode and compression.
    ///
    /// Out-of-range qualities are auto-corrected as a side effect
    /// (JPEG output and TIFF-JPEG to 75, TIFF-zlib to 6); incompatible
    /// combinations log the violation and return false, never error.
    pub fn is_valid(&mut self) -> bool {
        let mut valid = true;
        let color = self.color;

        match self.format {
            ImageFormat::Display => {}

            ImageFormat::Png | ImageFormat::Pam => {
                if !matches!(
                    color,
                    ColorMode::Rgb | ColorMode::Argb | ColorMode::ArgbPre | ColorMode::Gray
                ) {
                    warn!("invalid color mode {color:?} for {:?}", self.format);
                    valid = false;
                }
            }

            ImageFormat::Pnm => {
                if !matches!(color, ColorMode::Rgb | ColorMode::Gray) {
                    warn!("invalid color mode {color:?} for PNM");
                    valid = false;
                }
            }

            ImageFormat::Pbm => {
                if color != ColorMode::Gray {
                    warn!("invalid color mode {color:?} for PBM");
                    valid = false;
                }
            }

            ImageFormat::Jpg => {
                if !matches!(color, ColorMode::Rgb | ColorMode::Gray) {
                    warn!("invalid color mode {color:?} for JPEG");
                    valid = false;
                }
                if !(0..=100).contains(&self.quality) {
                    self.set_quality(75);
                }
            }

            ImageFormat::Bmp => {
                if !matches!(
                    color,
                    ColorMode::Rgb | ColorMode::Gray | ColorMode::Binary | ColorMode::BinaryDither
                ) {
                    warn!("invalid color mode {color:?} for BMP");
                    valid = false;
                }
            }

            ImageFormat::Tif => {
                if color == ColorMode::Bgr {
                    warn!("invalid color mode {color:?} for TIFF");
                    valid = false;
                }

                if self.compression.is_ccitt() {
                    if !matches!(color, ColorMode::Binary | ColorMode::BinaryDither) {
                        warn!("CCITT compression requires a binary color mode");
                        valid = false;
                    }
                    if color.has_alpha() {
                        warn!("CCITT compression cannot carry an alpha channel");
                        valid = false;
                    }
                }

                if self.compression == TifCompression::Jpeg && !(1..=100).contains(&self.quality) {
                    self.set_quality(75);
                }

                if self.compression == TifCompression::Zlib && !(1..=9).contains(&self.quality) {
                    self.set_quality(6);
                }
            }
        }

        valid
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Mark the backing page as gone; every subsequent setter is a
    /// silent no-op. Idempotent.
    pub fn dispose(&mut self) {
        self.disposed = true;
    }
}
