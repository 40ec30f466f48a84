//! Page rasterization, viewing and tiling on top of an opaque
//! rendering backend.
//!
//! The backend (see [`backend::RenderBackend`]) parses documents and
//! rasterizes regions; this crate owns everything above that line:
//! page and handle lifecycle, validated per-page rendering options
//! written through to a backend-shared block, rotated and zoomed view
//! geometry, pixel surfaces with lazily built display images, an
//! asynchronous single-worker page renderer, and tiled rendering for
//! large views.
//!
//! ```no_run
//! use pagegrid::{ColorMode, PageRenderer};
//! # fn doc() -> pagegrid::Document { unimplemented!() }
//!
//! let document = doc();
//! let page = document.page(0)?;
//! let mut renderer = PageRenderer::with_settings(Some(page), 2.0, 90, ColorMode::Rgb);
//! renderer.render(true);
//! let _image = renderer.image();
//! # Ok::<(), pagegrid::PageError>(())
//! ```

pub mod backend;
pub mod document;
pub mod error;
pub mod geom;
pub mod options;
pub mod renderer;
pub mod surface;
pub mod tiles;

pub(crate) mod worker;

#[cfg(any(test, feature = "test-utils"))]
pub mod stub;

pub use backend::{DocHandle, OpenedPage, PageHandle, RawBuffer, RenderBackend};
pub use document::{Document, Page};
pub use error::{BackendError, PageError};
pub use geom::PageRect;
pub use options::{
    ColorMode, ImageFormat, OptionsBlock, RenderOptions, TifCompression, TifMode, ROTATE_AUTO,
};
pub use renderer::PageRenderer;
pub use surface::{PixelSurface, Pixels, ViewCoords};
pub use tiles::{Tile, TileCache};
