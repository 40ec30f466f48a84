//! Backend capability interface
//!
//! The document engine behind this crate is opaque: it parses the
//! container format, owns the native page objects and rasterizes
//! regions. This module defines the narrow surface the rendering and
//! tiling layers need from it. Handles are plain ids; the backend owns
//! every resource they name.

use std::sync::Arc;

use crate::error::BackendError;
use crate::geom::PageRect;
use crate::options::OptionsBlock;

/// Opaque document identifier issued by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DocHandle(pub u64);

/// Opaque page identifier issued by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageHandle(pub u64);

/// Result of opening a page.
#[derive(Debug)]
pub struct OpenedPage {
    pub handle: PageHandle,
    /// Nominal page rectangle in unrotated page space.
    pub bound_box: PageRect,
    /// Rotation baked into the document for this page.
    pub rotation: i32,
}

/// Transient pixel buffer owned by the backend.
///
/// Holders copy the bytes out and hand the buffer back through
/// [`RenderBackend::release_buffer`]; the decoded copy is theirs, the
/// allocation is not.
#[derive(Debug)]
pub struct RawBuffer {
    pub id: u64,
    pub data: Vec<u8>,
    /// Actual rendered width in pixels.
    pub width: i32,
    /// Actual rendered height in pixels.
    pub height: i32,
}

/// Rendering engine capability surface.
///
/// Implementations read zoom, rotation and color mode from the page's
/// options block when rasterizing, clamp the requested region to the
/// page bounds, and report the dimensions actually rendered.
pub trait RenderBackend: Send + Sync {
    /// Open one page of a document.
    fn open_page(&self, doc: DocHandle, number: i32) -> Result<OpenedPage, BackendError>;

    /// Release a page handle. Ignores handles already closed.
    fn close_page(&self, page: PageHandle);

    /// Rasterize a region of a page.
    ///
    /// Returns `Ok(None)` when the backend cannot allocate the pixel
    /// buffer; callers retry later or request a smaller region.
    fn render_region(
        &self,
        page: PageHandle,
        request: &PageRect,
    ) -> Result<Option<RawBuffer>, BackendError>;

    /// Return a transient buffer to the backend.
    fn release_buffer(&self, page: PageHandle, buffer: RawBuffer);

    /// Fixed-layout options record for a page, shared with the backend.
    fn options_block(&self, page: PageHandle) -> Arc<OptionsBlock>;
}
