//! Documents and pages on top of a rendering backend
//!
//! A [`Page`] owns exactly one backend page handle plus the lazily
//! created rendering options bound to it. Pages are reference counted
//! so surfaces and tiles can hold them; the handle closes when the last
//! owner drops it or when [`Page::dispose`] is called explicitly.

use std::sync::{Arc, Mutex, PoisonError};

use crate::backend::{DocHandle, PageHandle, RenderBackend};
use crate::error::PageError;
use crate::geom::PageRect;
use crate::options::RenderOptions;
use crate::surface::PixelSurface;

/// An open document on the backend.
pub struct Document {
    backend: Arc<dyn RenderBackend>,
    handle: DocHandle,
    page_count: i32,
}

impl Document {
    #[must_use]
    pub fn new(backend: Arc<dyn RenderBackend>, handle: DocHandle, page_count: i32) -> Self {
        Self {
            backend,
            handle,
            page_count,
        }
    }

    #[must_use]
    pub fn page_count(&self) -> i32 {
        self.page_count
    }

    #[must_use]
    pub fn handle(&self) -> DocHandle {
        self.handle
    }

    /// Open a page by zero-based number.
    ///
    /// Fails with [`crate::error::BackendError::AuthRequired`] for
    /// encrypted documents and a page-open error for invalid numbers;
    /// neither is fatal to the document.
    pub fn page(&self, number: i32) -> Result<Arc<Page>, PageError> {
        Page::open(Arc::clone(&self.backend), self.handle, number)
    }
}

/// One page of a document, owning its backend handle.
pub struct Page {
    backend: Arc<dyn RenderBackend>,
    doc: DocHandle,
    number: i32,
    bound_box: PageRect,
    rotation: i32,
    handle: Mutex<Option<PageHandle>>,
    // Lazy singleton; one validated configuration per page.
    options: Mutex<Option<Arc<Mutex<RenderOptions>>>>,
}

impl Page {
    fn open(
        backend: Arc<dyn RenderBackend>,
        doc: DocHandle,
        number: i32,
    ) -> Result<Arc<Self>, PageError> {
        let opened = backend.open_page(doc, number)?;
        Ok(Arc::new(Self {
            backend,
            doc,
            number,
            bound_box: opened.bound_box,
            rotation: opened.rotation,
            handle: Mutex::new(Some(opened.handle)),
            options: Mutex::new(None),
        }))
    }

    /// Open a fresh handle for the same page number.
    ///
    /// The new page has its own options singleton and shares nothing
    /// with this one; tiles use this to render independently.
    pub fn reopen(&self) -> Result<Arc<Self>, PageError> {
        Self::open(Arc::clone(&self.backend), self.doc, self.number)
    }

    #[must_use]
    pub fn number(&self) -> i32 {
        self.number
    }

    /// Nominal page rectangle in unrotated page space.
    #[must_use]
    pub fn bound_box(&self) -> PageRect {
        self.bound_box
    }

    /// Rotation baked into the document for this page.
    #[must_use]
    pub fn rotation(&self) -> i32 {
        self.rotation
    }

    #[must_use]
    pub fn x(&self) -> i32 {
        self.bound_box.x()
    }

    #[must_use]
    pub fn y(&self) -> i32 {
        self.bound_box.y()
    }

    #[must_use]
    pub fn width(&self) -> i32 {
        self.bound_box.width()
    }

    #[must_use]
    pub fn height(&self) -> i32 {
        self.bound_box.height()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.handle().is_some()
    }

    pub(crate) fn handle(&self) -> Option<PageHandle> {
        *self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn backend(&self) -> &Arc<dyn RenderBackend> {
        &self.backend
    }

    /// Rendering options for this page, created on first access.
    ///
    /// Returns `None` once the page has been disposed.
    #[must_use]
    pub fn options(&self) -> Option<Arc<Mutex<RenderOptions>>> {
        let handle = self.handle()?;
        let mut slot = self.options.lock().unwrap_or_else(PoisonError::into_inner);
        let options = slot.get_or_insert_with(|| {
            Arc::new(Mutex::new(RenderOptions::new(
                self.backend.options_block(handle),
            )))
        });
        Some(Arc::clone(options))
    }

    /// Create a pixel surface rendering this page.
    ///
    /// Returns `None` once the page has been disposed.
    #[must_use]
    pub fn pixels(self: &Arc<Self>) -> Option<PixelSurface> {
        PixelSurface::new(Arc::clone(self))
    }

    /// Close the backend handle and disable the options. Idempotent;
    /// dropping the last reference does this automatically.
    pub fn dispose(&self) {
        let handle = {
            let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };
        let Some(handle) = handle else {
            return;
        };

        if let Some(options) = &*self.options.lock().unwrap_or_else(PoisonError::into_inner) {
            options
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .dispose();
        }
        self.backend.close_page(handle);
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("number", &self.number)
            .field("bound_box", &self.bound_box)
            .field("rotation", &self.rotation)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ColorMode;
    use crate::stub::StubBackend;

    #[test]
    fn page_open_and_dispose_release_backend_handles() {
        let backend = StubBackend::new();
        let doc = backend.document(vec![PageRect::new(0.0, 0.0, 612.0, 792.0)]);

        let page = doc.page(0).expect("open page");
        assert_eq!(backend.open_pages(), 1);
        assert_eq!((page.width(), page.height()), (612, 792));

        page.dispose();
        assert!(!page.is_open());
        assert_eq!(backend.open_pages(), 0);

        // Idempotent
        page.dispose();
        assert_eq!(backend.open_pages(), 0);
    }

    #[test]
    fn dropping_the_last_owner_closes_the_handle() {
        let backend = StubBackend::new();
        let doc = backend.document(vec![PageRect::new(0.0, 0.0, 100.0, 100.0)]);

        let page = doc.page(0).expect("open page");
        drop(page);
        assert_eq!(backend.open_pages(), 0);
    }

    #[test]
    fn invalid_page_number_is_a_page_open_error() {
        let backend = StubBackend::new();
        let doc = backend.document(vec![PageRect::new(0.0, 0.0, 100.0, 100.0)]);

        assert!(doc.page(7).is_err());
        assert!(doc.page(-1).is_err());
    }

    #[test]
    fn options_are_a_lazy_singleton_per_page() {
        let backend = StubBackend::new();
        let doc = backend.document(vec![PageRect::new(0.0, 0.0, 100.0, 100.0)]);
        let page = doc.page(0).expect("open page");

        let a = page.options().expect("options");
        let b = page.options().expect("options");
        assert!(Arc::ptr_eq(&a, &b));

        page.dispose();
        assert!(page.options().is_none());
    }

    #[test]
    fn disposing_a_page_disables_its_options() {
        let backend = StubBackend::new();
        let doc = backend.document(vec![PageRect::new(0.0, 0.0, 100.0, 100.0)]);
        let page = doc.page(0).expect("open page");

        let options = page.options().expect("options");
        page.dispose();

        let mut guard = options.lock().expect("lock");
        assert!(guard.is_disposed());
        guard.set_color_mode(ColorMode::Gray);
        assert_eq!(guard.color_mode(), ColorMode::Rgb);
    }

    #[test]
    fn reopen_creates_an_independent_handle() {
        let backend = StubBackend::new();
        let doc = backend.document(vec![PageRect::new(0.0, 0.0, 100.0, 100.0)]);
        let page = doc.page(0).expect("open page");
        let twin = page.reopen().expect("reopen");

        assert_eq!(backend.open_pages(), 2);
        page.dispose();
        assert!(twin.is_open());
        assert_eq!(backend.open_pages(), 1);
    }
}
