//! In-memory backend for tests
//!
//! Implements [`RenderBackend`] over synthetic documents so the
//! rendering layers can be exercised without a native engine. The stub
//! honors the options block the same way a real backend would: zoom,
//! rotation and color mode are read back from the block at render time,
//! the request is clamped to the page bounds, and an all-zero request
//! means the full page.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::backend::{DocHandle, OpenedPage, PageHandle, RawBuffer, RenderBackend};
use crate::document::Document;
use crate::error::BackendError;
use crate::geom::{self, PageRect};
use crate::options::{ColorMode, IDX_COLOR_MODE, IDX_ROTATE, IDX_ZOOM, OptionsBlock};

struct DocState {
    pages: Vec<PageRect>,
    protected: bool,
}

struct PageState {
    rect: PageRect,
    block: Arc<OptionsBlock>,
}

struct State {
    next_doc: u64,
    next_page: u64,
    next_buffer: u64,
    docs: HashMap<u64, DocState>,
    pages: HashMap<u64, PageState>,
    outstanding: usize,
}

/// Deterministic fake rendering engine.
pub struct StubBackend {
    state: Mutex<State>,
    render_calls: AtomicUsize,
    memory_pressure: AtomicBool,
    fail_renders: AtomicBool,
    render_delay: Mutex<Duration>,
}

impl StubBackend {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                next_doc: 1,
                next_page: 1,
                next_buffer: 1,
                docs: HashMap::new(),
                pages: HashMap::new(),
                outstanding: 0,
            }),
            render_calls: AtomicUsize::new(0),
            memory_pressure: AtomicBool::new(false),
            fail_renders: AtomicBool::new(false),
            render_delay: Mutex::new(Duration::ZERO),
        })
    }

    /// Register a document whose pages have the given bounds.
    #[must_use]
    pub fn document(self: &Arc<Self>, pages: Vec<PageRect>) -> Document {
        self.register(pages, false)
    }

    /// Register an encrypted document; every page open fails with an
    /// authentication error.
    #[must_use]
    pub fn protected_document(self: &Arc<Self>, page_count: i32) -> Document {
        let pages = vec![PageRect::default(); page_count.max(0) as usize];
        self.register(pages, true)
    }

    fn register(self: &Arc<Self>, pages: Vec<PageRect>, protected: bool) -> Document {
        let page_count = pages.len() as i32;
        let handle = {
            let mut state = self.lock_state();
            let id = state.next_doc;
            state.next_doc += 1;
            state.docs.insert(id, DocState { pages, protected });
            DocHandle(id)
        };
        Document::new(Arc::clone(self) as Arc<dyn RenderBackend>, handle, page_count)
    }

    /// Number of page handles currently open.
    #[must_use]
    pub fn open_pages(&self) -> usize {
        self.lock_state().pages.len()
    }

    /// Render buffers handed out and not yet released.
    #[must_use]
    pub fn outstanding_buffers(&self) -> usize {
        self.lock_state().outstanding
    }

    /// Total region renders performed.
    #[must_use]
    pub fn render_calls(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }

    /// Make renders report buffer allocation failure.
    pub fn set_memory_pressure(&self, pressure: bool) {
        self.memory_pressure.store(pressure, Ordering::SeqCst);
    }

    /// Make renders fail with a backend error.
    pub fn set_fail_renders(&self, fail: bool) {
        self.fail_renders.store(fail, Ordering::SeqCst);
    }

    /// Delay every render, for exercising in-flight states.
    pub fn set_render_delay(&self, delay: Duration) {
        *self
            .render_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RenderBackend for StubBackend {
    fn open_page(&self, doc: DocHandle, number: i32) -> Result<OpenedPage, BackendError> {
        let mut state = self.lock_state();
        let doc_state = state.docs.get(&doc.0).ok_or(BackendError::PageOpen {
            number,
            detail: "unknown document".into(),
        })?;
        if doc_state.protected {
            return Err(BackendError::AuthRequired);
        }
        let rect = usize::try_from(number)
            .ok()
            .and_then(|n| doc_state.pages.get(n))
            .copied()
            .ok_or(BackendError::PageOpen {
                number,
                detail: "page number out of range".into(),
            })?;

        let id = state.next_page;
        state.next_page += 1;
        state.pages.insert(
            id,
            PageState {
                rect,
                block: Arc::new(OptionsBlock::new()),
            },
        );
        Ok(OpenedPage {
            handle: PageHandle(id),
            bound_box: rect,
            rotation: 0,
        })
    }

    fn close_page(&self, page: PageHandle) {
        self.lock_state().pages.remove(&page.0);
    }

    fn render_region(
        &self,
        page: PageHandle,
        request: &PageRect,
    ) -> Result<Option<RawBuffer>, BackendError> {
        let delay = *self
            .render_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        self.render_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_renders.load(Ordering::SeqCst) {
            return Err(BackendError::Render {
                detail: "synthetic failure".into(),
            });
        }
        if self.memory_pressure.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let mut state = self.lock_state();
        let Some(page_state) = state.pages.get(&page.0) else {
            return Err(BackendError::Render {
                detail: "unknown page handle".into(),
            });
        };
        let bounds = page_state.rect;
        let zoom = page_state.block.get_f32(IDX_ZOOM);
        let rotation = geom::normalize_angle(page_state.block.get_i32(IDX_ROTATE));
        let color = ColorMode::from_wire(page_state.block.get_i32(IDX_COLOR_MODE));

        // Zero request selects the full page, anything else is clamped.
        let region = if request.x0() == 0.0
            && request.y0() == 0.0
            && request.x1() == 0.0
            && request.y1() == 0.0
        {
            bounds
        } else {
            PageRect::new(
                request.x0().clamp(bounds.x0(), bounds.x1()),
                request.y0().clamp(bounds.y0(), bounds.y1()),
                request.x1().clamp(bounds.x0(), bounds.x1()),
                request.y1().clamp(bounds.y0(), bounds.y1()),
            )
        };

        let zoom = if zoom > 0.0 { zoom } else { 1.0 };
        let mut width = (region.width() as f32 * zoom).round() as i32;
        let mut height = (region.height() as f32 * zoom).round() as i32;
        if rotation == 90 || rotation == 270 {
            std::mem::swap(&mut width, &mut height);
        }
        if width <= 0 || height <= 0 {
            return Ok(None);
        }

        let pixel_bytes = if color.is_byte_data() { 1 } else { 4 };
        let len = width as usize * height as usize * pixel_bytes;
        let data = (0..len).map(|i| (i % 251) as u8).collect();

        let id = state.next_buffer;
        state.next_buffer += 1;
        state.outstanding += 1;

        Ok(Some(RawBuffer {
            id,
            data,
            width,
            height,
        }))
    }

    fn release_buffer(&self, _page: PageHandle, _buffer: RawBuffer) {
        let mut state = self.lock_state();
        state.outstanding = state.outstanding.saturating_sub(1);
    }

    fn options_block(&self, page: PageHandle) -> Arc<OptionsBlock> {
        let state = self.lock_state();
        state
            .pages
            .get(&page.0)
            .map_or_else(|| Arc::new(OptionsBlock::new()), |p| Arc::clone(&p.block))
    }
}
