//! Page renderer state machine
//!
//! A [`PageRenderer`] wraps a pixel surface, a cropping rectangle and a
//! lazily created background worker. It is always in exactly one of
//! three states: idle (neither flag set), rendering, or rendered. Every
//! parameter setter is a silent no-op while a render is in flight; the
//! render step always reaches the rendered state, even on failure, so
//! callers polling the flags never hang.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use image::DynamicImage;
use log::error;

use crate::document::Page;
use crate::geom::PageRect;
use crate::options::{ColorMode, ROTATE_AUTO};
use crate::surface::PixelSurface;
use crate::worker::RenderWorker;

type RepaintFn = Arc<dyn Fn() + Send + Sync>;

/// Shared state between a renderer and its worker thread.
pub(crate) struct RendererCore {
    surface: Mutex<Option<PixelSurface>>,
    crop: Mutex<PageRect>,
    rendering: AtomicBool,
    rendered: AtomicBool,
    repaint: Mutex<Option<RepaintFn>>,
}

impl RendererCore {
    fn new() -> Self {
        Self {
            surface: Mutex::new(None),
            crop: Mutex::new(PageRect::default()),
            rendering: AtomicBool::new(false),
            rendered: AtomicBool::new(false),
            repaint: Mutex::new(None),
        }
    }

    pub(crate) fn is_rendering(&self) -> bool {
        self.rendering.load(Ordering::SeqCst)
    }

    pub(crate) fn is_rendered(&self) -> bool {
        self.rendered.load(Ordering::SeqCst)
    }

    /// Execute one render job in the calling thread.
    ///
    /// Failures are logged and swallowed; the flags still move to
    /// rendered so the state machine can never wedge in rendering.
    pub(crate) fn run(&self) {
        if self.is_rendering() || self.is_rendered() {
            return;
        }

        self.rendering.store(true, Ordering::SeqCst);
        self.rendered.store(false, Ordering::SeqCst);

        let crop = *self.crop.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut guard = self.surface.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(surface) = guard.as_mut() {
                match surface.draw_page(None, crop.x0(), crop.y0(), crop.x1(), crop.y1()) {
                    Ok(()) => {
                        let actual = surface
                            .options()
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .bound_box();
                        *self.crop.lock().unwrap_or_else(PoisonError::into_inner) = actual;
                    }
                    Err(e) => error!("page render failed: {e}"),
                }
            }
        }

        // Flag order matters for pollers: rendering clears first.
        self.rendering.store(false, Ordering::SeqCst);
        self.rendered.store(true, Ordering::SeqCst);

        // Invoke outside the lock; the callback may re-register or
        // clear itself through a shared renderer handle.
        let repaint = self
            .repaint
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = repaint {
            callback();
        }
    }
}

/// Renders a page synchronously or in a reusable background worker.
pub struct PageRenderer {
    core: Arc<RendererCore>,
    worker: Option<RenderWorker>,
}

impl PageRenderer {
    /// Renderer with default settings and no page.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(None, 1.0, ROTATE_AUTO, ColorMode::Rgb)
    }

    /// Renderer with an optional initial page and display settings.
    #[must_use]
    pub fn with_settings(
        page: Option<Arc<Page>>,
        zoom: f32,
        rotation: i32,
        color: ColorMode,
    ) -> Self {
        let mut renderer = Self {
            core: Arc::new(RendererCore::new()),
            worker: None,
        };
        renderer.set_page(page);
        renderer.set_zoom(zoom);
        renderer.set_rotation(rotation);
        renderer.set_color_mode(color);
        renderer.set_gamma(1.0);
        renderer
    }

    pub(crate) fn core(&self) -> &Arc<RendererCore> {
        &self.core
    }

    #[must_use]
    pub fn is_rendering(&self) -> bool {
        self.core.is_rendering()
    }

    #[must_use]
    pub fn is_rendered(&self) -> bool {
        self.core.is_rendered()
    }

    /// Force the next render to run even if no parameter changed.
    pub fn invalidate(&self) {
        self.core.rendered.store(false, Ordering::SeqCst);
    }

    /// Replace the page to render, carrying the current display
    /// settings over to the new page's options. No-op mid-render.
    pub fn set_page(&mut self, page: Option<Arc<Page>>) {
        if self.is_rendering() {
            return;
        }

        let (anti_alias, color, gamma, rotation, zoom) = (
            self.anti_alias_level(),
            self.color_mode(),
            self.gamma(),
            self.rotation(),
            self.zoom(),
        );

        {
            let mut guard = self
                .core
                .surface
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(old) = guard.as_mut() {
                old.dispose();
            }
            *guard = page.as_ref().and_then(Page::pixels);
            if let Some(surface) = guard.as_ref() {
                let options = surface.options();
                let mut options = options.lock().unwrap_or_else(PoisonError::into_inner);
                options.set_anti_alias(anti_alias);
                options.set_color_mode(color);
                options.set_gamma(gamma);
                options.set_rotation(rotation);
                options.set_zoom(zoom);
            }
        }

        match page {
            Some(page) => {
                self.set_cropping_area_size(page.x(), page.y(), page.width(), page.height());
            }
            None => self.set_cropping_area_size(0, 0, 0, 0),
        }
        self.invalidate();
    }

    /// Set the cropping region in upright page coordinates at zoom 1.
    pub fn set_cropping_area(&mut self, x0: f32, y0: f32, x1: f32, y1: f32) {
        if self.is_rendering() {
            return;
        }
        self.core
            .crop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_points(x0, y0, x1, y1);
        self.invalidate();
    }

    /// Set the cropping region from an origin and dimensions.
    pub fn set_cropping_area_size(&mut self, x: i32, y: i32, w: i32, h: i32) {
        self.set_cropping_area(x as f32, y as f32, (x + w) as f32, (y + h) as f32);
    }

    /// Register a callback invoked after each completed render,
    /// including asynchronous ones. No-op mid-render.
    pub fn set_repaint_callback<F: Fn() + Send + Sync + 'static>(&mut self, callback: F) {
        if self.is_rendering() {
            return;
        }
        *self
            .core
            .repaint
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    pub fn clear_repaint_callback(&mut self) {
        if self.is_rendering() {
            return;
        }
        *self
            .core
            .repaint
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    #[must_use]
    pub fn zoom(&self) -> f32 {
        self.with_options(1.0, |o| o.zoom())
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        if self.zoom() == zoom || self.is_rendering() {
            return;
        }
        self.update_options(|o| o.set_zoom(zoom));
    }

    #[must_use]
    pub fn rotation(&self) -> i32 {
        self.with_options(0, |o| o.rotation())
    }

    pub fn set_rotation(&mut self, rotation: i32) {
        if self.rotation() == rotation || self.is_rendering() {
            return;
        }
        self.update_options(|o| o.set_rotation(rotation));
    }

    #[must_use]
    pub fn color_mode(&self) -> ColorMode {
        self.with_options(ColorMode::Rgb, |o| o.color_mode())
    }

    pub fn set_color_mode(&mut self, color: ColorMode) {
        if self.color_mode() == color || self.is_rendering() {
            return;
        }
        self.update_options(|o| o.set_color_mode(color));
    }

    #[must_use]
    pub fn gamma(&self) -> f32 {
        self.with_options(1.0, |o| o.gamma())
    }

    pub fn set_gamma(&mut self, gamma: f32) {
        if self.gamma() == gamma || self.is_rendering() {
            return;
        }
        self.update_options(|o| o.set_gamma(gamma));
    }

    #[must_use]
    pub fn anti_alias_level(&self) -> i32 {
        self.with_options(0, |o| o.anti_alias())
    }

    pub fn set_anti_alias_level(&mut self, level: i32) {
        if self.anti_alias_level() == level || self.is_rendering() {
            return;
        }
        self.update_options(|o| o.set_anti_alias(level));
    }

    /// Effective resolution in DPI, 0 without a page.
    #[must_use]
    pub fn resolution(&self) -> f32 {
        self.with_options(0.0, |o| o.resolution())
    }

    #[must_use]
    pub fn x(&self) -> i32 {
        self.crop().x()
    }

    #[must_use]
    pub fn y(&self) -> i32 {
        self.crop().y()
    }

    #[must_use]
    pub fn width(&self) -> i32 {
        self.crop().width()
    }

    #[must_use]
    pub fn height(&self) -> i32 {
        self.crop().height()
    }

    #[must_use]
    pub fn x0(&self) -> f32 {
        self.crop().x0()
    }

    #[must_use]
    pub fn y0(&self) -> f32 {
        self.crop().y0()
    }

    #[must_use]
    pub fn x1(&self) -> f32 {
        self.crop().x1()
    }

    #[must_use]
    pub fn y1(&self) -> f32 {
        self.crop().y1()
    }

    /// The page currently attached, if any.
    #[must_use]
    pub fn page(&self) -> Option<Arc<Page>> {
        let guard = self
            .core
            .surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(|s| Arc::clone(s.page()))
    }

    /// Rendered image, available only in the rendered state.
    #[must_use]
    pub fn image(&self) -> Option<Arc<DynamicImage>> {
        if !self.is_rendered() || self.is_rendering() {
            return None;
        }
        let mut guard = self
            .core
            .surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.as_mut().and_then(PixelSurface::image)
    }

    /// Render the current page.
    ///
    /// With `wait` the job runs in the calling thread. Without it the
    /// job is handed to a reusable single worker thread and this call
    /// returns immediately; poll [`Self::is_rendered`] or register a
    /// repaint callback. A renderer already in the rendered state does
    /// not render again until a parameter changes or
    /// [`Self::invalidate`] is called.
    pub fn render(&mut self, wait: bool) {
        if self.is_rendering() {
            return;
        }
        if wait {
            self.core.run();
        } else {
            if self.worker.as_ref().is_none_or(|w| !w.is_active()) {
                self.worker = Some(RenderWorker::new());
            }
            if let Some(worker) = &self.worker {
                worker.submit(&self.core);
            }
        }
    }

    /// Shut down the worker and drop rendered state. The renderer is
    /// reusable afterwards.
    pub fn dispose(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
        {
            let mut guard = self
                .core
                .surface
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(surface) = guard.as_mut() {
                surface.dispose();
            }
            *guard = None;
        }
        self.core.rendering.store(false, Ordering::SeqCst);
        self.core.rendered.store(false, Ordering::SeqCst);
    }

    fn crop(&self) -> PageRect {
        *self.core.crop.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_options<T>(
        &self,
        default: T,
        f: impl FnOnce(&crate::options::RenderOptions) -> T,
    ) -> T {
        let guard = self
            .core
            .surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(surface) => {
                let options = surface.options();
                let options = options.lock().unwrap_or_else(PoisonError::into_inner);
                f(&options)
            }
            None => default,
        }
    }

    fn update_options(&mut self, f: impl FnOnce(&mut crate::options::RenderOptions)) {
        {
            let guard = self
                .core
                .surface
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(surface) = guard.as_ref() {
                let options = surface.options();
                let mut options = options.lock().unwrap_or_else(PoisonError::into_inner);
                f(&mut options);
            }
        }
        self.invalidate();
    }
}

impl Default for PageRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PageRenderer {
    fn drop(&mut self) {
        self.dispose();
    }
}
