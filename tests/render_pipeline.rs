//! End-to-end rendering flows against the in-memory stub backend.

use std::sync::mpsc;
use std::sync::Once;
use std::time::{Duration, Instant};

use pagegrid::stub::StubBackend;
use pagegrid::{BackendError, ColorMode, PageError, PageRect, PageRenderer};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = simplelog::SimpleLogger::init(
            simplelog::LevelFilter::Debug,
            simplelog::Config::default(),
        );
    });
}

#[test]
fn open_render_display_letter_page() {
    init_logging();
    let backend = StubBackend::new();
    let doc = backend.document(vec![PageRect::new(0.0, 0.0, 612.0, 792.0)]);
    assert_eq!(doc.page_count(), 1);

    let page = doc.page(0).expect("open page");
    let mut renderer = PageRenderer::with_settings(Some(page), 1.0, 0, ColorMode::Rgb);
    renderer.render(true);

    let image = renderer.image().expect("image");
    assert_eq!((image.width(), image.height()), (612, 792));
}

#[test]
fn zoomed_rotated_render_swaps_dimensions() {
    init_logging();
    let backend = StubBackend::new();
    let doc = backend.document(vec![PageRect::new(0.0, 0.0, 612.0, 792.0)]);
    let page = doc.page(0).expect("open page");

    let mut renderer = PageRenderer::with_settings(Some(page), 2.0, 90, ColorMode::Rgb);
    renderer.render(true);

    let image = renderer.image().expect("image");
    assert_eq!((image.width(), image.height()), (1584, 1224));
    assert_eq!(renderer.resolution(), 144.0);
}

#[test]
fn encrypted_documents_fail_distinctly_from_bad_pages() {
    init_logging();
    let backend = StubBackend::new();

    let locked = backend.protected_document(2);
    match locked.page(0) {
        Err(PageError::Backend(BackendError::AuthRequired)) => {}
        other => panic!("expected auth failure, got {other:?}"),
    }

    let doc = backend.document(vec![PageRect::new(0.0, 0.0, 100.0, 100.0)]);
    match doc.page(5) {
        Err(PageError::Backend(BackendError::PageOpen { number: 5, .. })) => {}
        other => panic!("expected page-open failure, got {other:?}"),
    }
    // The document stays usable after a failed page open.
    assert!(doc.page(0).is_ok());
}

#[test]
fn background_render_notifies_through_the_repaint_callback() {
    init_logging();
    let backend = StubBackend::new();
    let doc = backend.document(vec![PageRect::new(0.0, 0.0, 612.0, 792.0)]);
    let page = doc.page(0).expect("open page");

    let mut renderer = PageRenderer::with_settings(Some(page), 1.0, 0, ColorMode::Rgb);
    let (tx, rx) = mpsc::channel();
    renderer.set_repaint_callback(move || {
        let _ = tx.send(());
    });

    renderer.render(false);
    rx.recv_timeout(Duration::from_secs(5)).expect("repaint");

    let deadline = Instant::now() + Duration::from_secs(5);
    while renderer.is_rendering() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(renderer.is_rendered());
    assert!(renderer.image().is_some());
}

#[test]
fn switching_pages_carries_display_settings_over() {
    init_logging();
    let backend = StubBackend::new();
    let doc = backend.document(vec![
        PageRect::new(0.0, 0.0, 612.0, 792.0),
        PageRect::new(0.0, 0.0, 595.0, 842.0),
    ]);

    let first = doc.page(0).expect("open page");
    let mut renderer = PageRenderer::with_settings(Some(first), 2.0, 180, ColorMode::Gray);
    renderer.render(true);

    let second = doc.page(1).expect("open page");
    renderer.set_page(Some(second));
    assert!(!renderer.is_rendered());
    assert_eq!(renderer.zoom(), 2.0);
    assert_eq!(renderer.rotation(), 180);
    assert_eq!(renderer.color_mode(), ColorMode::Gray);

    renderer.render(true);
    let image = renderer.image().expect("image");
    assert_eq!((image.width(), image.height()), (1190, 1684));
}

#[test]
fn every_page_handle_and_buffer_is_returned() {
    init_logging();
    let backend = StubBackend::new();
    let doc = backend.document(vec![
        PageRect::new(0.0, 0.0, 612.0, 792.0),
        PageRect::new(0.0, 0.0, 612.0, 792.0),
    ]);

    {
        let page = doc.page(0).expect("open page");
        let mut renderer = PageRenderer::with_settings(Some(page), 1.0, 0, ColorMode::Rgb);
        renderer.render(true);

        let other = doc.page(1).expect("open page");
        let mut surface = other.pixels().expect("surface");
        surface
            .draw_page(None, 0.0, 0.0, 300.0, 300.0)
            .expect("draw");
    }

    assert_eq!(backend.open_pages(), 0);
    assert_eq!(backend.outstanding_buffers(), 0);
}

#[test]
fn failed_renders_leave_the_renderer_usable() {
    init_logging();
    let backend = StubBackend::new();
    let doc = backend.document(vec![PageRect::new(0.0, 0.0, 612.0, 792.0)]);
    let page = doc.page(0).expect("open page");
    let mut renderer = PageRenderer::with_settings(Some(page), 1.0, 0, ColorMode::Rgb);

    backend.set_fail_renders(true);
    renderer.render(true);
    assert!(renderer.is_rendered());
    assert!(renderer.image().is_none());

    backend.set_fail_renders(false);
    renderer.invalidate();
    renderer.render(true);
    assert!(renderer.image().is_some());
}
