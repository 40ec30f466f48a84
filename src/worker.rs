//! Background render worker
//!
//! One worker owns one thread and a single-slot job queue. Submitting a
//! new job overwrites the slot, so a renderer queued behind a long
//! render is superseded rather than backlogged; the worker always picks
//! up the most recent request. Jobs are held weakly so a dropped
//! renderer never keeps the thread busy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::thread::JoinHandle;

use log::{debug, warn};

use crate::renderer::RendererCore;

struct Slot {
    job: Option<Weak<RendererCore>>,
    shutdown: bool,
}

struct Shared {
    slot: Mutex<Slot>,
    wake: Condvar,
}

/// Single-threaded render executor with a depth-one queue.
pub(crate) struct RenderWorker {
    shared: Arc<Shared>,
    active: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl RenderWorker {
    pub(crate) fn new() -> Self {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot {
                job: None,
                shutdown: false,
            }),
            wake: Condvar::new(),
        });
        let active = Arc::new(AtomicBool::new(true));

        let thread_shared = Arc::clone(&shared);
        let thread_active = Arc::clone(&active);
        let thread = std::thread::Builder::new()
            .name("page-render".into())
            .spawn(move || {
                run_loop(&thread_shared);
                thread_active.store(false, Ordering::SeqCst);
            });

        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("could not spawn render worker: {e}");
                active.store(false, Ordering::SeqCst);
                None
            }
        };

        Self {
            shared,
            active,
            thread,
        }
    }

    /// Queue a render job, replacing any job not yet picked up.
    pub(crate) fn submit(&self, core: &Arc<RendererCore>) {
        let mut slot = self
            .shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.shutdown {
            return;
        }
        if slot.job.is_some() {
            debug!("superseding queued render job");
        }
        slot.job = Some(Arc::downgrade(core));
        drop(slot);
        self.shared.wake.notify_one();
    }

    /// The worker thread is alive and accepting jobs.
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop the thread and wait for it to finish. A job already running
    /// completes; a queued one is dropped.
    pub(crate) fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        {
            let mut slot = self
                .shared
                .slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slot.shutdown = true;
            slot.job = None;
        }
        self.shared.wake.notify_one();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(shared: &Shared) {
    loop {
        let job = {
            let mut slot = shared.slot.lock().unwrap_or_else(PoisonError::into_inner);
            loop {
                if slot.shutdown {
                    return;
                }
                if let Some(job) = slot.job.take() {
                    break job;
                }
                slot = shared
                    .wake
                    .wait(slot)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        // Renderer may be gone or already satisfied by a sync render.
        let Some(core) = job.upgrade() else {
            continue;
        };
        if core.is_rendered() || core.is_rendering() {
            continue;
        }
        core.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use crate::geom::PageRect;
    use crate::options::ColorMode;
    use crate::renderer::PageRenderer;
    use crate::stub::StubBackend;

    fn renderer(backend: &Arc<StubBackend>) -> PageRenderer {
        let doc = backend.document(vec![PageRect::new(0.0, 0.0, 612.0, 792.0)]);
        let page = doc.page(0).expect("open page");
        PageRenderer::with_settings(Some(page), 1.0, 0, ColorMode::Rgb)
    }

    fn wait_for(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(condition(), "worker did not finish in time");
    }

    #[test]
    fn submitted_job_runs_on_the_worker_thread() {
        let backend = StubBackend::new();
        let target = renderer(&backend);

        let worker = RenderWorker::new();
        assert!(worker.is_active());
        worker.submit(target.core());

        wait_for(|| target.is_rendered());
        assert_eq!(backend.render_calls(), 1);
        worker.shutdown();
    }

    #[test]
    fn superseded_job_is_dropped() {
        // The first job blocks the thread long enough for the next two
        // submissions to land in the slot; the middle one must lose.
        let slow_backend = StubBackend::new();
        slow_backend.set_render_delay(Duration::from_millis(300));
        let busy = renderer(&slow_backend);

        let backend_b = StubBackend::new();
        let backend_c = StubBackend::new();
        let superseded = renderer(&backend_b);
        let last = renderer(&backend_c);

        let worker = RenderWorker::new();
        worker.submit(busy.core());
        std::thread::sleep(Duration::from_millis(50));
        worker.submit(superseded.core());
        worker.submit(last.core());

        wait_for(|| busy.is_rendered() && last.is_rendered());
        assert_eq!(backend_b.render_calls(), 0);
        assert!(!superseded.is_rendered());
        assert_eq!(backend_c.render_calls(), 1);
        worker.shutdown();
    }

    #[test]
    fn dropped_renderer_is_skipped() {
        let slow_backend = StubBackend::new();
        slow_backend.set_render_delay(Duration::from_millis(200));
        let busy = renderer(&slow_backend);

        let backend = StubBackend::new();
        let doomed = renderer(&backend);

        let worker = RenderWorker::new();
        worker.submit(busy.core());
        std::thread::sleep(Duration::from_millis(50));
        worker.submit(doomed.core());
        drop(doomed);

        wait_for(|| busy.is_rendered());
        // Give the worker a beat to look at the dead job.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(backend.render_calls(), 0);
        worker.shutdown();
    }

    #[test]
    fn already_rendered_job_is_skipped() {
        let backend = StubBackend::new();
        let mut target = renderer(&backend);
        target.render(true);
        assert_eq!(backend.render_calls(), 1);

        let worker = RenderWorker::new();
        worker.submit(target.core());
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(backend.render_calls(), 1);
        worker.shutdown();
    }

    #[test]
    fn shutdown_stops_accepting_jobs() {
        let backend = StubBackend::new();
        let target = renderer(&backend);

        let worker = RenderWorker::new();
        {
            let mut slot = worker
                .shared
                .slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slot.shutdown = true;
        }
        worker.shared.wake.notify_one();
        wait_for(|| !worker.is_active());

        worker.submit(target.core());
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(backend.render_calls(), 0);
        worker.shutdown();
    }
}
