//! Error taxonomy
//!
//! Configuration problems never surface here; they are reported through
//! `RenderOptions::is_valid` plus a logged message. Resource exhaustion
//! is recovered locally and shows up as an absent result. Only backend
//! faults become real errors.

/// Faults reported by the rendering backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The document is encrypted and needs credentials before any page
    /// can be opened.
    #[error("document requires authentication")]
    AuthRequired,

    /// The page could not be created (bad index, damaged page, ...).
    #[error("could not open page {number}: {detail}")]
    PageOpen { number: i32, detail: String },

    /// The backend failed while drawing a region.
    #[error("render failed: {detail}")]
    Render { detail: String },
}

/// Errors from page-level operations.
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The page handle was already released.
    #[error("page handle already closed")]
    PageClosed,
}
