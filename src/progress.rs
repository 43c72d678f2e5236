//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! liveness events between page iterations.
//!
//! The pipeline is single-threaded, so events arrive strictly in order:
//! `on_run_start` once, `on_page_complete` once per page with a
//! `pages_done` value that grows by one each time and ends at
//! `pages_total`, then `on_run_complete` once.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2xml::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ExtractionProgressCallback for Printer {
//!     fn on_page_complete(&self, pages_done: usize, pages_total: usize) {
//!         eprintln!("Processing pages: {pages_done}/{pages_total}");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the page pipeline as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `Send + Sync` is required because the async entry
/// point moves the configuration onto tokio's blocking pool.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once, after the page range is resolved and before page 1 of it.
    ///
    /// # Arguments
    /// * `pages_total`: pages in the clamped range (may be 0)
    fn on_run_start(&self, pages_total: usize) {
        let _ = pages_total;
    }

    /// Called after each page's record has been appended.
    ///
    /// # Arguments
    /// * `pages_done` : pages finished so far (1-based count)
    /// * `pages_total`: `end - start + 1`
    fn on_page_complete(&self, pages_done: usize, pages_total: usize) {
        let _ = (pages_done, pages_total);
    }

    /// Called once after the last page, before outputs are finalised.
    fn on_run_complete(&self, pages_done: usize) {
        let _ = pages_done;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
