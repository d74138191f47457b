//! Progress-callback trait for stage and batch events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalyzerConfigBuilder::progress_callback`]. The same
//! callback object is handed to every document of a batch, so it is the one
//! place where a host application observes the whole run: forward the events
//! to a terminal progress bar, a channel, or a log file.
//!
//! # Example
//!
//! ```rust
//! use vhtml::{AnalysisProgressCallback, AnalyzerConfig};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl AnalysisProgressCallback for Counter {
//!     fn on_document_complete(&self, _source: &Path, _html: &Path) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = AnalyzerConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::analyze::Stage;
use std::path::Path;
use std::sync::Arc;

/// Called by the analyzer as documents move through the pipeline.
///
/// Implementations must be `Send + Sync`: batch runs analyse several
/// documents at once on the blocking thread pool, so every method may be
/// called concurrently. All methods default to no-ops.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once before any document of a batch is launched.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called when a document starts analysis.
    fn on_document_start(&self, source: &Path) {
        let _ = source;
    }

    /// Called when a document enters a new pipeline stage.
    fn on_stage(&self, source: &Path, stage: Stage) {
        let _ = (source, stage);
    }

    /// Called when a document's HTML and sidecar are on disk.
    fn on_document_complete(&self, source: &Path, html_path: &Path) {
        let _ = (source, html_path);
    }

    /// Called when a document fails in any stage.
    fn on_document_error(&self, source: &Path, stage: Stage, error: &str) {
        let _ = (source, stage, error);
    }

    /// Called when a document is not launched because the deadline passed.
    fn on_document_skipped(&self, source: &Path) {
        let _ = source;
    }

    /// Called once after every document was attempted or skipped.
    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        let _ = (total_documents, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalyzerConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        stages: Mutex<Vec<Stage>>,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl AnalysisProgressCallback for TrackingCallback {
        fn on_stage(&self, _source: &Path, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_document_complete(&self, _source: &Path, _html: &Path) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_error(&self, _source: &Path, _stage: Stage, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        let p = Path::new("a.pdf");
        cb.on_batch_start(2);
        cb.on_document_start(p);
        cb.on_stage(p, Stage::Rasterizing);
        cb.on_document_complete(p, Path::new("a.html"));
        cb.on_document_error(p, Stage::Extracting, "boom");
        cb.on_document_skipped(p);
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        let p = Path::new("a.pdf");
        tracker.on_stage(p, Stage::Rasterizing);
        tracker.on_stage(p, Stage::Classifying);
        tracker.on_document_complete(p, Path::new("a.html"));
        tracker.on_document_error(p, Stage::Rendering, "disk full");

        assert_eq!(
            *tracker.stages.lock().unwrap(),
            vec![Stage::Rasterizing, Stage::Classifying]
        );
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
        cb.on_document_skipped(Path::new("late.pdf"));
    }
}
