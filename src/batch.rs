//! Directory fan-out with per-document failure isolation.
//!
//! Every `.pdf` in the input directory is analysed into its own
//! `<output_dir>/<stem>/` sub-directory on tokio's blocking pool, at most
//! `workers` at a time. A document that fails or panics becomes an
//! `error` entry; the others carry on. Once `batch_deadline` has passed no
//! new document is launched and the rest are reported as `skipped`.
//!
//! Two inputs with the same stem (`a.pdf` and `a.PDF`) share an output
//! directory; the last one to finish wins.
//!
//! pdfium is bound behind a process-wide lock, so rasterisation itself runs
//! one document at a time; only layout classification and OCR overlap across
//! workers.

use crate::analyze::DocumentAnalyzer;
use crate::config::AnalyzerConfig;
use crate::error::AnalysisError;
use crate::output::{BatchReport, DocumentStatus};
use crate::pipeline::input;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Runs a [`DocumentAnalyzer`] over every PDF in a directory.
///
/// Up to `workers` documents are in flight at once, but page rasterisation
/// is serialised by pdfium; only layout and OCR work overlaps.
#[derive(Debug, Clone)]
pub struct BatchAnalyzer {
    analyzer: Arc<DocumentAnalyzer>,
}

impl BatchAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self, AnalysisError> {
        Ok(Self::from_analyzer(Arc::new(DocumentAnalyzer::new(config)?)))
    }

    pub fn from_analyzer(analyzer: Arc<DocumentAnalyzer>) -> Self {
        Self { analyzer }
    }

    /// Analyse every PDF in `input_dir` into `output_dir/<stem>/`.
    ///
    /// # Errors
    /// Only when `input_dir` cannot be listed. Per-document failures are
    /// entries of the returned report.
    pub async fn batch_analyze(
        &self,
        input_dir: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> Result<BatchReport, AnalysisError> {
        let (input_dir, output_dir) = (input_dir.as_ref(), output_dir.as_ref());
        let pdfs = input::list_pdfs(input_dir).map_err(|source| AnalysisError::InputDirUnreadable {
            path: input_dir.to_path_buf(),
            source,
        })?;

        let config = self.analyzer.config();
        let callback = config.progress_callback.clone();
        let deadline = config.batch_deadline;
        let workers = config.workers.max(1);
        let total = pdfs.len();
        info!(
            "Batch: {} documents from {} with {} workers",
            total,
            input_dir.display(),
            workers
        );
        if let Some(ref cb) = callback {
            cb.on_batch_start(total);
        }

        let started = Instant::now();
        let mut results: Vec<(usize, PathBuf, DocumentStatus)> =
            stream::iter(pdfs.into_iter().enumerate().map(|(idx, pdf)| {
                let analyzer = Arc::clone(&self.analyzer);
                let callback = callback.clone();
                let doc_out = output_dir.join(input::document_stem(&pdf));
                async move {
                    // Checked when the stream launches this future, not when it is built.
                    if deadline.is_some_and(|d| started.elapsed() >= d) {
                        warn!("Deadline passed, skipping {}", pdf.display());
                        if let Some(cb) = &callback {
                            cb.on_document_skipped(&pdf);
                        }
                        return (idx, pdf, DocumentStatus::Skipped);
                    }

                    let source = pdf.clone();
                    let status =
                        match tokio::task::spawn_blocking(move || analyzer.analyze(&source, &doc_out)).await {
                            Ok(Ok(html_path)) => DocumentStatus::Success { html_path },
                            Ok(Err(e)) => DocumentStatus::Error {
                                error: e.to_string(),
                            },
                            // The analyzer already reported the panic to the callback
                            // while unwinding, with the stage it happened in.
                            Err(join) => {
                                warn!("Analysis of {} panicked: {}", pdf.display(), join);
                                DocumentStatus::Error {
                                    error: format!("analysis panicked: {join}"),
                                }
                            }
                        };
                    (idx, pdf, status)
                }
            }))
            .buffer_unordered(workers)
            .collect()
            .await;

        results.sort_by_key(|(idx, _, _)| *idx);
        let mut report = BatchReport::new();
        for (_, pdf, status) in results {
            report.insert(pdf, status);
        }

        info!(
            "Batch done: {} ok, {} failed, {} skipped",
            report.success_count(),
            report.error_count(),
            report.skipped_count()
        );
        if let Some(ref cb) = callback {
            cb.on_batch_complete(total, report.success_count());
        }
        Ok(report)
    }

    /// Synchronous wrapper around [`BatchAnalyzer::batch_analyze`].
    ///
    /// Creates a temporary tokio runtime internally.
    pub fn batch_analyze_sync(
        &self,
        input_dir: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> Result<BatchReport, AnalysisError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| AnalysisError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.batch_analyze(input_dir, output_dir))
    }
}
