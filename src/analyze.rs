//! Single-document analysis: PDF in, annotated HTML + sidecar out.
//!
//! ```text
//! validate ─▶ rasterize ─▶ classify ─▶ extract ─▶ render ─▶ persist
//!   (input)    (pdfium)    (layout)     (OCR)     (HTML)    (atomic)
//! ```
//!
//! Every page is classified; page 1 provides the document-level layout.
//! Every block is read by the OCR engine; a page with no detected blocks is
//! read as one `content` block covering the whole page.
//!
//! The first stage that fails aborts the document. The error is logged with
//! the stage it happened in, reported to the progress callback, and
//! returned unchanged.

use crate::config::{AnalyzerConfig, LayoutBackend};
use crate::error::{AnalysisError, DocumentError, RenderError};
use crate::output::{Block, BlockKind, DocType, DocumentMetadata, LayoutKind, Rect};
use crate::pipeline::html::DocumentRenderer;
use crate::pipeline::layout::{LayoutClassifier, LayoutRegion, PageLayout, RuleBasedClassifier};
use crate::pipeline::ocr::{self, OcrEngine, TextRegionExtractor};
use crate::pipeline::rasterize::{PageRasterizer, PdfiumRasterizer};
use crate::pipeline::{input, language};
use crate::progress::ProgressCallback;
use image::DynamicImage;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span};

/// Pipeline stage a document is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Rasterizing,
    Classifying,
    Extracting,
    Rendering,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Rasterizing => "rasterizing",
            Stage::Classifying => "classifying",
            Stage::Extracting => "extracting",
            Stage::Rendering => "rendering",
            Stage::Done => "done",
        })
    }
}

/// Tracks the current stage of one run and forwards it to the callback.
struct StageTracker<'a> {
    source: &'a Path,
    callback: Option<&'a ProgressCallback>,
    stage: Stage,
}

impl<'a> StageTracker<'a> {
    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        debug!("Stage: {}", stage);
        if let Some(cb) = self.callback {
            cb.on_stage(self.source, stage);
        }
    }
}

// A backend that panics unwinds past `analyze`; report it here so callbacks
// still see exactly one terminal event per document.
impl Drop for StageTracker<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("{} panicked while {}", self.source.display(), self.stage);
            if let Some(cb) = self.callback {
                cb.on_document_error(self.source, self.stage, "analysis panicked");
            }
        }
    }
}

/// Analyses one PDF at a time with a fixed set of backends.
pub struct DocumentAnalyzer {
    config: AnalyzerConfig,
    rasterizer: Arc<dyn PageRasterizer>,
    classifier: Arc<dyn LayoutClassifier>,
    extractor: TextRegionExtractor,
    renderer: DocumentRenderer,
}

impl fmt::Debug for DocumentAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentAnalyzer")
            .field("config", &self.config)
            .field("classifier", &self.classifier.name())
            .finish_non_exhaustive()
    }
}

impl DocumentAnalyzer {
    /// Build the analyzer with the backends named in `config`.
    pub fn new(config: AnalyzerConfig) -> Result<Self, AnalysisError> {
        let rasterizer: Arc<dyn PageRasterizer> = Arc::new(PdfiumRasterizer::new(&config));
        let classifier = classifier_for(&config)?;
        let engine = ocr::engine_for(&config.ocr_backend);
        Ok(Self::with_components(config, rasterizer, classifier, engine))
    }

    /// Build the analyzer around explicit backends.
    pub fn with_components(
        config: AnalyzerConfig,
        rasterizer: Arc<dyn PageRasterizer>,
        classifier: Arc<dyn LayoutClassifier>,
        engine: Arc<dyn OcrEngine>,
    ) -> Self {
        let extractor =
            TextRegionExtractor::new(engine, config.languages.clone(), config.min_language_score);
        let renderer = DocumentRenderer::new(config.image_embedding);
        Self {
            config,
            rasterizer,
            classifier,
            extractor,
            renderer,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyse `pdf` and write `<stem>.html`, `<stem>_metadata.json` and
    /// the page images into `output_dir`. Returns the HTML path.
    pub fn analyze(
        &self,
        pdf: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> Result<PathBuf, AnalysisError> {
        let (pdf, output_dir) = (pdf.as_ref(), output_dir.as_ref());
        let stem = input::document_stem(pdf);
        let span = info_span!("analyze", document = %stem);
        let _guard = span.enter();

        let callback = self.config.progress_callback.as_ref();
        if let Some(cb) = callback {
            cb.on_document_start(pdf);
        }
        let mut tracker = StageTracker {
            source: pdf,
            callback,
            stage: Stage::Rasterizing,
        };

        let start = Instant::now();
        match self.run(pdf, output_dir, &stem, &mut tracker) {
            Ok(html_path) => {
                tracker.enter(Stage::Done);
                info!(
                    "Analysed {} → {} in {}ms",
                    pdf.display(),
                    html_path.display(),
                    start.elapsed().as_millis()
                );
                if let Some(cb) = callback {
                    cb.on_document_complete(pdf, &html_path);
                }
                Ok(html_path)
            }
            Err(e) => {
                error!("{} failed while {}: {}", pdf.display(), tracker.stage, e);
                if let Some(cb) = callback {
                    cb.on_document_error(pdf, tracker.stage, &e.to_string());
                }
                Err(e)
            }
        }
    }

    fn run(
        &self,
        pdf: &Path,
        output_dir: &Path,
        stem: &str,
        tracker: &mut StageTracker<'_>,
    ) -> Result<PathBuf, AnalysisError> {
        // ── Step 1: Rasterise ────────────────────────────────────────────
        tracker.enter(Stage::Rasterizing);
        input::validate_pdf(pdf)?;
        let images = self.rasterizer.rasterize(pdf)?;
        if images.is_empty() {
            return Err(DocumentError::NoPages {
                path: pdf.to_path_buf(),
            }
            .into());
        }
        info!("Rasterised {} pages", images.len());

        // ── Step 2: Classify every page ──────────────────────────────────
        tracker.enter(Stage::Classifying);
        let layouts = images
            .iter()
            .map(|img| self.classifier.analyze(img))
            .collect::<Result<Vec<PageLayout>, _>>()?;
        let layout = layouts
            .first()
            .map(|l| l.kind.clone())
            .unwrap_or(LayoutKind::Generic);

        // ── Step 3: OCR every block ──────────────────────────────────────
        tracker.enter(Stage::Extracting);
        let mut blocks = Vec::new();
        for (idx, (image, page_layout)) in images.iter().zip(&layouts).enumerate() {
            blocks.extend(self.extract_page(idx + 1, image, page_layout)?);
        }
        let mut metadata = DocumentMetadata::assemble(DocType::Generic, layout, blocks);
        metadata.doc_type = language::infer_doc_type(&metadata.full_text());
        info!(
            "{} blocks, type {}, language {}, confidence {:.2}",
            metadata.blocks.len(),
            metadata.doc_type,
            metadata.language,
            metadata.confidence
        );

        // ── Step 4: Render and persist ───────────────────────────────────
        tracker.enter(Stage::Rendering);
        std::fs::create_dir_all(output_dir).map_err(|source| RenderError::WriteFailed {
            path: output_dir.to_path_buf(),
            source,
        })?;
        let html = self.renderer.render(&metadata, &images, stem);
        self.renderer.write_page_images(&images, output_dir)?;
        drop(images);
        if self.config.write_viewer_script {
            self.renderer.write_viewer_script(output_dir)?;
        }
        let html_path = output_dir.join(format!("{stem}.html"));
        Ok(self.renderer.persist(&html, &metadata, &html_path)?)
    }

    fn extract_page(
        &self,
        page: usize,
        image: &DynamicImage,
        layout: &PageLayout,
    ) -> Result<Vec<Block>, AnalysisError> {
        let whole_page;
        let regions: &[LayoutRegion] = if layout.regions.is_empty() {
            debug!("Page {}: no regions, reading whole page", page);
            whole_page = [LayoutRegion::new(
                BlockKind::Content,
                Rect::full(image.width(), image.height()),
            )];
            &whole_page
        } else {
            &layout.regions
        };

        let mut blocks = Vec::with_capacity(regions.len());
        for (i, region) in regions.iter().enumerate() {
            let text = self.extractor.extract(image, Some(&region.rect))?;
            blocks.push(Block {
                id: Block::block_id(page, i + 1),
                kind: region.kind.clone(),
                page,
                position: region.rect,
                content: text.text,
                language: text.language,
                confidence: text.confidence,
                formatting: region.formatting.clone(),
            });
        }
        Ok(blocks)
    }
}

/// Layout classifier for `config.layout_backend`.
fn classifier_for(config: &AnalyzerConfig) -> Result<Arc<dyn LayoutClassifier>, AnalysisError> {
    let rule_based = RuleBasedClassifier::new(config.layout);
    match &config.layout_backend {
        LayoutBackend::RuleBased => Ok(Arc::new(rule_based)),
        #[cfg(feature = "vision-layout")]
        LayoutBackend::Vision { provider, model } => {
            use crate::pipeline::vision::VisionLayoutClassifier;
            match VisionLayoutClassifier::from_config(
                provider.as_deref(),
                model.as_deref(),
                rule_based.clone(),
            ) {
                Ok(vision) => Ok(Arc::new(vision)),
                Err(e) => {
                    tracing::warn!("{}; using rule-based layout", e);
                    Ok(Arc::new(rule_based))
                }
            }
        }
        #[cfg(not(feature = "vision-layout"))]
        LayoutBackend::Vision { .. } => Err(AnalysisError::InvalidConfig(
            "vision layout requires the `vision-layout` feature".into(),
        )),
    }
}
