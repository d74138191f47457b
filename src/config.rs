//! Configuration types for document analysis and batch runs.
//!
//! All pipeline behaviour is controlled through [`AnalyzerConfig`], built via
//! its [`AnalyzerConfigBuilder`]. One struct for every knob makes it trivial
//! to share a config across the batch worker pool and to log exactly what a
//! run used.
//!
//! Backend selection happens here and only here: [`OcrBackend`] and
//! [`LayoutBackend`] are read once by
//! [`crate::analyze::DocumentAnalyzer::new`] to construct the engine and the
//! classifier. Nothing downstream inspects concrete types.

use crate::error::AnalysisError;
use crate::output::Language;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for document analysis.
///
/// # Example
/// ```rust
/// use vhtml::AnalyzerConfig;
///
/// let config = AnalyzerConfig::builder()
///     .dpi(200)
///     .workers(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct AnalyzerConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–400. Default: 150.
    ///
    /// OCR accuracy drops sharply below ~120 DPI on body text; above 300 the
    /// engine gets slower without reading noticeably better.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2500.
    pub max_rendered_pixels: u32,

    /// Directory containing the pdfium shared library. `None` tries the
    /// current directory, then the system library path.
    pub pdfium_dir: Option<PathBuf>,

    /// Languages the OCR engine recognises and the detector may report.
    /// Default: Polish, English, German.
    pub languages: Vec<Language>,

    /// Minimum detection score a language needs before it is reported
    /// instead of `unknown`. Range 0–1. Default: 0.15.
    pub min_language_score: f32,

    /// Which OCR engine reads block text.
    pub ocr_backend: OcrBackend,

    /// Which layout classifier segments pages.
    pub layout_backend: LayoutBackend,

    /// Tuning for the rule-based layout classifier.
    pub layout: LayoutTuning,

    /// Whether page images are written next to the HTML or inlined.
    pub image_embedding: ImageEmbedding,

    /// Write `viewer.js` (overlay toggling, confidence highlighting) next
    /// to the HTML so packaging picks it up. Default: true.
    pub write_viewer_script: bool,

    /// Maximum documents analysed at the same time in a batch. Default: 4.
    pub workers: usize,

    /// Stop launching new documents once this much time has passed since the
    /// batch started. Unlaunched documents are reported as `skipped`.
    pub batch_deadline: Option<Duration>,

    /// Optional progress callback for stage and batch events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2500,
            pdfium_dir: None,
            languages: Language::ALL.to_vec(),
            min_language_score: 0.15,
            ocr_backend: OcrBackend::default(),
            layout_backend: LayoutBackend::default(),
            layout: LayoutTuning::default(),
            image_embedding: ImageEmbedding::default(),
            write_viewer_script: true,
            workers: 4,
            batch_deadline: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalyzerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pdfium_dir", &self.pdfium_dir)
            .field("languages", &self.languages)
            .field("min_language_score", &self.min_language_score)
            .field("ocr_backend", &self.ocr_backend)
            .field("layout_backend", &self.layout_backend)
            .field("layout", &self.layout)
            .field("image_embedding", &self.image_embedding)
            .field("write_viewer_script", &self.write_viewer_script)
            .field("workers", &self.workers)
            .field("batch_deadline", &self.batch_deadline)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn AnalysisProgressCallback>"),
            )
            .finish()
    }
}

impl AnalyzerConfig {
    /// Create a new builder for `AnalyzerConfig`.
    pub fn builder() -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalyzerConfig`].
#[derive(Debug)]
pub struct AnalyzerConfigBuilder {
    config: AnalyzerConfig,
}

impl AnalyzerConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pdfium_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_dir = Some(dir.into());
        self
    }

    pub fn languages(mut self, languages: impl IntoIterator<Item = Language>) -> Self {
        let mut langs: Vec<Language> = Vec::new();
        for lang in languages {
            if lang != Language::Unknown && !langs.contains(&lang) {
                langs.push(lang);
            }
        }
        self.config.languages = langs;
        self
    }

    pub fn min_language_score(mut self, score: f32) -> Self {
        self.config.min_language_score = score.clamp(0.0, 1.0);
        self
    }

    pub fn ocr_backend(mut self, backend: OcrBackend) -> Self {
        self.config.ocr_backend = backend;
        self
    }

    pub fn layout_backend(mut self, backend: LayoutBackend) -> Self {
        self.config.layout_backend = backend;
        self
    }

    pub fn layout_tuning(mut self, tuning: LayoutTuning) -> Self {
        self.config.layout = tuning;
        self
    }

    pub fn image_embedding(mut self, mode: ImageEmbedding) -> Self {
        self.config.image_embedding = mode;
        self
    }

    pub fn write_viewer_script(mut self, v: bool) -> Self {
        self.config.write_viewer_script = v;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn batch_deadline(mut self, deadline: Duration) -> Self {
        self.config.batch_deadline = Some(deadline);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalyzerConfig, AnalysisError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(AnalysisError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.languages.is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "At least one OCR language is required".into(),
            ));
        }
        if c.workers == 0 {
            return Err(AnalysisError::InvalidConfig("Workers must be ≥ 1".into()));
        }
        c.layout.validate()?;
        Ok(self.config)
    }
}

// ── Backends ─────────────────────────────────────────────────────────────

/// OCR engine selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OcrBackend {
    /// The `tesseract` command-line engine.
    Tesseract {
        /// Binary to run. Default: `tesseract` from `PATH`.
        binary: PathBuf,
        /// Page segmentation mode passed as `--psm`. Default: 6 (uniform block).
        psm: u8,
    },
}

impl Default for OcrBackend {
    fn default() -> Self {
        OcrBackend::Tesseract {
            binary: PathBuf::from("tesseract"),
            psm: 6,
        }
    }
}

/// Layout classifier selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum LayoutBackend {
    /// Whitespace-projection heuristics. Always available. (default)
    #[default]
    RuleBased,
    /// Vision Language Model via `edgequake-llm`. Requires the
    /// `vision-layout` feature; falls back to rule-based on failure.
    Vision {
        /// Provider name (`openai`, `anthropic`, …). `None` auto-detects.
        provider: Option<String>,
        /// Model identifier. `None` uses `gpt-4.1-nano`.
        model: Option<String>,
    },
}

/// How page images are referenced from the rendered HTML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageEmbedding {
    /// Write `page_<n>.png` next to the HTML and link it. (default)
    ///
    /// Packaging inlines the files later, so this keeps the intermediate
    /// HTML small and the archive directory inspectable.
    #[default]
    Linked,
    /// Inline every page as a `data:image/png;base64,` URI.
    Inline,
}

/// Thresholds for [`crate::pipeline::layout::RuleBasedClassifier`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutTuning {
    /// Luminance below which a pixel counts as ink. Default: 128.
    pub ink_threshold: u8,
    /// Minimum vertical whitespace (fraction of page height) that separates
    /// two bands. Never less than 6 px. Default: 0.015.
    pub band_gap_fraction: f32,
    /// Minimum horizontal whitespace (fraction of page width) that separates
    /// two column segments. Never less than 8 px. Default: 0.03.
    pub column_gap_fraction: f32,
    /// Share of the band width a row must cover to count as a ruling line.
    /// Default: 0.5.
    pub ruling_coverage: f32,
    /// First band ending above this fraction of the height is a header. Default: 0.2.
    pub header_zone: f32,
    /// Last band starting below this fraction of the height is a footer. Default: 0.85.
    pub footer_zone: f32,
    /// Height/width ratio from which a page is treated as a receipt. Default: 2.2.
    pub receipt_aspect: f32,
    /// Ink density from which a block is flagged bold. Default: 0.3.
    pub bold_density: f32,
}

impl Default for LayoutTuning {
    fn default() -> Self {
        Self {
            ink_threshold: 128,
            band_gap_fraction: 0.015,
            column_gap_fraction: 0.03,
            ruling_coverage: 0.5,
            header_zone: 0.2,
            footer_zone: 0.85,
            receipt_aspect: 2.2,
            bold_density: 0.3,
        }
    }
}

impl LayoutTuning {
    fn validate(&self) -> Result<(), AnalysisError> {
        let fractions = [
            ("band_gap_fraction", self.band_gap_fraction),
            ("column_gap_fraction", self.column_gap_fraction),
            ("ruling_coverage", self.ruling_coverage),
            ("header_zone", self.header_zone),
            ("footer_zone", self.footer_zone),
            ("bold_density", self.bold_density),
        ];
        for (name, v) in fractions {
            if !(0.0..=1.0).contains(&v) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "{name} must be within 0–1, got {v}"
                )));
            }
        }
        if self.header_zone >= self.footer_zone {
            return Err(AnalysisError::InvalidConfig(
                "header_zone must be above footer_zone".into(),
            ));
        }
        Ok(())
    }
}
