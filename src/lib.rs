//! # vhtml
//!
//! Turn scanned or rendered PDF documents into annotated, self-contained
//! web artefacts.
//!
//! Each page is rasterised, segmented into typed blocks (header, table,
//! content, footer), and every block is read by an OCR engine that
//! recognises Polish, English and German at once. The result is an HTML
//! page that overlays the recognised text, language and confidence on the
//! page images, plus a JSON metadata sidecar. A rendered directory can then
//! be packaged as a single-file MHTML archive or a standalone HTML file.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Validate   existence, permissions, %PDF magic
//!  ├─ 2. Rasterise  every page via pdfium at the configured DPI
//!  ├─ 3. Classify   blocks + page layout (rule-based or VLM)
//!  ├─ 4. Extract    OCR per block, language detection, confidence
//!  ├─ 5. Render     HTML with <!--DATA--> / <!--SCRIPT--> placeholders
//!  └─ 6. Persist    <stem>.html + <stem>_metadata.json + page_<n>.png
//!
//! directory ──▶ generate_archive / generate_standalone
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vhtml::{generate_archive, AnalyzerConfig, DocumentAnalyzer};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let analyzer = DocumentAnalyzer::new(AnalyzerConfig::default())?;
//!     let html = analyzer.analyze("invoice.pdf", "out/invoice")?;
//!     println!("wrote {}", html.display());
//!
//!     let outcome = generate_archive("out/invoice", "out/invoice.mhtml");
//!     assert!(outcome.succeeded());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `vhtml` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `vision-layout` | off | VLM-backed layout classification via `edgequake-llm` |
//!
//! ## External tools
//!
//! Rasterisation needs the pdfium shared library (see
//! [`AnalyzerConfig::pdfium_dir`]); OCR needs the `tesseract` binary with the
//! `pol`, `eng` and `deu` traineddata installed.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod archive;
pub mod batch;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{DocumentAnalyzer, Stage};
pub use archive::{generate_archive, generate_standalone, PackageOutcome};
pub use batch::BatchAnalyzer;
pub use config::{
    AnalyzerConfig, AnalyzerConfigBuilder, ImageEmbedding, LayoutBackend, LayoutTuning, OcrBackend,
};
pub use error::{AnalysisError, DocumentError, LayoutError, OcrError, PackageError, RenderError};
pub use output::{
    Block, BlockKind, BatchReport, DocType, DocumentMetadata, DocumentStatus, Language, LayoutKind,
    Rect,
};
pub use pipeline::layout::{LayoutClassifier, PageLayout, RuleBasedClassifier};
pub use pipeline::ocr::{OcrEngine, TextRegionExtractor};
pub use pipeline::rasterize::{PageRasterizer, PdfiumRasterizer};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
