//! Error types for the vhtml library.
//!
//! Errors are split by the stage that raises them so callers can tell a bad
//! input file from a broken OCR installation or a full disk:
//!
//! * [`DocumentError`]: the PDF itself is unusable (missing, not a PDF,
//!   corrupt, zero pages).
//! * [`OcrError`]: the OCR engine could not be run.
//! * [`LayoutError`]: a layout backend failed.
//! * [`RenderError`]: HTML, sidecar or page images could not be written.
//!
//! [`AnalysisError`] wraps all of them and is what
//! [`crate::analyze::DocumentAnalyzer::analyze`] returns. Every variant is
//! fatal for *one document* only: [`crate::batch::BatchAnalyzer`] turns it
//! into a status entry and carries on with the next file.
//!
//! Packaging is deliberately different: [`PackageError`] is never returned
//! as `Err`, it travels inside [`crate::archive::PackageOutcome::Failed`].

use std::path::PathBuf;
use thiserror::Error;

/// The input document cannot be opened or parsed.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    NotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but has no content.
    #[error("File is empty: '{path}'")]
    Empty { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: Vec<u8> },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    /// The PDF parsed but contains no pages.
    #[error("PDF '{path}' has no pages")]
    NoPages { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set VHTML_PDFIUM_DIR (or --pdfium-dir) to the directory containing libpdfium,\n\
or install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),
}

/// The OCR engine could not produce a result.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The engine binary or model is not installed.
    #[error("OCR engine '{engine}' is not available: {detail}")]
    EngineUnavailable { engine: String, detail: String },

    /// The engine ran but reported a failure.
    #[error("OCR engine '{engine}' failed: {detail}")]
    EngineFailed { engine: String, detail: String },

    /// The region could not be handed to the engine (temp file, encoding).
    #[error("Could not prepare region for OCR: {0}")]
    Io(#[from] std::io::Error),

    /// The cropped region could not be encoded as an image.
    #[error("Could not encode region image: {0}")]
    Image(#[from] image::ImageError),
}

/// A layout backend failed to segment a page.
#[derive(Debug, Error)]
#[error("Layout backend '{backend}' failed: {detail}")]
pub struct LayoutError {
    pub backend: String,
    pub detail: String,
}

/// HTML, metadata sidecar, or page images could not be persisted.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A file or directory could not be created or written.
    #[error("Failed to write '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Metadata could not be serialised to JSON.
    #[error("Failed to serialise document metadata: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A page image could not be encoded.
    #[error("Failed to encode page {page} as PNG: {detail}")]
    ImageEncode { page: usize, detail: String },

    /// The output path has no file name to derive the sidecar from.
    #[error("Output path '{0}' has no file name")]
    InvalidOutputPath(PathBuf),
}

/// Everything that can abort the analysis of a single document.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Render(#[from] RenderError),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The batch input directory could not be listed.
    #[error("Cannot read input directory '{path}': {source}")]
    InputDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error (runtime creation, task join).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why an archive could not be produced.
///
/// Carried by [`crate::archive::PackageOutcome::Failed`]; packaging never
/// returns this as an `Err` so batch-level packaging of many folders is not
/// aborted by one malformed folder.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("Source directory '{0}' does not exist or is not a directory")]
    SourceMissing(PathBuf),

    #[error("No HTML file found in '{0}'")]
    MissingHtml(PathBuf),

    #[error("No JSON metadata file found in '{0}'")]
    MissingMetadata(PathBuf),

    #[error("Invalid JSON in '{path}': {source}")]
    InvalidMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("HTML rewrite failed: {0}")]
    Rewrite(String),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_a_pdf_display_mentions_path() {
        let e = DocumentError::NotAPdf {
            path: PathBuf::from("/tmp/bad.pdf"),
            magic: b"not ".to_vec(),
        };
        let msg = e.to_string();
        assert!(msg.contains("/tmp/bad.pdf"), "got: {msg}");
        assert!(msg.contains("not a valid PDF"));
    }

    #[test]
    fn analysis_error_is_transparent() {
        let inner = DocumentError::NoPages {
            path: PathBuf::from("empty.pdf"),
        };
        let expected = inner.to_string();
        let outer: AnalysisError = inner.into();
        assert_eq!(outer.to_string(), expected);
        assert!(matches!(outer, AnalysisError::Document(_)));
    }

    #[test]
    fn ocr_unavailable_display() {
        let e = OcrError::EngineUnavailable {
            engine: "tesseract".into(),
            detail: "No such file or directory".into(),
        };
        assert!(e.to_string().contains("tesseract"));
        assert!(e.to_string().contains("not available"));
    }

    #[test]
    fn package_error_display() {
        let e = PackageError::MissingMetadata(PathBuf::from("out/invoice"));
        assert!(e.to_string().contains("out/invoice"));
    }
}
