//! Fake backends shared by the integration tests.
//!
//! Nothing here needs pdfium or tesseract: pages are synthetic images and
//! the "OCR engine" returns fixed text.

#![allow(dead_code)]

use image::{DynamicImage, GrayImage, Luma};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use vhtml::error::{DocumentError, OcrError};
use vhtml::pipeline::ocr::Recognition;
use vhtml::{
    AnalyzerConfig, AnalyzerConfigBuilder, DocumentAnalyzer, Language, OcrEngine, PageRasterizer,
    RuleBasedClassifier,
};

/// White page with a dark title bar near the top and a few text lines.
pub fn letter_page() -> DynamicImage {
    let mut img = GrayImage::from_pixel(400, 560, Luma([255]));
    for y in 20..50 {
        for x in 40..220 {
            img.put_pixel(x, y, Luma([0]));
        }
    }
    for line in 0..3 {
        let y0 = 240 + line * 16;
        for y in y0..y0 + 6 {
            let mut x = 40;
            while x + 5 < 360 {
                for dx in 0..5 {
                    img.put_pixel(x + dx, y, Luma([0]));
                }
                x += 12;
            }
        }
    }
    DynamicImage::ImageLuma8(img)
}

/// Rasteriser returning the same pages for every PDF.
///
/// Like pdfium it rejects files without an `%%EOF` trailer. Files whose
/// stem starts with `panic` make it panic; `delay` is slept before
/// returning.
pub struct FakePages {
    pub pages: Vec<DynamicImage>,
    pub delay: Duration,
}

impl FakePages {
    pub fn new(pages: Vec<DynamicImage>) -> Self {
        Self {
            pages,
            delay: Duration::ZERO,
        }
    }

    pub fn slow(pages: Vec<DynamicImage>, delay: Duration) -> Self {
        Self { pages, delay }
    }
}

impl PageRasterizer for FakePages {
    fn rasterize(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, DocumentError> {
        let stem = pdf_path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        if stem.starts_with("panic") {
            panic!("rasteriser blew up on {stem}");
        }
        let bytes = std::fs::read(pdf_path).map_err(|_| DocumentError::NotFound {
            path: pdf_path.to_path_buf(),
        })?;
        if !bytes.windows(5).any(|w| w == b"%%EOF") {
            return Err(DocumentError::Corrupt {
                path: pdf_path.to_path_buf(),
                detail: "missing %%EOF trailer".into(),
            });
        }
        std::thread::sleep(self.delay);
        Ok(self.pages.clone())
    }
}

/// Engine that "reads" the same text from every region.
pub struct FixedText(pub &'static str);

impl OcrEngine for FixedText {
    fn name(&self) -> &str {
        "fixed"
    }

    fn recognize(&self, _: &DynamicImage, _: &[Language]) -> Result<Recognition, OcrError> {
        Ok(Recognition {
            text: self.0.to_string(),
            confidence: Some(0.8),
        })
    }
}

pub fn analyzer_with(
    builder: AnalyzerConfigBuilder,
    rasterizer: FakePages,
    text: &'static str,
) -> DocumentAnalyzer {
    DocumentAnalyzer::with_components(
        builder.build().unwrap(),
        Arc::new(rasterizer),
        Arc::new(RuleBasedClassifier::default()),
        Arc::new(FixedText(text)),
    )
}

pub fn invoice_analyzer() -> DocumentAnalyzer {
    analyzer_with(
        AnalyzerConfig::builder(),
        FakePages::new(vec![letter_page()]),
        "Faktura VAT nr 7/2024 dla klienta",
    )
}

/// Write a minimal file with the PDF magic.
pub fn fake_pdf(dir: &Path, name: &str) -> PathBuf {
    let p = dir.join(name);
    std::fs::write(&p, b"%PDF-1.7\n1 0 obj\n<<>>\nendobj\n%%EOF\n").unwrap();
    p
}
