//! PDF rasterisation: render every page to a `DynamicImage` via pdfium.
//!
//! ## Why size from points, not a fixed width?
//!
//! OCR quality depends on pixels per glyph, so each page is rendered at the
//! configured DPI relative to its own physical size (`points × dpi / 72`).
//! `max_rendered_pixels` still caps both edges so an A0 poster cannot
//! allocate gigabytes. Both inputs are fixed per run, which makes the output
//! dimensions deterministic for a given PDF.

use crate::config::AnalyzerConfig;
use crate::error::DocumentError;
use crate::pipeline::input;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Renders a PDF into one image per page, in page order.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, DocumentError>;
}

/// [`PageRasterizer`] backed by the pdfium library.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    dpi: u32,
    max_pixels: u32,
    library_dir: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            library_dir: config.pdfium_dir.clone(),
        }
    }

    /// Bind pdfium: configured directory, then the working directory, then
    /// the system library search path.
    ///
    /// With `thread_safe` the returned handle holds pdfium's global lock
    /// until it is dropped, so concurrent callers rasterise in turn.
    fn bind(&self) -> Result<Pdfium, DocumentError> {
        let bindings = match &self.library_dir {
            Some(dir) => {
                Pdfium::bind_to_library(&Pdfium::pdfium_platform_library_name_at_path(dir))
            }
            None => Pdfium::bind_to_library(&Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| DocumentError::PdfiumBindingFailed(format!("{:?}", e)))?;

        Ok(Pdfium::new(bindings))
    }

    /// Pixel width for a page of `width_pt × height_pt` points.
    fn target_width(&self, width_pt: f32, height_pt: f32) -> i32 {
        let scale = self.dpi as f32 / 72.0;
        let w = (width_pt * scale).round().max(1.0);
        let h = (height_pt * scale).round().max(1.0);
        let cap = self.max_pixels as f32;
        let shrink = (cap / w).min(cap / h).min(1.0);
        (w * shrink).round().max(1.0) as i32
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, DocumentError> {
        input::validate_pdf(pdf_path)?;

        let pdfium = self.bind()?;
        let document =
            pdfium
                .load_pdf_from_file(pdf_path, None)
                .map_err(|e| DocumentError::Corrupt {
                    path: pdf_path.to_path_buf(),
                    detail: format!("{:?}", e),
                })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        if total_pages == 0 {
            return Err(DocumentError::NoPages {
                path: pdf_path.to_path_buf(),
            });
        }
        info!("PDF loaded: {} pages", total_pages);

        let mut images = Vec::with_capacity(total_pages);
        for idx in 0..total_pages {
            let page = pages
                .get(idx as u16)
                .map_err(|e| DocumentError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?;

            let width = self.target_width(page.width().value, page.height().value);
            let render_config = PdfRenderConfig::new()
                .set_target_width(width)
                .set_maximum_height(self.max_pixels as i32);

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                DocumentError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }

        Ok(images)
    }
}
