//! HTML synthesis and persistence.
//!
//! [`DocumentRenderer::render`] turns a [`DocumentMetadata`] plus the page
//! images into a single HTML page: a summary header, page navigation, and
//! one `<section>` per page with the page image and absolutely positioned
//! block overlays. Overlay geometry is expressed in percent of the page
//! image so it scales with the image.
//!
//! The page ends with the two placeholder tokens that packaging replaces:
//!
//! ```text
//! <!--DATA-->     → <script>window.data = {...};</script>
//! <!--SCRIPT-->   → <script> contents of viewer.js </script>
//! ```
//!
//! [`DocumentRenderer::persist`] writes the HTML and its
//! `<stem>_metadata.json` sidecar as a pair: both go to temporaries first
//! and are renamed into place. A failure before the HTML rename leaves any
//! previous pair untouched; a failure after it removes both outputs, so a
//! new HTML never sits next to an old sidecar or the other way round.

use crate::config::ImageEmbedding;
use crate::error::RenderError;
use crate::output::{Block, DocumentMetadata, Language};
use crate::pipeline::encode;
use image::DynamicImage;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Replaced by the embedded metadata when packaging.
pub const DATA_PLACEHOLDER: &str = "<!--DATA-->";
/// Replaced by the viewer script when packaging.
pub const SCRIPT_PLACEHOLDER: &str = "<!--SCRIPT-->";
/// File name of the optional viewer script.
pub const VIEWER_SCRIPT_NAME: &str = "viewer.js";

const STYLE: &str = r#"body { font-family: system-ui, sans-serif; margin: 0; background: #f4f4f4; color: #222; }
.document-summary { padding: 1rem 2rem; background: #fff; border-bottom: 1px solid #ddd; }
.document-summary dl { display: grid; grid-template-columns: max-content auto; gap: .25rem 1rem; margin: 0; }
.document-summary dt { font-weight: 600; }
nav.pages { padding: .5rem 2rem; }
nav.pages a { margin-right: .5rem; }
section.page { margin: 1rem auto; max-width: 1000px; }
.page-canvas { position: relative; }
.page-canvas img { display: block; width: 100%; height: auto; }
.block { position: absolute; box-sizing: border-box; border: 1px solid rgba(0, 102, 204, .6); background: rgba(255, 255, 255, .85); overflow: hidden; white-space: pre-wrap; font-size: 11px; line-height: 1.2; }
.block.bold { font-weight: 700; }
.block-header { border-color: rgba(204, 0, 0, .6); }
.block-table { border-color: rgba(0, 153, 51, .6); }
.block-footer { border-color: rgba(153, 102, 0, .6); }
.overlays-hidden .block { display: none; }
.block.low-confidence { border-style: dashed; background: rgba(255, 230, 200, .85); }"#;

const VIEWER_SCRIPT: &str = r#"(function () {
  var LOW = 0.5;
  function mark() {
    document.querySelectorAll('.block').forEach(function (el) {
      var c = parseFloat(el.getAttribute('data-confidence'));
      if (!isNaN(c) && c < LOW) el.classList.add('low-confidence');
      el.title = el.getAttribute('data-type') + ' · ' +
        el.getAttribute('data-language') + ' · ' + el.getAttribute('data-confidence');
    });
  }
  function toggle() { document.body.classList.toggle('overlays-hidden'); }
  document.addEventListener('keydown', function (e) {
    if (e.key === 'o' && !e.ctrlKey && !e.metaKey) toggle();
  });
  if (document.readyState === 'loading') document.addEventListener('DOMContentLoaded', mark);
  else mark();
  window.vhtml = { toggleOverlays: toggle, data: function () { return window.data || null; } };
})();"#;

/// Renders analysed documents to HTML and writes them to disk.
#[derive(Debug, Clone, Default)]
pub struct DocumentRenderer {
    embedding: ImageEmbedding,
}

/// `page_<n>.png`, 1-based.
pub fn page_image_name(page: usize) -> String {
    format!("page_{page}.png")
}

/// `<dir>/<stem>_metadata.json` for `<dir>/<stem>.html`.
pub fn sidecar_path(html_path: &Path) -> Result<PathBuf, RenderError> {
    let stem = html_path
        .file_stem()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RenderError::InvalidOutputPath(html_path.to_path_buf()))?;
    let mut name = stem.to_os_string();
    name.push("_metadata.json");
    Ok(html_path.with_file_name(name))
}

fn write_failed(path: &Path) -> impl FnOnce(std::io::Error) -> RenderError + '_ {
    move |source| RenderError::WriteFailed {
        path: path.to_path_buf(),
        source,
    }
}

fn pct(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

impl DocumentRenderer {
    pub fn new(embedding: ImageEmbedding) -> Self {
        Self { embedding }
    }

    /// Render `metadata` over `images` (page 1 first) as an HTML page
    /// titled `name`.
    pub fn render(&self, metadata: &DocumentMetadata, images: &[DynamicImage], name: &str) -> String {
        let title = html_escape::encode_text(name);
        let mut html = String::with_capacity(16 * 1024);

        html.push_str("<!DOCTYPE html>\n");
        match metadata.language {
            Language::Unknown => html.push_str("<html>\n"),
            lang => {
                let _ = writeln!(html, "<html lang=\"{}\">", lang.code());
            }
        }
        html.push_str("<head>\n<meta charset=\"utf-8\">\n");
        html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
        let _ = writeln!(
            html,
            "<meta name=\"generator\" content=\"vhtml {}\">",
            env!("CARGO_PKG_VERSION")
        );
        let _ = writeln!(html, "<title>{title}</title>");
        let _ = writeln!(html, "<style>\n{STYLE}\n</style>");
        html.push_str("</head>\n<body>\n");

        let _ = writeln!(
            html,
            "<header class=\"document-summary\">\n<h1>{title}</h1>\n<dl>\n\
             <dt>Type</dt><dd class=\"doc-type\">{}</dd>\n\
             <dt>Language</dt><dd class=\"doc-language\">{}</dd>\n\
             <dt>Layout</dt><dd class=\"doc-layout\">{}</dd>\n\
             <dt>Confidence</dt><dd class=\"doc-confidence\">{:.2}</dd>\n\
             </dl>\n</header>",
            html_escape::encode_text(metadata.doc_type.as_str()),
            metadata.language,
            html_escape::encode_text(metadata.layout.as_str()),
            metadata.confidence
        );

        html.push_str("<nav class=\"pages\">");
        for page in 1..=images.len() {
            let _ = write!(html, "<a href=\"#page-{page}\">{page}</a>");
        }
        html.push_str("</nav>\n<main>\n");

        for (idx, image) in images.iter().enumerate() {
            let page = idx + 1;
            self.render_page(&mut html, page, image, metadata.blocks.iter().filter(|b| b.page == page));
        }

        html.push_str("</main>\n");
        html.push_str(DATA_PLACEHOLDER);
        html.push('\n');
        html.push_str(SCRIPT_PLACEHOLDER);
        html.push_str("\n</body>\n</html>\n");
        html
    }

    fn render_page<'a>(
        &self,
        html: &mut String,
        page: usize,
        image: &DynamicImage,
        blocks: impl Iterator<Item = &'a Block>,
    ) {
        let (w, h) = (image.width(), image.height());
        let src = match self.embedding {
            ImageEmbedding::Linked => page_image_name(page),
            ImageEmbedding::Inline => encode::png_data_uri(image).unwrap_or_else(|e| {
                warn!("Page {}: inline encoding failed ({}), linking instead", page, e);
                page_image_name(page)
            }),
        };

        let _ = writeln!(
            html,
            "<section class=\"page\" id=\"page-{page}\" data-page=\"{page}\">\n\
             <div class=\"page-canvas\">\n\
             <img src=\"{src}\" alt=\"Page {page}\" width=\"{w}\" height=\"{h}\">"
        );

        for block in blocks {
            let r = &block.position;
            let mut class = format!("block block-{}", block.kind.as_str());
            if block.formatting.get("bold").copied().unwrap_or(false) {
                class.push_str(" bold");
            }
            let lang_attr = match block.language {
                Language::Unknown => String::new(),
                lang => format!(" lang=\"{}\"", lang.code()),
            };
            let _ = writeln!(
                html,
                "<div class=\"{}\" id=\"{}\" data-type=\"{}\" data-language=\"{}\" \
                 data-confidence=\"{:.2}\"{} style=\"left:{:.3}%;top:{:.3}%;width:{:.3}%;height:{:.3}%\">{}</div>",
                html_escape::encode_double_quoted_attribute(&class),
                html_escape::encode_double_quoted_attribute(&block.id),
                html_escape::encode_double_quoted_attribute(block.kind.as_str()),
                block.language,
                block.confidence,
                lang_attr,
                pct(r.x, w),
                pct(r.y, h),
                pct(r.width, w),
                pct(r.height, h),
                html_escape::encode_text(&block.content)
            );
        }

        html.push_str("</div>\n</section>\n");
    }

    /// Write `page_<n>.png` into `dir` for every page. Inline mode writes
    /// nothing.
    pub fn write_page_images(&self, images: &[DynamicImage], dir: &Path) -> Result<Vec<PathBuf>, RenderError> {
        if self.embedding == ImageEmbedding::Inline {
            return Ok(Vec::new());
        }
        fs::create_dir_all(dir).map_err(write_failed(dir))?;

        let mut written = Vec::with_capacity(images.len());
        for (idx, image) in images.iter().enumerate() {
            let path = dir.join(page_image_name(idx + 1));
            image
                .save_with_format(&path, image::ImageFormat::Png)
                .map_err(|e| RenderError::ImageEncode {
                    page: idx + 1,
                    detail: e.to_string(),
                })?;
            debug!("Wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }

    /// Write `viewer.js` into `dir`.
    pub fn write_viewer_script(&self, dir: &Path) -> Result<PathBuf, RenderError> {
        fs::create_dir_all(dir).map_err(write_failed(dir))?;
        let path = dir.join(VIEWER_SCRIPT_NAME);
        fs::write(&path, VIEWER_SCRIPT).map_err(write_failed(&path))?;
        Ok(path)
    }

    /// Atomically write `html` to `output_path` and `metadata` to its
    /// sidecar. Returns the HTML path.
    pub fn persist(
        &self,
        html: &str,
        metadata: &DocumentMetadata,
        output_path: &Path,
    ) -> Result<PathBuf, RenderError> {
        let sidecar = sidecar_path(output_path)?;
        let json = serde_json::to_string_pretty(metadata)?;

        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_failed(parent))?;
        }

        let html_tmp = output_path.with_extension("html.tmp");
        let json_tmp = sidecar.with_extension("json.tmp");
        let cleanup = |paths: &[&Path]| {
            for p in paths {
                let _ = fs::remove_file(p);
            }
        };

        if let Err(e) = fs::write(&html_tmp, html) {
            cleanup(&[html_tmp.as_path()]);
            return Err(write_failed(output_path)(e));
        }
        if let Err(e) = fs::write(&json_tmp, json) {
            cleanup(&[html_tmp.as_path(), json_tmp.as_path()]);
            return Err(write_failed(&sidecar)(e));
        }
        if let Err(e) = fs::rename(&html_tmp, output_path) {
            cleanup(&[html_tmp.as_path(), json_tmp.as_path()]);
            return Err(write_failed(output_path)(e));
        }
        if let Err(e) = fs::rename(&json_tmp, &sidecar) {
            cleanup(&[json_tmp.as_path(), output_path, sidecar.as_path()]);
            return Err(write_failed(&sidecar)(e));
        }

        debug!("Persisted {} and {}", output_path.display(), sidecar.display());
        Ok(output_path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{BlockKind, DocType, LayoutKind, Rect};
    use image::{Rgb, RgbImage};
    use std::collections::BTreeMap;

    fn page(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([255, 255, 255])))
    }

    fn block(page: usize, idx: usize, kind: BlockKind, content: &str, lang: Language) -> Block {
        let mut formatting = BTreeMap::new();
        formatting.insert("bold".to_string(), kind == BlockKind::Header);
        Block {
            id: Block::block_id(page, idx),
            kind,
            page,
            position: Rect::new(10, 20, 100, 40),
            content: content.to_string(),
            language: lang,
            confidence: 0.9,
            formatting,
        }
    }

    fn metadata() -> DocumentMetadata {
        DocumentMetadata::assemble(
            DocType::Invoice,
            LayoutKind::Invoice,
            vec![
                block(1, 1, BlockKind::Header, "Faktura <VAT> & co", Language::Pl),
                block(2, 1, BlockKind::Content, "Total", Language::En),
            ],
        )
    }

    #[test]
    fn render_has_structure_and_placeholders_once() {
        let html = DocumentRenderer::default().render(&metadata(), &[page(200, 400), page(200, 400)], "invoice");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<html lang=\"pl\">") || html.contains("<html lang=\"en\">"));
        assert_eq!(html.matches(DATA_PLACEHOLDER).count(), 1);
        assert_eq!(html.matches(SCRIPT_PLACEHOLDER).count(), 1);
        assert!(html.find(SCRIPT_PLACEHOLDER).unwrap() < html.find("</body>").unwrap());
        assert_eq!(html.matches("<section class=\"page\"").count(), 2);
        assert!(html.contains("src=\"page_2.png\""));
        assert!(html.contains("href=\"#page-2\""));
    }

    #[test]
    fn blocks_are_annotated_and_escaped() {
        let html = DocumentRenderer::default().render(&metadata(), &[page(200, 400), page(200, 400)], "x");
        assert!(html.contains("Faktura &lt;VAT&gt; &amp; co"));
        assert!(html.contains("id=\"block_1_1\""));
        assert!(html.contains("data-type=\"header\""));
        assert!(html.contains("data-language=\"pl\""));
        assert!(html.contains("data-confidence=\"0.90\""));
        assert!(html.contains("class=\"block block-header bold\""));
        // x 10 of 200 px → 5 %
        assert!(html.contains("left:5.000%;top:5.000%;width:50.000%;height:10.000%"));
    }

    #[test]
    fn unknown_language_omits_lang() {
        let meta = DocumentMetadata::assemble(
            DocType::Generic,
            LayoutKind::Generic,
            vec![block(1, 1, BlockKind::Content, "", Language::Unknown)],
        );
        let html = DocumentRenderer::default().render(&meta, &[page(50, 50)], "blank");
        assert!(html.contains("<html>\n"));
        assert!(html.contains("data-language=\"unknown\""));
        assert!(!html.contains(" lang=\"unknown\""));
    }

    #[test]
    fn inline_mode_embeds_data_uri() {
        let html = DocumentRenderer::new(ImageEmbedding::Inline).render(&metadata(), &[page(8, 8)], "x");
        assert!(html.contains("src=\"data:image/png;base64,"));
        assert!(!html.contains("src=\"page_1.png\""));
    }

    #[test]
    fn persist_writes_pair() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("invoice.html");
        let renderer = DocumentRenderer::default();
        let meta = metadata();
        let path = renderer.persist("<html></html>", &meta, &out).unwrap();

        assert_eq!(path, out);
        assert_eq!(fs::read_to_string(&out).unwrap(), "<html></html>");
        let sidecar = dir.path().join("nested").join("invoice_metadata.json");
        let back: DocumentMetadata = serde_json::from_str(&fs::read_to_string(sidecar).unwrap()).unwrap();
        assert_eq!(back, meta);
        let leftovers: Vec<_> = fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn persist_failure_leaves_no_html() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("doc.html");
        // A directory where the sidecar should go makes the second rename fail.
        fs::create_dir(dir.path().join("doc_metadata.json")).unwrap();
        fs::write(dir.path().join("doc_metadata.json").join("keep"), "x").unwrap();

        let err = DocumentRenderer::default()
            .persist("<html></html>", &metadata(), &out)
            .unwrap_err();
        assert!(matches!(err, RenderError::WriteFailed { .. }));
        assert!(!out.exists());
        assert!(!dir.path().join("doc.html.tmp").exists());
    }

    #[test]
    fn failed_replacement_removes_previous_html() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("doc.html");
        fs::write(&out, "<html>old</html>").unwrap();
        fs::create_dir(dir.path().join("doc_metadata.json")).unwrap();
        fs::write(dir.path().join("doc_metadata.json").join("keep"), "x").unwrap();

        assert!(DocumentRenderer::default()
            .persist("<html>new</html>", &metadata(), &out)
            .is_err());
        assert!(!out.exists());
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn failed_write_keeps_previous_pair() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("doc.html");
        let sidecar = dir.path().join("doc_metadata.json");
        fs::write(&out, "<html>old</html>").unwrap();
        fs::write(&sidecar, "{}").unwrap();
        // The JSON temporary cannot be created where a directory sits.
        fs::create_dir(dir.path().join("doc_metadata.json.tmp")).unwrap();
        fs::write(dir.path().join("doc_metadata.json.tmp").join("keep"), "x").unwrap();

        assert!(DocumentRenderer::default()
            .persist("<html>new</html>", &metadata(), &out)
            .is_err());
        assert_eq!(fs::read_to_string(&out).unwrap(), "<html>old</html>");
        assert_eq!(fs::read_to_string(&sidecar).unwrap(), "{}");
        assert!(!dir.path().join("doc.html.tmp").exists());
    }

    #[test]
    fn sidecar_name_follows_stem() {
        assert_eq!(
            sidecar_path(Path::new("/out/Invoice-1.html")).unwrap(),
            PathBuf::from("/out/Invoice-1_metadata.json")
        );
        assert!(sidecar_path(Path::new("/")).is_err());
    }

    #[test]
    fn page_images_and_viewer_written() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = DocumentRenderer::default();
        let written = renderer.write_page_images(&[page(4, 4), page(4, 4)], dir.path()).unwrap();
        assert_eq!(written.len(), 2);
        assert!(dir.path().join("page_2.png").exists());
        let js = renderer.write_viewer_script(dir.path()).unwrap();
        assert!(fs::read_to_string(js).unwrap().contains("toggleOverlays"));
    }
}
