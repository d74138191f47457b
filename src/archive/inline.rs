//! Inline local `<img>` sources as base64 data URIs.

use crate::error::PackageError;
use crate::pipeline::encode::data_uri;
use lol_html::{element, rewrite_str, RewriteStrSettings};
use std::path::Path;
use tracing::{debug, warn};

fn is_local(src: &str) -> bool {
    let s = src.trim().to_ascii_lowercase();
    !(s.is_empty() || s.starts_with("http://") || s.starts_with("https://") || s.starts_with("data:"))
}

/// MIME type for an image file, `image/png` for anything unknown or
/// not an image.
pub fn image_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .filter(|m| m.type_() == mime_guess::mime::IMAGE)
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "image/png".to_string())
}

/// Rewrite every local `img[src]` in `html` to a data URI read from
/// `folder`. Remote and `data:` sources are left alone; missing or
/// unreadable files are logged and left alone.
///
/// Sources that resolve outside `folder` (absolute paths, `..`, symlinks)
/// are never read.
pub fn inline_images(html: &str, folder: &Path) -> Result<String, PackageError> {
    let root = folder.canonicalize().map_err(|source| PackageError::Io {
        path: folder.to_path_buf(),
        source,
    })?;
    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("img[src]", |el| {
                let Some(src) = el.get_attribute("src") else {
                    return Ok(());
                };
                if !is_local(&src) {
                    return Ok(());
                }
                let path = match root.join(src.trim()).canonicalize() {
                    Ok(path) if path.starts_with(&root) => path,
                    Ok(path) => {
                        warn!("Image {} is outside {}, not embedded", path.display(), root.display());
                        return Ok(());
                    }
                    Err(e) => {
                        warn!("Image {} not embedded: {}", src, e);
                        return Ok(());
                    }
                };
                match std::fs::read(&path) {
                    Ok(bytes) => {
                        el.set_attribute("src", &data_uri(&image_mime(&path), &bytes))?;
                        debug!("Embedded image {}", path.display());
                    }
                    Err(e) => warn!("Image {} not embedded: {}", path.display(), e),
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| PackageError::Rewrite(e.to_string()));
    rewritten
}
