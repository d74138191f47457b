//! Packaging a rendered document directory into one self-contained file.
//!
//! A source directory holds what [`crate::analyze::DocumentAnalyzer`]
//! writes: one `*.html`, one `*.json` sidecar, optionally `viewer.js`, and
//! the page images. Packaging:
//!
//! 1. substitutes the metadata and script into the placeholder tokens
//!    ([`placeholder`]),
//! 2. inlines local `<img>` sources as data URIs ([`inline`]),
//! 3. writes either a single-part MHTML archive or plain standalone HTML.
//!
//! Failures are values: both entry points return a [`PackageOutcome`] and
//! never panic or `Err`, so a caller packaging many folders can report each
//! one and keep going.

pub mod inline;
pub mod placeholder;

use crate::error::PackageError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// MIME boundary of the archive envelope.
pub const MHTML_BOUNDARY: &str = "----=_NextPart_000_0000";

/// Result of a packaging call.
#[derive(Debug)]
pub enum PackageOutcome {
    Written { path: PathBuf },
    Failed(PackageError),
}

impl PackageOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, PackageOutcome::Written { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            PackageOutcome::Written { path } => Some(path),
            PackageOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&PackageError> {
        match self {
            PackageOutcome::Written { .. } => None,
            PackageOutcome::Failed(e) => Some(e),
        }
    }
}

impl From<Result<PathBuf, PackageError>> for PackageOutcome {
    fn from(r: Result<PathBuf, PackageError>) -> Self {
        match r {
            Ok(path) => PackageOutcome::Written { path },
            Err(e) => PackageOutcome::Failed(e),
        }
    }
}

/// Files found in a source directory.
#[derive(Debug, Clone)]
struct Sources {
    name: String,
    folder: PathBuf,
    html: PathBuf,
    json: PathBuf,
    script: Option<PathBuf>,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PackageError + '_ {
    move |source| PackageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// First file with `ext` in `files` (already sorted).
fn first_with_ext(files: &[PathBuf], ext: &str) -> Option<PathBuf> {
    files
        .iter()
        .find(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(ext))
                .unwrap_or(false)
        })
        .cloned()
}

impl Sources {
    fn discover(folder: &Path) -> Result<Self, PackageError> {
        if !folder.is_dir() {
            return Err(PackageError::SourceMissing(folder.to_path_buf()));
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(folder).map_err(io_err(folder))? {
            let path = entry.map_err(io_err(folder))?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        let html = first_with_ext(&files, "html")
            .ok_or_else(|| PackageError::MissingHtml(folder.to_path_buf()))?;
        let json = first_with_ext(&files, "json")
            .ok_or_else(|| PackageError::MissingMetadata(folder.to_path_buf()))?;
        let script = first_with_ext(&files, "js");

        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .or_else(|| html.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "document".to_string());

        Ok(Self {
            name,
            folder: folder.to_path_buf(),
            html,
            json,
            script,
        })
    }

    /// Final HTML: placeholders substituted and images inlined.
    fn assemble(&self) -> Result<String, PackageError> {
        let html = fs::read_to_string(&self.html).map_err(io_err(&self.html))?;
        let raw_json = fs::read_to_string(&self.json).map_err(io_err(&self.json))?;
        let value: serde_json::Value =
            serde_json::from_str(&raw_json).map_err(|source| PackageError::InvalidMetadata {
                path: self.json.clone(),
                source,
            })?;
        let data = placeholder::data_snippet(&value).map_err(|source| PackageError::InvalidMetadata {
            path: self.json.clone(),
            source,
        })?;

        let script = match &self.script {
            Some(path) => {
                debug!("Found script {}", path.display());
                let js = fs::read_to_string(path).map_err(io_err(path))?;
                Some(placeholder::script_snippet(&js))
            }
            None => None,
        };

        let substituted = placeholder::inject(&html, &data, script.as_deref());
        inline::inline_images(&substituted, &self.folder)
    }
}

fn write_output(output: &Path, contents: &str) -> Result<PathBuf, PackageError> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    fs::write(output, contents).map_err(io_err(output))?;
    Ok(output.to_path_buf())
}

/// The MIME envelope around base64-encoded HTML.
pub fn mhtml_envelope(name: &str, date: &str, html: &str) -> String {
    let encoded = STANDARD.encode(html.as_bytes());
    format!(
        "From: <Saved by vHTML>\n\
Subject: {name}\n\
Date: {date}\n\
MIME-Version: 1.0\n\
Content-Type: multipart/related; boundary=\"{MHTML_BOUNDARY}\"; type=\"text/html\"\n\
\n\
--{MHTML_BOUNDARY}\n\
Content-Type: text/html; charset=\"utf-8\"\n\
Content-Transfer-Encoding: base64\n\
Content-Location: file://{name}.html\n\
\n\
{encoded}\n\
--{MHTML_BOUNDARY}--\n"
    )
}

/// RFC-1123 timestamp in UTC, e.g. `Tue, 15 Nov 1994 08:12:31 GMT`.
pub fn rfc1123_now() -> String {
    chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Package `source_dir` as a single-file MHTML archive at `output`.
pub fn generate_archive(source_dir: impl AsRef<Path>, output: impl AsRef<Path>) -> PackageOutcome {
    let (source_dir, output) = (source_dir.as_ref(), output.as_ref());
    info!("Packaging {} → {}", source_dir.display(), output.display());

    let result = Sources::discover(source_dir).and_then(|sources| {
        let html = sources.assemble()?;
        write_output(output, &mhtml_envelope(&sources.name, &rfc1123_now(), &html))
    });
    report(result)
}

/// Package `source_dir` as one HTML file with everything inlined.
pub fn generate_standalone(source_dir: impl AsRef<Path>, output: impl AsRef<Path>) -> PackageOutcome {
    let (source_dir, output) = (source_dir.as_ref(), output.as_ref());
    info!("Inlining {} → {}", source_dir.display(), output.display());

    let result = Sources::discover(source_dir).and_then(|sources| {
        let html = sources.assemble()?;
        write_output(output, &html)
    });
    report(result)
}

fn report(result: Result<PathBuf, PackageError>) -> PackageOutcome {
    match &result {
        Ok(path) => info!("Wrote {}", path.display()),
        Err(e) => error!("Packaging failed: {}", e),
    }
    result.into()
}
