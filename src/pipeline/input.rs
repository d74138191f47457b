//! Input validation: make sure a path is a readable PDF before pdfium sees it.
//!
//! pdfium reports every unreadable input as one opaque load error. Checking
//! existence, permissions and the `%PDF` magic bytes up front gives callers
//! a precise [`DocumentError`] and makes a text file renamed to `.pdf` fail
//! fast without binding the pdfium library at all.

use crate::error::DocumentError;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Validate that `path` exists, is readable, and starts like a PDF.
///
/// Some producers prepend a few bytes of garbage before the header; like
/// most readers we accept `%PDF` anywhere in the first 1024 bytes.
pub fn validate_pdf(path: &Path) -> Result<(), DocumentError> {
    let to_buf = || path.to_path_buf();

    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(DocumentError::NotFound { path: to_buf() })
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(DocumentError::PermissionDenied { path: to_buf() })
        }
        Err(e) => {
            return Err(DocumentError::Corrupt {
                path: to_buf(),
                detail: e.to_string(),
            })
        }
    };

    if file.metadata().map(|m| m.is_dir()).unwrap_or(false) {
        return Err(DocumentError::NotFound { path: to_buf() });
    }

    let mut head = Vec::with_capacity(1024);
    file.by_ref()
        .take(1024)
        .read_to_end(&mut head)
        .map_err(|e| DocumentError::Corrupt {
            path: to_buf(),
            detail: e.to_string(),
        })?;

    if head.is_empty() {
        return Err(DocumentError::Empty { path: to_buf() });
    }

    if !head.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC) {
        return Err(DocumentError::NotAPdf {
            path: to_buf(),
            magic: head.iter().take(4).copied().collect(),
        });
    }

    debug!("Validated PDF: {}", path.display());
    Ok(())
}

/// True when `path` has a `.pdf` extension, case-insensitively.
pub fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// File stem used to name every artefact of a document.
pub fn document_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

/// Every `.pdf` file directly inside `dir`, sorted by file name.
pub fn list_pdfs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut pdfs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_pdf_extension(&path) {
            pdfs.push(path);
        }
    }
    pdfs.sort();
    Ok(pdfs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_found() {
        let err = validate_pdf(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, DocumentError::NotFound { .. }));
    }

    #[test]
    fn text_file_is_not_a_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("bad.pdf");
        std::fs::write(&p, "not a real pdf").unwrap();
        let err = validate_pdf(&p).unwrap_err();
        match err {
            DocumentError::NotAPdf { magic, .. } => assert_eq!(magic, b"not ".to_vec()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("empty.pdf");
        std::fs::write(&p, b"").unwrap();
        assert!(matches!(
            validate_pdf(&p).unwrap_err(),
            DocumentError::Empty { .. }
        ));
    }

    #[test]
    fn pdf_header_accepted_with_leading_junk() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("ok.pdf");
        std::fs::write(&p, b"\r\n%PDF-1.7\n%\xe2\xe3\xcf\xd3\n").unwrap();
        assert!(validate_pdf(&p).is_ok());
    }

    #[test]
    fn list_pdfs_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.PDF", "a.pdf", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"%PDF").unwrap();
        }
        std::fs::create_dir(dir.path().join("c.pdf")).unwrap();
        let names: Vec<String> = list_pdfs(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.PDF"]);
    }

    #[test]
    fn stem_falls_back() {
        assert_eq!(document_stem(Path::new("in/Invoice-01.pdf")), "Invoice-01");
        assert_eq!(document_stem(Path::new("/")), "document");
    }
}
