//! Data model produced by the analysis pipeline.
//!
//! [`DocumentMetadata`] is what ends up in the `<name>_metadata.json`
//! sidecar and, after packaging, in the `window.data` global of the archive.
//! [`BatchReport`] is what [`crate::batch::BatchAnalyzer`] returns.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

// ── Geometry ─────────────────────────────────────────────────────────────

/// Axis-aligned rectangle in page-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The full extent of a `width × height` image.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clip to a `width × height` image. `None` when nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Rect> {
        let x0 = self.x.min(width);
        let y0 = self.y.min(height);
        let x1 = self.right().min(width);
        let y1 = self.bottom().min(height);
        let r = Rect::new(x0, y0, x1 - x0, y1 - y0);
        (!r.is_empty()).then_some(r)
    }

    pub fn intersection_area(&self, other: &Rect) -> u64 {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            0
        } else {
            (x1 - x0) as u64 * (y1 - y0) as u64
        }
    }
}

// ── Languages ────────────────────────────────────────────────────────────

/// Languages the pipeline can detect. `Unknown` is the sentinel for text
/// where no configured language scored high enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Pl,
    En,
    De,
    #[default]
    Unknown,
}

impl Language {
    /// Every detectable language, in the default configuration order.
    pub const ALL: [Language; 3] = [Language::Pl, Language::En, Language::De];

    /// ISO 639-1 code as written to the sidecar and the `lang` attribute.
    pub fn code(self) -> &'static str {
        match self {
            Language::Pl => "pl",
            Language::En => "en",
            Language::De => "de",
            Language::Unknown => "unknown",
        }
    }

    /// Tesseract traineddata name, `None` for the sentinel.
    pub fn tesseract_code(self) -> Option<&'static str> {
        match self {
            Language::Pl => Some("pol"),
            Language::En => Some("eng"),
            Language::De => Some("deu"),
            Language::Unknown => None,
        }
    }

    pub fn from_code(code: &str) -> Option<Language> {
        match code.trim().to_ascii_lowercase().as_str() {
            "pl" | "pol" => Some(Language::Pl),
            "en" | "eng" => Some(Language::En),
            "de" | "deu" | "ger" => Some(Language::De),
            "unknown" => Some(Language::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ── Open tag sets ────────────────────────────────────────────────────────

/// Declares a string-backed tag enum with a fixed set of well-known values
/// and an `Other` escape hatch, serialised as a plain JSON string.
macro_rules! string_tag {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
            Other(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $($name::$variant => $text,)+
                    $name::Other(s) => s.as_str(),
                }
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                match s.as_str() {
                    $($text => $name::$variant,)+
                    _ => $name::Other(s),
                }
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name::from(s.to_string())
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> String {
                match v {
                    $name::Other(s) => s,
                    other => other.as_str().to_string(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_tag! {
    /// Category of a detected block.
    pub enum BlockKind {
        Header => "header",
        Table => "table",
        Content => "content",
        Footer => "footer",
    }
}

string_tag! {
    /// Structural category of a page.
    pub enum LayoutKind {
        Invoice => "invoice",
        Receipt => "receipt",
        Generic => "generic",
    }
}

string_tag! {
    /// Document category inferred from the recognised text.
    pub enum DocType {
        Invoice => "invoice",
        Receipt => "receipt",
        Generic => "generic",
    }
}

// ── Blocks & documents ───────────────────────────────────────────────────

/// A detected, positioned, typed region of a page with its extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// `block_<page>_<n>`, unique within the document.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    /// 1-based page the block was found on.
    #[serde(default = "first_page")]
    pub page: usize,
    pub position: Rect,
    pub content: String,
    pub language: Language,
    /// OCR reliability estimate in `[0, 1]`.
    pub confidence: f32,
    #[serde(default)]
    pub formatting: BTreeMap<String, bool>,
}

fn first_page() -> usize {
    1
}

impl Block {
    pub fn block_id(page: usize, index: usize) -> String {
        format!("block_{page}_{index}")
    }
}

/// Everything known about one analysed document.
///
/// Built once by [`DocumentMetadata::assemble`] after every stage finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub doc_type: DocType,
    pub language: Language,
    pub layout: LayoutKind,
    pub confidence: f32,
    pub blocks: Vec<Block>,
}

impl DocumentMetadata {
    /// Derive the document-level language and confidence from `blocks`.
    pub fn assemble(doc_type: DocType, layout: LayoutKind, blocks: Vec<Block>) -> Self {
        Self {
            doc_type,
            language: dominant_language(&blocks),
            layout,
            confidence: mean_confidence(&blocks),
            blocks,
        }
    }

    /// All block text in reading order, one block per line.
    pub fn full_text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.content.as_str())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Confidence-weighted language vote.
///
/// Each block with a known language adds its confidence to that language.
/// The highest total wins; ties go to the language with the single most
/// confident block, then to whichever appeared first. No votes → `Unknown`.
pub fn dominant_language(blocks: &[Block]) -> Language {
    // (language, total, best single, first index)
    let mut tally: Vec<(Language, f32, f32, usize)> = Vec::new();
    for (idx, block) in blocks.iter().enumerate() {
        if block.language == Language::Unknown {
            continue;
        }
        match tally.iter_mut().find(|t| t.0 == block.language) {
            Some(t) => {
                t.1 += block.confidence;
                t.2 = t.2.max(block.confidence);
            }
            None => tally.push((block.language, block.confidence, block.confidence, idx)),
        }
    }

    tally
        .into_iter()
        .max_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then(a.2.total_cmp(&b.2))
                .then(b.3.cmp(&a.3))
        })
        .map(|t| t.0)
        .unwrap_or(Language::Unknown)
}

/// Arithmetic mean of block confidences, 0 for no blocks.
pub fn mean_confidence(blocks: &[Block]) -> f32 {
    if blocks.is_empty() {
        return 0.0;
    }
    let sum: f32 = blocks.iter().map(|b| b.confidence).sum();
    (sum / blocks.len() as f32).clamp(0.0, 1.0)
}

// ── Batch reporting ──────────────────────────────────────────────────────

/// Outcome of one document in a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentStatus {
    Success { html_path: PathBuf },
    Error { error: String },
    /// Not launched because the batch deadline had passed.
    Skipped,
}

impl DocumentStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, DocumentStatus::Success { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentStatus::Success { .. } => "success",
            DocumentStatus::Error { .. } => "error",
            DocumentStatus::Skipped => "skipped",
        }
    }
}

/// Source path → status, in input listing order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchReport {
    entries: IndexMap<PathBuf, DocumentStatus>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: PathBuf, status: DocumentStatus) {
        self.entries.insert(source, status);
    }

    pub fn get(&self, source: impl AsRef<Path>) -> Option<&DocumentStatus> {
        self.entries.get(source.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &DocumentStatus)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Success { .. }))
    }

    pub fn error_count(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Error { .. }))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Skipped))
    }

    fn count(&self, pred: impl Fn(&DocumentStatus) -> bool) -> usize {
        self.entries.values().filter(|s| pred(s)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(lang: Language, confidence: f32) -> Block {
        Block {
            id: "b".into(),
            kind: BlockKind::Content,
            page: 1,
            position: Rect::new(0, 0, 10, 10),
            content: "x".into(),
            language: lang,
            confidence,
            formatting: BTreeMap::new(),
        }
    }

    #[test]
    fn dominant_language_is_confidence_weighted() {
        // Two weak English blocks lose to one strong Polish block.
        let blocks = vec![
            block(Language::En, 0.3),
            block(Language::En, 0.3),
            block(Language::Pl, 0.9),
        ];
        assert_eq!(dominant_language(&blocks), Language::Pl);
    }

    #[test]
    fn dominant_language_tie_prefers_strongest_block() {
        let blocks = vec![
            block(Language::De, 0.4),
            block(Language::De, 0.4),
            block(Language::En, 0.8),
        ];
        assert_eq!(dominant_language(&blocks), Language::En);
    }

    #[test]
    fn dominant_language_full_tie_prefers_first() {
        let blocks = vec![block(Language::De, 0.5), block(Language::Pl, 0.5)];
        assert_eq!(dominant_language(&blocks), Language::De);
    }

    #[test]
    fn dominant_language_ignores_unknown() {
        let blocks = vec![block(Language::Unknown, 1.0), block(Language::De, 0.1)];
        assert_eq!(dominant_language(&blocks), Language::De);
        assert_eq!(
            dominant_language(&[block(Language::Unknown, 0.9)]),
            Language::Unknown
        );
        assert_eq!(dominant_language(&[]), Language::Unknown);
    }

    #[test]
    fn mean_confidence_handles_empty() {
        assert_eq!(mean_confidence(&[]), 0.0);
        let blocks = vec![block(Language::En, 0.2), block(Language::En, 0.6)];
        assert!((mean_confidence(&blocks) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn open_tags_round_trip_unknown_values() {
        assert_eq!(BlockKind::from("table"), BlockKind::Table);
        assert_eq!(
            BlockKind::from("signature"),
            BlockKind::Other("signature".into())
        );
        let json = serde_json::to_string(&LayoutKind::Other("test_layout".into())).unwrap();
        assert_eq!(json, "\"test_layout\"");
    }

    #[test]
    fn sidecar_shape_matches_contract() {
        let meta = DocumentMetadata::assemble(
            DocType::Invoice,
            LayoutKind::Invoice,
            vec![block(Language::Pl, 0.9)],
        );
        let value = serde_json::to_value(&meta).unwrap();
        for key in ["doc_type", "language", "layout", "confidence", "blocks"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        let b = &value["blocks"][0];
        for key in ["id", "type", "position", "content", "language", "confidence", "formatting"] {
            assert!(b.get(key).is_some(), "missing block.{key}");
        }
        assert_eq!(b["position"]["width"], 10);
        assert_eq!(value["language"], "pl");
    }

    #[test]
    fn rect_clamp_and_intersection() {
        let r = Rect::new(90, 90, 20, 20);
        assert_eq!(r.clamp_to(100, 100), Some(Rect::new(90, 90, 10, 10)));
        assert_eq!(Rect::new(100, 0, 5, 5).clamp_to(100, 100), None);
        assert_eq!(
            Rect::new(0, 0, 10, 10).intersection_area(&Rect::new(5, 5, 10, 10)),
            25
        );
        assert_eq!(
            Rect::new(0, 0, 10, 10).intersection_area(&Rect::new(10, 0, 5, 5)),
            0
        );
    }

    #[test]
    fn document_status_serialises_with_status_tag() {
        let ok = DocumentStatus::Success {
            html_path: PathBuf::from("out/a.html"),
        };
        let v = serde_json::to_value(&ok).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["html_path"], "out/a.html");
        let err = serde_json::to_value(DocumentStatus::Error {
            error: "boom".into(),
        })
        .unwrap();
        assert_eq!(err["status"], "error");
        assert_eq!(err["error"], "boom");
    }

    #[test]
    fn label_matches_json_status() {
        for status in [
            DocumentStatus::Success {
                html_path: PathBuf::from("a.html"),
            },
            DocumentStatus::Error {
                error: "boom".into(),
            },
            DocumentStatus::Skipped,
        ] {
            let v = serde_json::to_value(&status).unwrap();
            assert_eq!(v["status"], status.label());
        }
    }
}
