//! Region OCR: crop, recognise, detect language, score confidence.
//!
//! [`OcrEngine`] is the seam for the recognition backend. The default
//! [`TesseractEngine`] drives the `tesseract` command-line tool with every
//! configured language loaded at once (`-l pol+eng+deu`), so one pass reads
//! mixed-language pages. [`TextRegionExtractor`] sits on top and turns raw
//! recognition into a [`RegionText`] with a detected language and a
//! confidence in `[0, 1]`.

use crate::config::OcrBackend;
use crate::error::OcrError;
use crate::output::{Language, Rect};
use crate::pipeline::language;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, warn};

/// Raw engine output for one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// Mean word confidence in `[0, 1]`, when the engine reports one.
    pub confidence: Option<f32>,
}

/// A text recognition backend.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Recognise `image` using all of `languages` simultaneously.
    fn recognize(&self, image: &DynamicImage, languages: &[Language])
        -> Result<Recognition, OcrError>;
}

/// Build the engine named by `backend`.
pub fn engine_for(backend: &OcrBackend) -> Arc<dyn OcrEngine> {
    match backend {
        OcrBackend::Tesseract { binary, psm } => {
            Arc::new(TesseractEngine::new(binary.clone(), *psm))
        }
    }
}

// ── Tesseract ────────────────────────────────────────────────────────────

/// Runs the `tesseract` binary on a temporary PNG and parses its TSV output.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
    psm: u8,
}

impl TesseractEngine {
    pub fn new(binary: impl Into<PathBuf>, psm: u8) -> Self {
        Self {
            binary: binary.into(),
            psm,
        }
    }

    fn language_arg(languages: &[Language]) -> String {
        let codes: Vec<&str> = languages
            .iter()
            .filter_map(|l| l.tesseract_code())
            .collect();
        if codes.is_empty() {
            "eng".to_string()
        } else {
            codes.join("+")
        }
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(
        &self,
        image: &DynamicImage,
        languages: &[Language],
    ) -> Result<Recognition, OcrError> {
        let input = tempfile::Builder::new()
            .prefix("vhtml-ocr-")
            .suffix(".png")
            .tempfile()?;
        image.save_with_format(input.path(), ImageFormat::Png)?;

        let output = Command::new(&self.binary)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(Self::language_arg(languages))
            .arg("--psm")
            .arg(self.psm.to_string())
            .arg("tsv")
            .output()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    OcrError::EngineUnavailable {
                        engine: self.name().to_string(),
                        detail: format!("'{}' not found on PATH", self.binary.display()),
                    }
                } else {
                    OcrError::EngineFailed {
                        engine: self.name().to_string(),
                        detail: e.to_string(),
                    }
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::EngineFailed {
                engine: self.name().to_string(),
                detail: format!("exit {}: {}", output.status, stderr.trim()),
            });
        }

        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse tesseract's `tsv` output.
///
/// Columns: `level page block par line word left top width height conf text`.
/// Only level-5 rows carry words. Words on the same `(block, par, line)` are
/// joined with spaces, lines with newlines.
pub(crate) fn parse_tsv(tsv: &str) -> Recognition {
    let mut lines: Vec<String> = Vec::new();
    let mut current_key: Option<(u32, u32, u32)> = None;
    let mut conf_sum = 0.0f32;
    let mut conf_n = 0usize;

    for row in tsv.lines() {
        let cols: Vec<&str> = row.splitn(12, '\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }
        let num = |i: usize| cols[i].trim().parse::<u32>().unwrap_or(0);
        let key = (num(2), num(3), num(4));

        match (current_key, lines.last_mut()) {
            (Some(k), Some(line)) if k == key => {
                line.push(' ');
                line.push_str(word);
            }
            _ => lines.push(word.to_string()),
        }
        current_key = Some(key);

        if let Ok(conf) = cols[10].trim().parse::<f32>() {
            if conf >= 0.0 {
                conf_sum += conf;
                conf_n += 1;
            }
        }
    }

    Recognition {
        text: lines.join("\n"),
        confidence: (conf_n > 0).then(|| (conf_sum / conf_n as f32 / 100.0).clamp(0.0, 1.0)),
    }
}

// ── Extractor ────────────────────────────────────────────────────────────

/// Text, language and confidence of one region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionText {
    pub text: String,
    pub language: Language,
    pub confidence: f32,
}

impl RegionText {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            language: Language::Unknown,
            confidence: 0.0,
        }
    }
}

/// Reads text out of page regions with a shared [`OcrEngine`].
#[derive(Clone)]
pub struct TextRegionExtractor {
    engine: Arc<dyn OcrEngine>,
    languages: Vec<Language>,
    min_language_score: f32,
}

impl TextRegionExtractor {
    pub fn new(engine: Arc<dyn OcrEngine>, languages: Vec<Language>, min_language_score: f32) -> Self {
        Self {
            engine,
            languages,
            min_language_score,
        }
    }

    /// Extract text from `region` of `image`, or the whole image for `None`.
    ///
    /// A region that is empty or lies entirely outside the image yields
    /// [`RegionText::empty`] without calling the engine.
    pub fn extract(
        &self,
        image: &DynamicImage,
        region: Option<&Rect>,
    ) -> Result<RegionText, OcrError> {
        let (w, h) = image.dimensions();
        let rect = match region {
            Some(r) => match r.clamp_to(w, h) {
                Some(clipped) => clipped,
                None => {
                    debug!("Region {:?} outside {}x{} page, skipping OCR", r, w, h);
                    return Ok(RegionText::empty());
                }
            },
            None if w == 0 || h == 0 => return Ok(RegionText::empty()),
            None => Rect::full(w, h),
        };

        let recognition = if rect == Rect::full(w, h) {
            self.engine.recognize(image, &self.languages)?
        } else {
            let crop = image.crop_imm(rect.x, rect.y, rect.width, rect.height);
            self.engine.recognize(&crop, &self.languages)?
        };

        let text = recognition.text.trim().to_string();
        if text.is_empty() {
            return Ok(RegionText::empty());
        }

        let detection = language::detect(&text, &self.languages, self.min_language_score);
        let confidence = match recognition.confidence {
            Some(c) if c.is_finite() => c,
            Some(c) => {
                warn!("{} reported non-finite confidence {}", self.engine.name(), c);
                estimate_confidence(&text)
            }
            None => estimate_confidence(&text),
        }
        .clamp(0.0, 1.0);

        Ok(RegionText {
            text,
            language: detection.language,
            confidence,
        })
    }
}

/// Confidence from recognised-character density: the alphanumeric share of
/// non-whitespace characters, damped below ten characters.
fn estimate_confidence(text: &str) -> f32 {
    let glyphs: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if glyphs.is_empty() {
        return 0.0;
    }
    let alnum = glyphs.iter().filter(|c| c.is_alphanumeric()).count();
    let share = alnum as f32 / glyphs.len() as f32;
    let damping = (glyphs.len() as f32 / 10.0).min(1.0);
    (share * damping).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedEngine {
        text: &'static str,
        confidence: Option<f32>,
        calls: AtomicUsize,
    }

    impl FixedEngine {
        fn new(text: &'static str, confidence: Option<f32>) -> Self {
            Self {
                text,
                confidence,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl OcrEngine for FixedEngine {
        fn name(&self) -> &str {
            "fixed"
        }
        fn recognize(&self, _: &DynamicImage, _: &[Language]) -> Result<Recognition, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Recognition {
                text: self.text.to_string(),
                confidence: self.confidence,
            })
        }
    }

    fn page() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 50, Rgb([255, 255, 255])))
    }

    fn extractor(engine: Arc<FixedEngine>) -> TextRegionExtractor {
        TextRegionExtractor::new(engine, Language::ALL.to_vec(), 0.15)
    }

    #[test]
    fn region_outside_image_skips_engine() {
        let engine = Arc::new(FixedEngine::new("Faktura", Some(0.9)));
        let ex = extractor(engine.clone());
        let out = ex.extract(&page(), Some(&Rect::new(500, 500, 10, 10))).unwrap();
        assert_eq!(out, RegionText::empty());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn zero_area_region_is_empty() {
        let engine = Arc::new(FixedEngine::new("Faktura", Some(0.9)));
        let out = extractor(engine.clone())
            .extract(&page(), Some(&Rect::new(10, 10, 0, 5)))
            .unwrap();
        assert_eq!(out.confidence, 0.0);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn engine_confidence_and_language() {
        let engine = Arc::new(FixedEngine::new("  Faktura VAT nr 7 \n", Some(0.87)));
        let out = extractor(engine).extract(&page(), None).unwrap();
        assert_eq!(out.text, "Faktura VAT nr 7");
        assert_eq!(out.language, Language::Pl);
        assert!((out.confidence - 0.87).abs() < 1e-6);
    }

    #[test]
    fn empty_text_never_reports_confidence() {
        let engine = Arc::new(FixedEngine::new("   ", Some(0.95)));
        let out = extractor(engine).extract(&page(), None).unwrap();
        assert_eq!(out.confidence, 0.0);
        assert_eq!(out.language, Language::Unknown);
    }

    #[test]
    fn estimated_confidence_is_bounded() {
        let engine = Arc::new(FixedEngine::new("Total amount due 120,00", None));
        let out = extractor(engine).extract(&page(), None).unwrap();
        assert!(out.confidence > 0.5 && out.confidence <= 1.0);

        assert!(estimate_confidence("~~") < estimate_confidence("Invoice12"));
        assert_eq!(estimate_confidence(""), 0.0);
    }

    #[test]
    fn tsv_groups_words_into_lines() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
1\t1\t0\t0\t0\t0\t0\t0\t600\t800\t-1\t\n\
5\t1\t1\t1\t1\t1\t10\t10\t50\t12\t90\tFaktura\n\
5\t1\t1\t1\t1\t2\t65\t10\t30\t12\t80\tVAT\n\
5\t1\t1\t1\t2\t1\t10\t30\t40\t12\t70\tnr\n\
5\t1\t1\t1\t2\t2\t55\t30\t40\t12\t-1\t \n";
        let r = parse_tsv(tsv);
        assert_eq!(r.text, "Faktura VAT\nnr");
        assert!((r.confidence.unwrap() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn tsv_without_words_has_no_confidence() {
        let r = parse_tsv("level\tpage_num\n");
        assert_eq!(r.text, "");
        assert!(r.confidence.is_none());
    }

    #[test]
    fn language_arg_joins_codes() {
        assert_eq!(TesseractEngine::language_arg(&Language::ALL), "pol+eng+deu");
        assert_eq!(TesseractEngine::language_arg(&[]), "eng");
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let engine = TesseractEngine::new("/nonexistent/tesseract-binary", 6);
        let err = engine.recognize(&page(), &Language::ALL).unwrap_err();
        assert!(matches!(err, OcrError::EngineUnavailable { .. }));
    }
}
