//! Page segmentation into typed blocks.
//!
//! [`LayoutClassifier`] is the seam; [`RuleBasedClassifier`] is the default
//! and needs nothing beyond the page pixels. It works on projection
//! profiles of a binarised page:
//!
//! ```text
//!   rows with ink ──► bands (split on tall blank gaps)
//!   band columns  ──► column segments (split on wide blank gaps)
//!   thin full-width ink rows ──► ruling lines
//! ```
//!
//! A band with ruling lines or three-plus column segments is a table. The
//! first band near the top is the header, the last near the bottom the
//! footer, everything else content. Two-segment bands are split into two
//! content blocks.
//!
//! The vision-model classifier in [`crate::pipeline::vision`] produces the
//! same [`PageLayout`] and shares [`normalize_regions`].

use crate::config::LayoutTuning;
use crate::error::LayoutError;
use crate::output::{BlockKind, LayoutKind, Rect};
use image::{DynamicImage, GrayImage};
use std::collections::BTreeMap;
use tracing::debug;

/// One detected region of a page.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutRegion {
    pub kind: BlockKind,
    pub rect: Rect,
    pub formatting: BTreeMap<String, bool>,
}

impl LayoutRegion {
    pub fn new(kind: BlockKind, rect: Rect) -> Self {
        Self {
            kind,
            rect,
            formatting: BTreeMap::new(),
        }
    }
}

/// Classification of a single page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub kind: LayoutKind,
    /// Non-overlapping regions in reading order.
    pub regions: Vec<LayoutRegion>,
}

impl PageLayout {
    pub fn empty() -> Self {
        Self {
            kind: LayoutKind::Generic,
            regions: Vec::new(),
        }
    }
}

pub trait LayoutClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn analyze(&self, image: &DynamicImage) -> Result<PageLayout, LayoutError>;
}

/// Clip to the page, drop empty rects, sort top-to-bottom then
/// left-to-right, and drop any region overlapping an earlier kept one by
/// more than 5 % of the smaller area.
pub fn normalize_regions(regions: Vec<LayoutRegion>, width: u32, height: u32) -> Vec<LayoutRegion> {
    let mut clipped: Vec<LayoutRegion> = regions
        .into_iter()
        .filter_map(|mut r| {
            r.rect = r.rect.clamp_to(width, height)?;
            Some(r)
        })
        .collect();
    clipped.sort_by_key(|r| (r.rect.y, r.rect.x));

    let mut kept: Vec<LayoutRegion> = Vec::with_capacity(clipped.len());
    for region in clipped {
        let overlaps = kept.iter().any(|k| {
            let smaller = k.rect.area().min(region.rect.area()) as f64;
            k.rect.intersection_area(&region.rect) as f64 > smaller * 0.05
        });
        if overlaps {
            debug!("Dropping overlapping region {:?}", region.rect);
        } else {
            kept.push(region);
        }
    }
    kept
}

// ── Rule-based ───────────────────────────────────────────────────────────

/// Whitespace-projection layout heuristics.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedClassifier {
    tuning: LayoutTuning,
}

/// Binarised page.
struct InkMask {
    width: u32,
    height: u32,
    ink: Vec<bool>,
}

impl InkMask {
    fn new(gray: &GrayImage, threshold: u8) -> Self {
        Self {
            width: gray.width(),
            height: gray.height(),
            ink: gray.pixels().map(|p| p.0[0] < threshold).collect(),
        }
    }

    fn at(&self, x: u32, y: u32) -> bool {
        self.ink[(y as usize) * (self.width as usize) + x as usize]
    }

    fn row_count(&self, y: u32, x0: u32, x1: u32) -> u32 {
        (x0..x1).filter(|&x| self.at(x, y)).count() as u32
    }

    fn col_count(&self, x: u32, y0: u32, y1: u32) -> u32 {
        (y0..y1).filter(|&y| self.at(x, y)).count() as u32
    }

    fn count(&self, r: &Rect) -> u64 {
        (r.y..r.bottom())
            .map(|y| self.row_count(y, r.x, r.right()) as u64)
            .sum()
    }

    /// Tight box around the ink inside `[x0, x1) × [y0, y1)`.
    fn tight_box(&self, x0: u32, x1: u32, y0: u32, y1: u32) -> Option<Rect> {
        let rows: Vec<u32> = (y0..y1).filter(|&y| self.row_count(y, x0, x1) > 0).collect();
        let cols: Vec<u32> = (x0..x1).filter(|&x| self.col_count(x, y0, y1) > 0).collect();
        let (top, bottom) = (*rows.first()?, *rows.last()?);
        let (left, right) = (*cols.first()?, *cols.last()?);
        Some(Rect::new(left, top, right - left + 1, bottom - top + 1))
    }
}

/// Half-open runs of `true` in `flags`, merging runs separated by fewer
/// than `min_gap` `false` entries.
fn runs(flags: impl Iterator<Item = bool>, min_gap: u32) -> Vec<(u32, u32)> {
    let mut out: Vec<(u32, u32)> = Vec::new();
    let mut start: Option<u32> = None;
    let mut i = 0u32;
    for on in flags {
        match (on, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                out.push((s, i));
                start = None;
            }
            _ => {}
        }
        i += 1;
    }
    if let Some(s) = start {
        out.push((s, i));
    }

    let mut merged: Vec<(u32, u32)> = Vec::with_capacity(out.len());
    for (s, e) in out {
        match merged.last_mut() {
            Some(last) if s - last.1 < min_gap => last.1 = e,
            _ => merged.push((s, e)),
        }
    }
    merged
}

struct Band {
    rect: Rect,
    /// Column segments as x ranges, left to right.
    segments: Vec<(u32, u32)>,
    is_table: bool,
}

impl RuleBasedClassifier {
    pub fn new(tuning: LayoutTuning) -> Self {
        Self { tuning }
    }

    fn band_gap(&self, height: u32) -> u32 {
        ((height as f32 * self.tuning.band_gap_fraction).round() as u32).max(6)
    }

    fn column_gap(&self, width: u32) -> u32 {
        ((width as f32 * self.tuning.column_gap_fraction).round() as u32).max(8)
    }

    fn bands(&self, mask: &InkMask) -> Vec<Band> {
        let rows = runs(
            (0..mask.height).map(|y| mask.row_count(y, 0, mask.width) > 0),
            self.band_gap(mask.height),
        );
        let col_gap = self.column_gap(mask.width);
        // Ruling lines are thin; a solid box is not a stack of rulings.
        let max_rule = (mask.height / 200).max(4);

        rows.into_iter()
            .filter_map(|(y0, y1)| {
                let rect = mask.tight_box(0, mask.width, y0, y1)?;
                if rect.height < 2 {
                    return None;
                }
                let segments: Vec<(u32, u32)> = runs(
                    (rect.x..rect.right()).map(|x| mask.col_count(x, rect.y, rect.bottom()) > 0),
                    col_gap,
                )
                .into_iter()
                .map(|(a, b)| (a + rect.x, b + rect.x))
                .collect();

                let min_cover = (rect.width as f32 * self.tuning.ruling_coverage).ceil() as u32;
                let rulings = runs(
                    (rect.y..rect.bottom())
                        .map(|y| mask.row_count(y, rect.x, rect.right()) >= min_cover.max(1)),
                    1,
                )
                .into_iter()
                .filter(|(a, b)| b - a <= max_rule)
                .count();

                let is_table = rulings >= 2 || segments.len() >= 3;
                Some(Band {
                    rect,
                    segments,
                    is_table,
                })
            })
            .collect()
    }

    fn formatting(&self, mask: &InkMask, rect: &Rect) -> BTreeMap<String, bool> {
        let density = if rect.area() == 0 {
            0.0
        } else {
            mask.count(rect) as f64 / rect.area() as f64
        };
        let mut f = BTreeMap::new();
        f.insert("bold".to_string(), density >= self.tuning.bold_density as f64);
        f
    }
}

impl LayoutClassifier for RuleBasedClassifier {
    fn name(&self) -> &'static str {
        "rule-based"
    }

    fn analyze(&self, image: &DynamicImage) -> Result<PageLayout, LayoutError> {
        let gray = image.to_luma8();
        let (w, h) = gray.dimensions();
        if w == 0 || h == 0 {
            return Ok(PageLayout::empty());
        }
        let mask = InkMask::new(&gray, self.tuning.ink_threshold);
        let bands = self.bands(&mask);
        let header_limit = (h as f32 * self.tuning.header_zone) as u32;
        let footer_start = (h as f32 * self.tuning.footer_zone) as u32;

        let mut regions = Vec::new();
        let last = bands.len().saturating_sub(1);
        for (i, band) in bands.iter().enumerate() {
            let kind = if i == 0 && band.rect.bottom() <= header_limit {
                BlockKind::Header
            } else if i == last && bands.len() > 1 && band.rect.y >= footer_start {
                BlockKind::Footer
            } else if band.is_table {
                BlockKind::Table
            } else {
                BlockKind::Content
            };

            if kind == BlockKind::Content && band.segments.len() == 2 {
                for &(x0, x1) in &band.segments {
                    if let Some(rect) = mask.tight_box(x0, x1, band.rect.y, band.rect.bottom()) {
                        let mut region = LayoutRegion::new(BlockKind::Content, rect);
                        region.formatting = self.formatting(&mask, &rect);
                        regions.push(region);
                    }
                }
                continue;
            }

            let mut region = LayoutRegion::new(kind, band.rect);
            region.formatting = self.formatting(&mask, &band.rect);
            regions.push(region);
        }

        let kind = if h as f32 / w as f32 >= self.tuning.receipt_aspect {
            LayoutKind::Receipt
        } else if bands.iter().any(|b| b.is_table) {
            LayoutKind::Invoice
        } else {
            LayoutKind::Generic
        };

        let regions = normalize_regions(regions, w, h);
        debug!("{} page {}x{}: {} regions, layout {}", self.name(), w, h, regions.len(), kind);
        Ok(PageLayout { kind, regions })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Luma, GrayImage};

    fn fill(img: &mut GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) {
        for y in y0..y1 {
            for x in x0..x1 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
    }

    /// Rows of 5-px "words" every 16 px, sparse enough not to read as rulings.
    fn text_line(img: &mut GrayImage, x0: u32, x1: u32, y0: u32, y1: u32) {
        let mut x = x0;
        while x + 5 <= x1 {
            fill(img, x, y0, x + 5, y1);
            x += 16;
        }
    }

    /// 600×800 page with a header, a ruled table, a paragraph and a footer.
    pub(crate) fn invoice_page() -> DynamicImage {
        let mut img = GrayImage::from_pixel(600, 800, Luma([255]));
        fill(&mut img, 50, 20, 300, 60);
        for y in [200, 240, 280, 320] {
            fill(&mut img, 50, y, 550, y + 2);
        }
        for x in [50, 300, 548] {
            fill(&mut img, x, 200, x + 2, 322);
        }
        for y in [400, 416, 432] {
            text_line(&mut img, 50, 530, y, y + 10);
        }
        fill(&mut img, 200, 760, 400, 775);
        DynamicImage::ImageLuma8(img)
    }

    fn classify(img: &DynamicImage) -> PageLayout {
        RuleBasedClassifier::default().analyze(img).unwrap()
    }

    fn kinds(layout: &PageLayout) -> Vec<BlockKind> {
        layout.regions.iter().map(|r| r.kind.clone()).collect()
    }

    #[test]
    fn invoice_page_bands_are_typed() {
        let layout = classify(&invoice_page());
        assert_eq!(
            kinds(&layout),
            vec![
                BlockKind::Header,
                BlockKind::Table,
                BlockKind::Content,
                BlockKind::Footer
            ]
        );
        assert_eq!(layout.kind, LayoutKind::Invoice);

        let header = &layout.regions[0].rect;
        assert_eq!((header.x, header.y, header.width, header.height), (50, 20, 250, 40));
        let content = &layout.regions[2].rect;
        assert_eq!((content.y, content.bottom()), (400, 442));
    }

    #[test]
    fn solid_header_is_bold_text_is_not() {
        let layout = classify(&invoice_page());
        assert_eq!(layout.regions[0].formatting.get("bold"), Some(&true));
        assert_eq!(layout.regions[2].formatting.get("bold"), Some(&false));
    }

    #[test]
    fn two_columns_split_left_to_right() {
        let mut img = GrayImage::from_pixel(600, 800, Luma([255]));
        for y in (300..400).step_by(16) {
            text_line(&mut img, 50, 250, y, y + 10);
            text_line(&mut img, 350, 550, y, y + 10);
        }
        let layout = classify(&DynamicImage::ImageLuma8(img));
        assert_eq!(kinds(&layout), vec![BlockKind::Content, BlockKind::Content]);
        assert!(layout.regions[0].rect.right() <= layout.regions[1].rect.x);
        assert_eq!(layout.kind, LayoutKind::Generic);
    }

    #[test]
    fn blank_page_has_no_regions() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(600, 800, Luma([255])));
        let layout = classify(&img);
        assert!(layout.regions.is_empty());
        assert_eq!(layout.kind, LayoutKind::Generic);
    }

    #[test]
    fn tall_narrow_page_is_receipt() {
        let mut img = GrayImage::from_pixel(200, 800, Luma([255]));
        for y in (300..360).step_by(16) {
            text_line(&mut img, 20, 180, y, y + 10);
        }
        assert_eq!(classify(&DynamicImage::ImageLuma8(img)).kind, LayoutKind::Receipt);
    }

    #[test]
    fn normalize_clamps_sorts_and_drops_overlaps() {
        let regions = vec![
            LayoutRegion::new(BlockKind::Content, Rect::new(0, 100, 50, 50)),
            LayoutRegion::new(BlockKind::Header, Rect::new(0, 0, 500, 20)),
            LayoutRegion::new(BlockKind::Table, Rect::new(10, 110, 50, 50)),
            LayoutRegion::new(BlockKind::Footer, Rect::new(900, 900, 10, 10)),
            LayoutRegion::new(BlockKind::Content, Rect::new(5, 5, 0, 10)),
        ];
        let out = normalize_regions(regions, 200, 300);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].kind, BlockKind::Header);
        assert_eq!(out[0].rect, Rect::new(0, 0, 200, 20));
        assert_eq!(out[1].rect, Rect::new(0, 100, 50, 50));
    }

    #[test]
    fn small_overlap_is_kept() {
        let regions = vec![
            LayoutRegion::new(BlockKind::Content, Rect::new(0, 0, 100, 100)),
            LayoutRegion::new(BlockKind::Content, Rect::new(98, 0, 100, 100)),
        ];
        // 2 % overlap
        assert_eq!(normalize_regions(regions, 300, 300).len(), 2);
    }

    #[test]
    fn runs_merge_small_gaps() {
        let flags = [true, true, false, true, false, false, false, true];
        assert_eq!(runs(flags.into_iter(), 2), vec![(0, 4), (7, 8)]);
        assert_eq!(runs(flags.into_iter(), 1), vec![(0, 2), (3, 4), (7, 8)]);
    }
}
