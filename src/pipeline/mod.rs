//! Pipeline stages for PDF-to-HTML analysis.
//!
//! Each submodule implements one transformation step, so backends can be
//! swapped (a different OCR engine, a vision-model layout classifier)
//! without touching the other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ rasterize ──▶ layout ──▶ ocr + language ──▶ html
//! (magic)   (pdfium)      (blocks)   (text, lang, conf)   (render, persist)
//! ```
//!
//! 1. [`input`]: validate the file and list batch inputs
//! 2. [`rasterize`]: render every page to a `DynamicImage`
//! 3. [`layout`]: segment pages into typed blocks; [`vision`] is the
//!    optional VLM-backed alternative
//! 4. [`ocr`]: read each block; [`language`] tags the result
//! 5. [`html`]: synthesise the HTML and write it with its sidecar;
//!    [`encode`] turns images into PNG data URIs

pub mod encode;
pub mod html;
pub mod input;
pub mod language;
pub mod layout;
pub mod ocr;
pub mod rasterize;
pub mod vision;
