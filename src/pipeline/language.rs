//! Language detection over recognised text.
//!
//! The OCR engine reads every region with all configured languages loaded at
//! once, so it never tells us which one actually matched. This module scores
//! each configured language from two kinds of evidence and picks the best:
//!
//! * **script**: words containing letters only that language uses
//!   (`ą ć ę ł ń ó ś ź ż` for Polish, `ä ö ü ß` for German);
//! * **lexical**: function words and the invoice/receipt vocabulary the
//!   pipeline mostly sees. Single letters never count: the English pronoun
//!   "I" and the Polish conjunction "i" are the same token.
//!
//! A language's score is the share of words carrying evidence for it.
//! Nothing above `min_score` → [`Language::Unknown`].
//!
//! [`infer_doc_type`] lives here too: it runs over the same vocabulary.

use crate::output::{DocType, Language};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{L}+").unwrap());

static RE_INVOICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(faktur[a-zęy]*|invoice|rechnung)\b").unwrap()
});

static RE_RECEIPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(paragon[a-z]*|receipt|kassenbon|quittung)\b").unwrap()
});

const PL_LETTERS: &[char] = &['ą', 'ć', 'ę', 'ł', 'ń', 'ó', 'ś', 'ź', 'ż'];
const DE_LETTERS: &[char] = &['ä', 'ö', 'ü', 'ß'];

const PL_WORDS: &[&str] = &[
    "na", "do", "nie", "jest", "to", "od", "za", "po", "dla", "oraz", "nr",
    "faktura", "nabywca", "sprzedawca", "razem", "data", "wystawienia", "kwota", "netto",
    "brutto", "zapłaty", "sprzedaży", "paragon", "fiskalny", "suma", "sklep", "ilość", "cena",
    "wartość", "termin", "płatności", "kategoria",
];

const EN_WORDS: &[&str] = &[
    "the", "and", "of", "to", "in", "for", "is", "on", "with", "by", "from", "at", "invoice",
    "total", "date", "amount", "due", "bill", "buyer", "seller", "receipt", "tax", "payment",
    "number", "shop", "issue", "price", "quantity", "subtotal", "category", "page",
];

const DE_WORDS: &[&str] = &[
    "der", "die", "das", "und", "ist", "nicht", "mit", "von", "für", "den", "dem", "zu", "auf",
    "rechnung", "datum", "betrag", "summe", "gesamt", "steuer", "käufer", "verkäufer",
    "quittung", "kassenbon", "zahlung", "menge", "preis", "seite", "bis",
];

/// Result of scoring a piece of text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub language: Language,
    /// Share of words carrying evidence for `language`, in `[0, 1]`.
    pub score: f32,
}

impl Detection {
    pub fn unknown() -> Self {
        Self {
            language: Language::Unknown,
            score: 0.0,
        }
    }
}

/// Pick the best of `candidates` for `text`.
///
/// Ties go to the language listed first in `candidates`.
pub fn detect(text: &str, candidates: &[Language], min_score: f32) -> Detection {
    let words: Vec<String> = RE_WORD
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    if words.is_empty() {
        return Detection::unknown();
    }

    let mut best = Detection::unknown();
    for &lang in candidates {
        let score = score_language(&words, lang);
        if score > best.score {
            best = Detection {
                language: lang,
                score,
            };
        }
    }

    if best.score < min_score || best.score == 0.0 {
        Detection::unknown()
    } else {
        best
    }
}

/// Classify a document from its full text.
///
/// Invoice vocabulary wins when both kinds appear.
pub fn infer_doc_type(text: &str) -> DocType {
    if RE_INVOICE.is_match(text) {
        DocType::Invoice
    } else if RE_RECEIPT.is_match(text) {
        DocType::Receipt
    } else {
        DocType::Generic
    }
}

fn score_language(words: &[String], lang: Language) -> f32 {
    let (letters, vocabulary): (&[char], &[&str]) = match lang {
        Language::Pl => (PL_LETTERS, PL_WORDS),
        Language::En => (&[], EN_WORDS),
        Language::De => (DE_LETTERS, DE_WORDS),
        Language::Unknown => return 0.0,
    };

    let hits = words
        .iter()
        .filter(|w| {
            (w.chars().nth(1).is_some() && vocabulary.contains(&w.as_str()))
                || w.chars().any(|c| letters.contains(&c))
        })
        .count();

    (hits as f32 / words.len() as f32).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[Language] = &Language::ALL;

    #[test]
    fn polish_invoice_header() {
        let d = detect("Faktura VAT nr 12/2024\nSprzedawca: Firma Sp. z o.o.", ALL, 0.15);
        assert_eq!(d.language, Language::Pl);
        assert!(d.score > 0.3);
    }

    #[test]
    fn english_invoice_line() {
        let d = detect("Invoice number 3039 - Total amount due", ALL, 0.15);
        assert_eq!(d.language, Language::En);
    }

    #[test]
    fn german_by_umlauts_and_vocabulary() {
        let d = detect("Rechnung für den Käufer, Gesamtbetrag", ALL, 0.15);
        assert_eq!(d.language, Language::De);
    }

    #[test]
    fn single_letters_are_not_polish() {
        let d = detect("I am in Warsaw", ALL, 0.15);
        assert_eq!(d.language, Language::En);
        assert_eq!(
            detect("I paid with cash at the shop", ALL, 0.15).language,
            Language::En
        );
    }

    #[test]
    fn digits_only_is_unknown() {
        assert_eq!(detect("1234 56,78 99", ALL, 0.15).language, Language::Unknown);
        assert_eq!(detect("", ALL, 0.15).language, Language::Unknown);
    }

    #[test]
    fn weak_evidence_is_unknown() {
        // One English stop word among many unrelated tokens.
        let d = detect("lorem ipsum dolor sit amet consectetur the", ALL, 0.25);
        assert_eq!(d.language, Language::Unknown);
    }

    #[test]
    fn unconfigured_language_never_reported() {
        let d = detect("Rechnung für den Käufer", &[Language::Pl, Language::En], 0.15);
        assert_ne!(d.language, Language::De);
    }

    #[test]
    fn doc_type_from_keywords() {
        assert_eq!(infer_doc_type("FAKTURA VAT nr 1/2024"), DocType::Invoice);
        assert_eq!(infer_doc_type("Invoice 30392B3C-0001"), DocType::Invoice);
        assert_eq!(infer_doc_type("Rechnung Nr. 7"), DocType::Invoice);
        assert_eq!(infer_doc_type("PARAGON FISKALNY"), DocType::Receipt);
        assert_eq!(infer_doc_type("Kassenbon"), DocType::Receipt);
        assert_eq!(infer_doc_type("Meeting notes"), DocType::Generic);
        assert_eq!(
            infer_doc_type("Invoice for receipt 2914-4703"),
            DocType::Invoice
        );
    }

    #[test]
    fn score_is_bounded() {
        let d = detect("faktura faktura faktura", ALL, 0.0);
        assert!((0.0..=1.0).contains(&d.score));
    }
}
