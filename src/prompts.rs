//! Prompts for the vision-model layout classifier.
//!
//! Kept apart from [`crate::pipeline::vision`] so the wording can change
//! without touching provider or parsing code, and so tests can inspect it.

/// System prompt asking a VLM to segment a page image into typed blocks.
pub const LAYOUT_SYSTEM_PROMPT: &str = r#"You are a document layout analyser. You receive one scanned page of a business document (often an invoice or a receipt, in Polish, English or German).

Segment the page into blocks and classify the page.

1. BLOCK TYPES
   - "header": letterhead, title, document number and dates at the top
   - "table": line items, price tables, any ruled or column-aligned grid
   - "content": addresses, paragraphs, totals, notes
   - "footer": bank details, signatures, page numbers at the bottom

2. COORDINATES
   - Give every block a bounding box in pixels of the supplied image
   - x and y are the top-left corner, width and height are positive
   - Blocks must not overlap; list them top to bottom, left to right

3. PAGE LAYOUT
   - "invoice" when the page has itemised tables
   - "receipt" for narrow till receipts
   - "generic" otherwise

4. OUTPUT FORMAT
   - Output ONLY a JSON object, no commentary, no markdown fences:
     {"layout": "...", "blocks": [{"type": "...", "x": 0, "y": 0, "width": 0, "height": 0, "bold": false}]}
   - Do NOT transcribe the text"#;

/// User turn accompanying the page image.
pub fn layout_user_prompt(width: u32, height: u32) -> String {
    format!("The page image is {width}x{height} pixels. Return the layout JSON.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_every_block_type() {
        for tag in ["\"header\"", "\"table\"", "\"content\"", "\"footer\""] {
            assert!(LAYOUT_SYSTEM_PROMPT.contains(tag), "missing {tag}");
        }
    }

    #[test]
    fn user_prompt_carries_dimensions() {
        assert!(layout_user_prompt(1240, 1754).contains("1240x1754"));
    }
}
