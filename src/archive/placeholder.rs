//! Placeholder substitution for packaged HTML.
//!
//! Every edit is located in the *source* HTML before anything is written,
//! then all edits are applied in one pass. Injected JSON or script can
//! therefore contain the placeholder tokens or `</body>` without being
//! scanned again, and each category is substituted exactly once.

use crate::pipeline::html::{DATA_PLACEHOLDER, SCRIPT_PLACEHOLDER};

/// `<script>window.data = <pretty JSON>;</script>`.
///
/// `</` is escaped as `<\/` so string values cannot close the script element.
pub fn data_snippet(value: &serde_json::Value) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string_pretty(value)?.replace("</", "<\\/");
    Ok(format!("<script>window.data = {json};</script>"))
}

/// `<script>\n<js>\n</script>`.
pub fn script_snippet(js: &str) -> String {
    format!("<script>\n{js}\n</script>")
}

struct Edit {
    at: usize,
    remove: usize,
    insert: String,
}

/// Substitute `data` for the data token and `script` (if any) for the
/// script token. A missing token means insertion before the last
/// `</body>`, or appending when there is no `</body>`. With no script the
/// script token is left untouched.
pub fn inject(html: &str, data: &str, script: Option<&str>) -> String {
    let lower = html.to_ascii_lowercase();
    let body_end = lower.rfind("</body>");

    let placement = |token: &str, snippet: &str| -> Edit {
        match html.find(token) {
            Some(at) => Edit {
                at,
                remove: token.len(),
                insert: snippet.to_string(),
            },
            None => match body_end {
                Some(at) => Edit {
                    at,
                    remove: 0,
                    insert: format!("{snippet}\n"),
                },
                None => Edit {
                    at: html.len(),
                    remove: 0,
                    insert: format!("\n{snippet}"),
                },
            },
        }
    };

    let mut edits = vec![placement(DATA_PLACEHOLDER, data)];
    if let Some(js) = script {
        edits.push(placement(SCRIPT_PLACEHOLDER, js));
    }
    // Stable: at a shared anchor data stays ahead of script.
    edits.sort_by_key(|e| e.at);

    let extra: usize = edits.iter().map(|e| e.insert.len()).sum();
    let mut out = String::with_capacity(html.len() + extra);
    let mut cursor = 0;
    for edit in edits {
        out.push_str(&html[cursor..edit.at]);
        out.push_str(&edit.insert);
        cursor = edit.at + edit.remove;
    }
    out.push_str(&html[cursor..]);
    out
}
