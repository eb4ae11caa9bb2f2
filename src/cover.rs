//! Cover page listing the batch's categories.

use crate::config::LETTER;
use crate::error::DocbindError;
use crate::pipeline::compose::{Face, PageComposer};
use crate::pipeline::convert::ConvertedDocument;

/// Build a single letter-size cover page with one line per distinct
/// category, in first-seen order. Whitespace-only labels are listed as
/// `(unlabeled)` so the line count still matches the category count.
pub fn make_cover<S: AsRef<str>>(labels: &[S]) -> Result<ConvertedDocument, DocbindError> {
    let mut seen: Vec<String> = Vec::new();
    for label in labels {
        let trimmed = label.as_ref().trim();
        let entry = if trimmed.is_empty() {
            "(unlabeled)".to_string()
        } else {
            trimmed.to_string()
        };
        if !seen.contains(&entry) {
            seen.push(entry);
        }
    }

    let (w, h) = LETTER;
    let mut composer = PageComposer::new(w, h);
    composer.gap(72.0);
    composer.text_line("Contents", Face::Bold, 28.0);
    composer.rule();
    composer.gap(18.0);
    for (i, category) in seen.iter().enumerate() {
        composer.text_line(&format!("{}. {category}", i + 1), Face::Regular, 14.0);
    }
    composer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cover_text(doc: &ConvertedDocument) -> String {
        doc.doc
            .objects
            .values()
            .filter_map(|o| match o {
                lopdf::Object::Stream(s) => Some(String::from_utf8_lossy(&s.content).into_owned()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn lists_categories_first_seen_deduplicated() {
        let cover = make_cover(&["INV", "PO", "INV", "RCPT"]).unwrap();
        assert_eq!(cover.pages.len(), 1);
        let text = cover_text(&cover);
        let inv = text.find("1. INV").expect("INV first");
        let po = text.find("2. PO").expect("PO second");
        let rcpt = text.find("3. RCPT").expect("RCPT third");
        assert!(inv < po && po < rcpt);
        assert_eq!(text.matches("INV").count(), 1, "deduplicated");
    }

    #[test]
    fn blank_labels_show_as_unlabeled() {
        let cover = make_cover(&["  ", "A", ""]).unwrap();
        let text = cover_text(&cover);
        // parens are escaped inside PDF string literals
        assert!(text.contains(r"\(unlabeled\)"), "got: {text}");
        assert_eq!(text.matches(r"\(unlabeled\)").count(), 1);
    }
}
