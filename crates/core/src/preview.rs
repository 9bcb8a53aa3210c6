//! Snippet extraction for tree-row labels and clipboard output.

use lsp_types::{Position, Range};

use crate::host::Document;

/// How far the start boundary is pulled left before word snapping.
pub const PREVIEW_LEAD: u32 = 8;
/// How much trailing context follows the match. Deliberately generous so
/// clipboard output stays legible; the line end clamps it for labels.
pub const PREVIEW_TAIL: u32 = 331;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub before: String,
    pub matched: String,
    pub after: String,
}

impl Preview {
    pub fn label(&self) -> String {
        format!("{}{}{}", self.before, self.matched, self.after)
    }
}

/// Computes a trimmed before/match/after snippet around `range`.
///
/// The start boundary moves left by `before_len` characters on the same line
/// and then snaps outward to the start of the word it lands in, if any. The
/// end boundary moves right by [`PREVIEW_TAIL`] characters, intentionally not
/// word-snapped. `trim` strips leading whitespace from `before` and trailing
/// whitespace from `after`.
pub fn preview(doc: &Document, range: &Range, before_len: u32, trim: bool) -> Preview {
    let lead = Position::new(
        range.start.line,
        range.start.character.saturating_sub(before_len),
    );
    let lead = match doc.word_range_at(lead) {
        // Snap outward only; a word range never starts past the probe point.
        Some(word) if word.start <= lead => word.start,
        _ => lead,
    };

    let mut before = doc.text_in(&Range {
        start: lead,
        end: range.start,
    });
    let matched = doc.text_in(range);
    let mut after = doc.text_in(&Range {
        start: range.end,
        end: Position::new(range.end.line, range.end.character.saturating_add(PREVIEW_TAIL)),
    });

    if trim {
        before = before.trim_start().to_string();
        after = after.trim_end().to_string();
    }

    Preview {
        before,
        matched,
        after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::Uri;
    use std::str::FromStr;

    fn doc(text: &str) -> Document {
        Document::new(Uri::from_str("file:///p.rs").unwrap(), text, 1)
    }

    fn range(line: u32, from: u32, to: u32) -> Range {
        Range {
            start: Position::new(line, from),
            end: Position::new(line, to),
        }
    }

    #[test]
    fn snaps_start_to_word_boundary() {
        // Pulling back 8 chars from "target" lands inside "beautiful";
        // the boundary must snap out to its start.
        let d = doc("the beautiful target value");
        let p = preview(&d, &range(0, 14, 20), PREVIEW_LEAD, true);
        assert_eq!(p.before, "beautiful ");
        assert_eq!(p.matched, "target");
        assert_eq!(p.after, " value");
    }

    #[test]
    fn trims_leading_whitespace_from_before() {
        let d = doc("        target");
        let p = preview(&d, &range(0, 8, 14), PREVIEW_LEAD, true);
        assert_eq!(p.before, "");
        assert_eq!(p.matched, "target");
    }

    #[test]
    fn untrimmed_preview_keeps_whitespace() {
        let d = doc("    target   ");
        let p = preview(&d, &range(0, 4, 10), PREVIEW_LEAD, false);
        assert_eq!(p.before, "    ");
        assert_eq!(p.after, "   ");
    }

    #[test]
    fn tail_clamps_to_line_end() {
        let d = doc("hit tail");
        let p = preview(&d, &range(0, 0, 3), PREVIEW_LEAD, true);
        assert_eq!(p.after, " tail");
    }
}
