//! Interfaces to the host editor and the language service.
//!
//! The core never talks to an editor directly; everything it needs from the
//! outside world comes through these traits, which keeps the model and the
//! engines testable with in-memory stubs.

use std::sync::Arc;

use async_trait::async_trait;
use lsp_types::{Location, Position, Range, Uri};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Which relationship a search asks the language service for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchKind {
    References,
    Implementations,
}

impl SearchKind {
    pub fn title(&self) -> &'static str {
        match self {
            SearchKind::References => "References",
            SearchKind::Implementations => "Implementations",
        }
    }
}

/// Call-hierarchy expansion direction. Persisted across sessions via
/// [`SettingsStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

/// Immutable snapshot of one open text document.
pub struct Document {
    pub uri: Uri,
    pub version: i32,
    text: String,
}

impl Document {
    pub fn new(uri: Uri, text: impl Into<String>, version: i32) -> Self {
        Self {
            uri,
            version,
            text: text.into(),
        }
    }

    pub fn line(&self, line: u32) -> Option<&str> {
        self.text.lines().nth(line as usize)
    }

    /// Text covered by `range`, clamped to the document. Positions use
    /// UTF-16 column units, as the host editor reports them.
    pub fn text_in(&self, range: &Range) -> String {
        if range.start.line == range.end.line {
            let Some(line) = self.line(range.start.line) else {
                return String::new();
            };
            let from = utf16_col_to_byte_col(line, range.start.character as usize);
            let to = utf16_col_to_byte_col(line, range.end.character as usize);
            return line[from..to.max(from)].to_string();
        }

        let mut out = String::new();
        for n in range.start.line..=range.end.line {
            let Some(line) = self.line(n) else { break };
            if n == range.start.line {
                let from = utf16_col_to_byte_col(line, range.start.character as usize);
                out.push_str(&line[from..]);
            } else if n == range.end.line {
                let to = utf16_col_to_byte_col(line, range.end.character as usize);
                out.push('\n');
                out.push_str(&line[..to]);
            } else {
                out.push('\n');
                out.push_str(line);
            }
        }
        out
    }

    /// Range of the identifier word at `position`, if the position lands on
    /// one. Word characters are alphanumerics plus `_` and `$`.
    pub fn word_range_at(&self, position: Position) -> Option<Range> {
        let line = self.line(position.line)?;
        let col = utf16_col_to_byte_col(line, position.character as usize);

        let is_ident = |c: char| c.is_alphanumeric() || c == '_' || c == '$';

        let start = line[..col.min(line.len())]
            .rfind(|c| !is_ident(c))
            .map(|i| i + 1)
            .unwrap_or(0);

        let end = line[col.min(line.len())..]
            .find(|c| !is_ident(c))
            .map(|i| i + col)
            .unwrap_or(line.len());

        if start < end {
            Some(Range {
                start: Position::new(position.line, byte_col_to_utf16_col(line, start) as u32),
                end: Position::new(position.line, byte_col_to_utf16_col(line, end) as u32),
            })
        } else {
            None
        }
    }
}

pub fn utf16_col_to_byte_col(line: &str, utf16_col: usize) -> usize {
    let mut curr_utf16 = 0;
    let mut curr_byte = 0;

    for c in line.chars() {
        if curr_utf16 >= utf16_col {
            break;
        }
        curr_utf16 += c.len_utf16();
        curr_byte += c.len_utf8();
    }
    curr_byte
}

pub fn byte_col_to_utf16_col(line: &str, byte_col: usize) -> usize {
    line[..byte_col.min(line.len())]
        .chars()
        .map(|c| c.len_utf16())
        .sum()
}

/// Text-access collaborator. Opening may hit the filesystem or the editor's
/// in-memory buffer; the core treats it as an opaque async lookup.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn open(&self, uri: &Uri) -> Result<Arc<Document>>;
}

/// The symbol-relationship lookup: one async call from (document, position)
/// to raw locations. `Ok(None)` and `Ok(Some(vec![]))` both mean no results.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn find(
        &self,
        kind: SearchKind,
        uri: &Uri,
        position: Position,
    ) -> Result<Option<Vec<Location>>>;
}

/// One entry of a call hierarchy, as handed back by the language service.
#[derive(Debug, Clone)]
pub struct CallItemPayload {
    pub name: String,
    pub detail: Option<String>,
    pub uri: Uri,
    pub range: Range,
    pub selection_range: Range,
}

/// A caller or callee of some item, plus the call-site ranges implicating it.
#[derive(Debug, Clone)]
pub struct CallLink {
    pub item: CallItemPayload,
    pub sites: Vec<Range>,
}

#[async_trait]
pub trait CallHierarchyProvider: Send + Sync {
    async fn prepare(&self, uri: &Uri, position: Position)
        -> Result<Option<Vec<CallItemPayload>>>;
    async fn incoming(&self, item: &CallItemPayload) -> Result<Vec<CallLink>>;
    async fn outgoing(&self, item: &CallItemPayload) -> Result<Vec<CallLink>>;
}

#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn write(&self, text: &str) -> Result<()>;
}

/// Small key/value settings surface, used only for the call-hierarchy
/// direction toggle.
pub trait SettingsStore: Send + Sync {
    fn read(&self, key: &str) -> Option<serde_json::Value>;
    fn persist(&self, key: &str, value: serde_json::Value);
}
