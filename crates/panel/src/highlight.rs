//! Mirrors the active session's locations into editor decorations for the
//! document the user is looking at.

use dashmap::DashSet;
use lsp_types::{Range, Uri};

use reftree_core::session::ResultSession;
use reftree_core::tree::normalize_identity;

/// Tracks which documents have been edited since the session was created;
/// their highlights are suppressed rather than shown at stale offsets.
#[derive(Default)]
pub struct HighlightSync {
    dirty: DashSet<String>,
}

impl HighlightSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_edited(&self, uri: &Uri) {
        self.dirty.insert(normalize_identity(uri));
    }

    /// A new session starts clean.
    pub fn session_replaced(&self) {
        self.dirty.clear();
    }

    /// Decoration ranges for `uri` under the given session. Empty when no
    /// session is active, the document has no results, or it was edited.
    pub fn highlights(&self, session: Option<&ResultSession>, uri: &Uri) -> Vec<Range> {
        let Some(session) = session else {
            return Vec::new();
        };
        if self.dirty.contains(&normalize_identity(uri)) {
            return Vec::new();
        }
        session.ranges_in(uri)
    }
}
