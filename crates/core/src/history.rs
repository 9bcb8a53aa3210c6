//! Most-recently-used record of past searches.

use indexmap::IndexMap;
use lsp_types::{Position, Uri};
use xxhash_rust::xxh3::xxh3_64;

use crate::host::SearchKind;

pub const DEFAULT_HISTORY_CAP: usize = 64;

/// What re-running a history entry means: the original search kind and
/// anchor, not just coordinates.
#[derive(Debug, Clone)]
pub enum Rerun {
    Locations {
        kind: SearchKind,
        uri: Uri,
        position: Position,
    },
    CallHierarchy {
        uri: Uri,
        position: Position,
    },
}

impl Rerun {
    /// Deterministic identity: re-running the same search at the same anchor
    /// dedupes onto one entry.
    pub fn id(&self) -> u64 {
        let key = match self {
            Rerun::Locations {
                kind,
                uri,
                position,
            } => format!(
                "{}|{}|{}:{}",
                kind.title(),
                uri.as_str(),
                position.line,
                position.character
            ),
            Rerun::CallHierarchy { uri, position } => format!(
                "calls|{}|{}:{}",
                uri.as_str(),
                position.line,
                position.character
            ),
        };
        xxh3_64(key.as_bytes())
    }
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: u64,
    pub label: String,
    pub description: String,
    pub rerun: Rerun,
}

/// Bounded MRU collection of search anchors. Re-adding an existing id moves
/// it to the front; beyond the cap, the oldest entry is evicted.
pub struct SessionHistory {
    entries: IndexMap<u64, HistoryEntry>,
    cap: usize,
}

impl Default for SessionHistory {
    fn default() -> Self {
        Self::with_cap(DEFAULT_HISTORY_CAP)
    }
}

impl SessionHistory {
    pub fn with_cap(cap: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            cap: cap.max(1),
        }
    }

    pub fn add(&mut self, entry: HistoryEntry) {
        self.entries.shift_remove(&entry.id);
        self.entries.insert(entry.id, entry);
        while self.entries.len() > self.cap {
            self.entries.shift_remove_index(0);
        }
    }

    pub fn get(&self, id: u64) -> Option<&HistoryEntry> {
        self.entries.get(&id)
    }

    pub fn remove(&mut self, id: u64) -> Option<HistoryEntry> {
        self.entries.shift_remove(&id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most-recently-added first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.values().rev()
    }
}
