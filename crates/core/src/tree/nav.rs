//! Navigation over the result tree: nearest-node selection and
//! next/previous traversal.
//!
//! Traversal policy: stepping crosses file and folder boundaries, but does
//! not wrap at the top level. Past the last (or first) top-level node the
//! step yields `None`.

use lsp_types::Position;

use super::{range_contains, NodeId, NodeKind, RefTree};

impl RefTree {
    /// Best-effort anchor selection for initial focus.
    ///
    /// Exact containment first, nearby-after second, then the file whose raw
    /// identity string shares the longest common prefix with the anchor's.
    /// Identity strings are compared as-is, not as structured paths.
    pub fn nearest(&self, identity: &str, position: Position) -> Option<NodeId> {
        if let Some(file) = self.file_for_identity(identity) {
            let refs = &self.file(file).refs;
            for &r in refs {
                if range_contains(&self.reference(r).location.range, position) {
                    return Some(r);
                }
            }
            for &r in refs {
                if self.reference(r).location.range.end > position {
                    return Some(r);
                }
            }
            return refs.last().copied();
        }

        let mut best: Option<NodeId> = None;
        let mut best_len = 0usize;
        for file in self.files_in_order() {
            let len = common_prefix_len(identity, &self.file(file).identity);
            if best.is_none() || len > best_len {
                best = Some(file);
                best_len = len;
            }
        }
        best.and_then(|file| self.file(file).refs.first().copied())
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.step(id, true)
    }

    pub fn previous(&self, id: NodeId) -> Option<NodeId> {
        self.step(id, false)
    }

    fn step(&self, id: NodeId, forward: bool) -> Option<NodeId> {
        if !self.is_valid(id) {
            return None;
        }
        match &self.node(id).kind {
            NodeKind::Reference(_) => {
                let file = self.parent(id)?;
                let refs = &self.file(file).refs;
                let idx = refs.iter().position(|&r| r == id)?;
                if forward && idx + 1 < refs.len() {
                    return Some(refs[idx + 1]);
                }
                if !forward && idx > 0 {
                    return Some(refs[idx - 1]);
                }
                let adjacent = self.step_file(file, forward)?;
                self.edge_leaf(adjacent, forward)
            }
            NodeKind::File(_) => {
                let adjacent = self.step_file(id, forward)?;
                self.edge_leaf(adjacent, forward)
            }
            NodeKind::Folder(_) => self.step_container(id, forward),
        }
    }

    /// The adjacent file in presentation order, stopping at either end.
    fn step_file(&self, file: NodeId, forward: bool) -> Option<NodeId> {
        let files = self.files_in_order();
        let idx = files.iter().position(|&f| f == file)?;
        if forward {
            files.get(idx + 1).copied()
        } else {
            idx.checked_sub(1).map(|i| files[i])
        }
    }

    /// Sibling step for folders: adjacent sibling's first/last descendant
    /// leaf, ascending when the sibling list is exhausted.
    fn step_container(&self, id: NodeId, forward: bool) -> Option<NodeId> {
        let siblings = match self.parent(id) {
            Some(p) => self.children(p),
            None => self.roots.clone(),
        };
        let idx = siblings.iter().position(|&s| s == id)?;
        let adjacent = if forward {
            siblings.get(idx + 1).copied()
        } else {
            idx.checked_sub(1).map(|i| siblings[i])
        };
        match adjacent {
            Some(sibling) => self.edge_leaf(sibling, forward),
            None => match self.parent(id) {
                Some(p) => self.step_container(p, forward),
                None => None,
            },
        }
    }

    /// First (or last) descendant reference leaf of a node. For folders this
    /// recurses through subfolders before (after) the folder's own files,
    /// matching presentation order.
    fn edge_leaf(&self, id: NodeId, first: bool) -> Option<NodeId> {
        match &self.node(id).kind {
            NodeKind::Reference(_) => Some(id),
            NodeKind::File(f) => {
                if first {
                    f.refs.first().copied()
                } else {
                    f.refs.last().copied()
                }
            }
            NodeKind::Folder(_) => {
                let children = self.children(id);
                let pick = if first {
                    children.first()
                } else {
                    children.last()
                };
                pick.and_then(|&c| self.edge_leaf(c, first))
            }
        }
    }
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}
