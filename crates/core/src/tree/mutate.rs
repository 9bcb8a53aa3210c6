//! Structural mutation: node removal, empty-ancestor cleanup, and folder
//! compaction.

use super::{ChangeScope, NodeId, NodeKind, RefTree, TreeChange, FOLDER_SEPARATOR};

impl RefTree {
    /// Removes a node and cleans up now-empty ancestors.
    ///
    /// Ancestors left with zero children are deleted too, walking upward
    /// until a non-empty ancestor (or the root) is reached. In
    /// folder-grouping mode the nearest surviving ancestor is re-compacted
    /// afterwards. Returns the change scoped at the smallest node whose
    /// children changed, or `None` if the handle does not belong to this
    /// tree (a stale reference from a superseded session).
    pub fn remove(&mut self, id: NodeId) -> Option<TreeChange> {
        if !self.is_valid(id) {
            return None;
        }
        let leaves = self.count_leaves(id);
        self.kill_subtree(id);

        let mut target = id;
        loop {
            let parent = self.parent(target);
            self.detach(target);
            self.node_mut(target).alive = false;

            match parent {
                None => {
                    self.leaf_count_sub(leaves);
                    return Some(TreeChange {
                        scope: ChangeScope::Root,
                    });
                }
                Some(p) => {
                    if self.child_count(p) == 0 {
                        target = p;
                        continue;
                    }
                    self.leaf_count_sub(leaves);
                    let scope = self.compact_after_removal(p);
                    return Some(TreeChange { scope });
                }
            }
        }
    }

    fn detach(&mut self, id: NodeId) {
        match self.parent(id) {
            None => self.roots.retain(|&r| r != id),
            Some(p) => match &mut self.node_mut(p).kind {
                NodeKind::Folder(f) => {
                    f.folders.retain(|&c| c != id);
                    f.files.retain(|&c| c != id);
                }
                NodeKind::File(f) => f.refs.retain(|&c| c != id),
                NodeKind::Reference(_) => {}
            },
        }
    }

    fn child_count(&self, id: NodeId) -> usize {
        match &self.node(id).kind {
            NodeKind::Folder(f) => f.folders.len() + f.files.len(),
            NodeKind::File(f) => f.refs.len(),
            NodeKind::Reference(_) => 0,
        }
    }

    fn count_leaves(&self, id: NodeId) -> usize {
        match &self.node(id).kind {
            NodeKind::Reference(_) => 1,
            _ => self
                .children(id)
                .into_iter()
                .map(|c| self.count_leaves(c))
                .sum(),
        }
    }

    fn kill_subtree(&mut self, id: NodeId) {
        for child in self.children(id) {
            self.kill_subtree(child);
        }
        self.node_mut(id).alive = false;
    }

    /// Only the surviving ancestor can newly violate the compaction rule:
    /// ancestors above it kept their child counts, and merging a chain does
    /// not change the merged folder's own counts. The recursion below it is
    /// still run, per the rule's definition.
    fn compact_after_removal(&mut self, survivor: NodeId) -> ChangeScope {
        if !self.folder_grouped() || !matches!(self.node(survivor).kind, NodeKind::Folder(_)) {
            return ChangeScope::Node(survivor);
        }
        let merged = self.chain_merge(survivor);
        self.compact_folder_children(merged);
        if merged == survivor {
            ChangeScope::Node(survivor)
        } else {
            match self.parent(merged) {
                Some(gp) => ChangeScope::Node(gp),
                None => ChangeScope::Root,
            }
        }
    }

    /// Merges a chain of zero-file, single-subfolder folders starting at
    /// `folder`, joining names with [`FOLDER_SEPARATOR`] and re-pointing the
    /// surviving folder at the original parent. Returns the survivor.
    fn chain_merge(&mut self, mut folder: NodeId) -> NodeId {
        loop {
            let mergeable = matches!(
                &self.node(folder).kind,
                NodeKind::Folder(f) if f.files.is_empty() && f.folders.len() == 1
            );
            if !mergeable {
                return folder;
            }
            let child = self.folder(folder).folders[0];
            let joined = format!(
                "{}{}{}",
                self.folder(folder).name,
                FOLDER_SEPARATOR,
                self.folder(child).name
            );
            self.folder_mut(child).name = joined;

            let parent = self.parent(folder);
            self.node_mut(child).parent = parent;
            let list = match parent {
                Some(p) => &mut self.folder_mut(p).folders,
                None => &mut self.roots,
            };
            if let Some(slot) = list.iter_mut().find(|s| **s == folder) {
                *slot = child;
            }
            self.node_mut(folder).alive = false;
            folder = child;
        }
    }

    fn compact_folder_children(&mut self, folder: NodeId) {
        let subs = self.folder(folder).folders.clone();
        for sub in subs {
            let merged = self.chain_merge(sub);
            self.compact_folder_children(merged);
        }
    }

    /// Build-time compaction of the whole tree, root level downward.
    pub(crate) fn compact_roots(&mut self) {
        let roots = self.roots.clone();
        for root in roots {
            if matches!(self.node(root).kind, NodeKind::Folder(_)) {
                let merged = self.chain_merge(root);
                self.compact_folder_children(merged);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Grouping;
    use lsp_types::{Location, Position, Range, Uri};
    use std::str::FromStr;

    fn loc(uri: &str, line: u32) -> Location {
        Location {
            uri: Uri::from_str(uri).unwrap(),
            range: Range {
                start: Position::new(line, 0),
                end: Position::new(line, 4),
            },
        }
    }

    #[test]
    fn removing_last_reference_prunes_the_file() {
        let mut tree = RefTree::build(
            vec![
                loc("file:///a.ts", 10),
                loc("file:///a.ts", 12),
                loc("file:///b.ts", 3),
            ],
            &Grouping::Flat,
        );
        let b = tree.roots()[1];
        let only = tree.children(b)[0];

        let change = tree.remove(only).unwrap();
        assert_eq!(change.scope, ChangeScope::Root);
        assert_eq!(tree.roots().len(), 1);
        assert_eq!(tree.total(), 2);
        assert!(!tree.is_valid(b));
    }

    #[test]
    fn removing_a_reference_notifies_at_its_file() {
        let mut tree = RefTree::build(
            vec![loc("file:///a.ts", 10), loc("file:///a.ts", 12)],
            &Grouping::Flat,
        );
        let a = tree.roots()[0];
        let first = tree.children(a)[0];

        let change = tree.remove(first).unwrap();
        assert_eq!(change.scope, ChangeScope::Node(a));
        assert_eq!(tree.total(), 1);
    }

    #[test]
    fn removal_cascades_through_folders_and_recompacts() {
        // x/ holds c.ts plus the chain y/z/ holding a.ts; removing a.ts's
        // sole reference must delete a.ts, z, and y, in one call.
        let mut tree = RefTree::build(
            vec![loc("file:///x/y/z/a.ts", 1), loc("file:///x/c.ts", 1)],
            &Grouping::ByFolder { base: None },
        );
        let x = tree.roots()[0];
        assert_eq!(tree.folder(x).name, "x");
        let yz = tree.folder(x).folders[0];
        assert_eq!(tree.folder(yz).name, "y/z");
        let a = tree.folder(yz).files[0];
        let leaf = tree.children(a)[0];

        let change = tree.remove(leaf).unwrap();
        assert_eq!(change.scope, ChangeScope::Node(x));
        assert!(tree.folder(x).folders.is_empty());
        assert_eq!(tree.folder(x).files.len(), 1);
        assert_eq!(tree.total(), 1);
    }

    #[test]
    fn survivor_left_with_single_subfolder_is_merged() {
        // root folder r has one file f.ts and a subfolder chain; removing
        // f.ts's reference leaves r with zero files and one subfolder, so r
        // itself must merge and the change escalates to root scope.
        let mut tree = RefTree::build(
            vec![loc("file:///r/f.ts", 1), loc("file:///r/s/a.ts", 1)],
            &Grouping::ByFolder { base: None },
        );
        let r = tree.roots()[0];
        let f = tree.folder(r).files[0];
        let leaf = tree.children(f)[0];

        let change = tree.remove(leaf).unwrap();
        assert_eq!(change.scope, ChangeScope::Root);
        let merged = tree.roots()[0];
        assert_eq!(tree.folder(merged).name, "r/s");
        assert_eq!(tree.folder(merged).files.len(), 1);
    }

    #[test]
    fn no_live_folder_violates_the_compaction_invariant() {
        let mut tree = RefTree::build(
            vec![
                loc("file:///p/q/a.ts", 1),
                loc("file:///p/q/deep/b.ts", 1),
                loc("file:///p/other/c.ts", 1),
            ],
            &Grouping::ByFolder { base: None },
        );
        // Remove leaves in an order that empties folders one by one.
        while tree.total() > 0 {
            let file = tree.files_in_order()[0];
            let leaf = tree.children(file)[0];
            tree.remove(leaf);
            assert_compacted(&tree);
        }
        assert!(tree.is_empty());
    }

    fn assert_compacted(tree: &RefTree) {
        for (index, node) in tree.nodes.iter().enumerate() {
            if !node.alive {
                continue;
            }
            if let NodeKind::Folder(f) = &node.kind {
                assert!(
                    !(f.files.is_empty() && f.folders.len() == 1),
                    "folder {} at {} violates compaction",
                    f.name,
                    index
                );
            }
        }
    }

    #[test]
    fn stale_handle_removal_is_a_no_op() {
        let old = RefTree::build(vec![loc("file:///a.ts", 1)], &Grouping::Flat);
        let stale = old.roots()[0];
        let mut tree = RefTree::build(vec![loc("file:///a.ts", 1)], &Grouping::Flat);
        assert!(tree.remove(stale).is_none());
        assert_eq!(tree.total(), 1);
    }
}
