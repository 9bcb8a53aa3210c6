//! The result tree: an arena of folder/file/reference nodes.
//!
//! All nodes of one session live in a single `Vec`; parents and children
//! refer to each other through [`NodeId`] handles. A handle carries the
//! owning tree's nonce, so a handle kept across a session swap fails
//! validation instead of aliasing a node of the new tree.

mod mutate;
mod nav;

use std::sync::atomic::{AtomicU32, Ordering};

use lsp_types::{Location, Position, Range, Uri};

static TREE_NONCE: AtomicU32 = AtomicU32::new(1);

/// Path separator used when compacted folder names are joined.
pub const FOLDER_SEPARATOR: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    tree: u32,
    index: u32,
}

#[derive(Debug)]
pub struct FolderData {
    pub name: String,
    pub folders: Vec<NodeId>,
    pub files: Vec<NodeId>,
}

#[derive(Debug)]
pub struct FileData {
    /// Normalized document identity: the location URI with any sub-document
    /// fragment stripped.
    pub identity: String,
    pub uri: Uri,
    pub refs: Vec<NodeId>,
}

#[derive(Debug)]
pub struct RefData {
    pub location: Location,
}

#[derive(Debug)]
pub enum NodeKind {
    Folder(FolderData),
    File(FileData),
    Reference(RefData),
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
    pub(crate) alive: bool,
}

/// Where a structural change happened, for subtree-scoped refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeScope {
    /// A top-level child changed; refresh the whole view.
    Root,
    /// Only the children of this node changed.
    Node(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeChange {
    pub scope: ChangeScope,
}

/// How locations are grouped into top-level children.
#[derive(Debug, Clone, Default)]
pub enum Grouping {
    /// One flat list of files.
    #[default]
    Flat,
    /// Files nested under per-path-segment folders, compacted. Segments are
    /// taken relative to `base` (the workspace root in an editor host).
    ByFolder { base: Option<String> },
}

#[derive(Debug)]
pub struct RefTree {
    id: u32,
    pub(crate) nodes: Vec<Node>,
    pub(crate) roots: Vec<NodeId>,
    leaf_count: usize,
    folder_grouped: bool,
}

/// Strips the `#fragment` suffix, if any, from a URI string.
pub fn normalize_identity(uri: &Uri) -> String {
    let s = uri.as_str();
    match s.find('#') {
        Some(i) => s[..i].to_string(),
        None => s.to_string(),
    }
}

impl RefTree {
    /// Groups raw locations into the tree. Files are ordered by identity
    /// string, references within a file ascending by start position; the
    /// order is fixed at construction and never disturbed by removals.
    pub fn build(locations: Vec<Location>, grouping: &Grouping) -> Self {
        let mut tree = Self {
            id: TREE_NONCE.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            roots: Vec::new(),
            leaf_count: 0,
            folder_grouped: matches!(grouping, Grouping::ByFolder { .. }),
        };

        let mut sorted: Vec<(String, Location)> = locations
            .into_iter()
            .map(|loc| (normalize_identity(&loc.uri), loc))
            .collect();
        sorted.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.range.start.cmp(&b.1.range.start))
        });

        let mut files: Vec<NodeId> = Vec::new();
        for (identity, location) in sorted {
            let file = match files.last().copied() {
                Some(id) if tree.file(id).identity == identity => id,
                _ => {
                    let id = tree.push(NodeKind::File(FileData {
                        identity,
                        uri: location.uri.clone(),
                        refs: Vec::new(),
                    }));
                    files.push(id);
                    id
                }
            };
            let leaf = tree.push(NodeKind::Reference(RefData { location }));
            tree.node_mut(leaf).parent = Some(file);
            tree.file_mut(file).refs.push(leaf);
            tree.leaf_count += 1;
        }

        match grouping {
            Grouping::Flat => tree.roots = files,
            Grouping::ByFolder { base } => {
                tree.group_into_folders(files, base.as_deref());
                tree.compact_roots();
            }
        }
        tree
    }

    fn group_into_folders(&mut self, files: Vec<NodeId>, base: Option<&str>) {
        for file in files {
            let segments = folder_segments(&self.file(file).identity, base);
            let mut parent: Option<NodeId> = None;
            for segment in segments {
                parent = Some(self.folder_child(parent, &segment));
            }
            match parent {
                Some(folder) => {
                    self.node_mut(file).parent = Some(folder);
                    self.folder_mut(folder).files.push(file);
                }
                None => self.roots.push(file),
            }
        }
    }

    /// Finds or creates the named subfolder of `parent` (root when `None`).
    fn folder_child(&mut self, parent: Option<NodeId>, name: &str) -> NodeId {
        let siblings = match parent {
            Some(p) => &self.folder(p).folders,
            None => &self.roots,
        };
        for &id in siblings {
            if let NodeKind::Folder(f) = &self.node(id).kind {
                if f.name == name {
                    return id;
                }
            }
        }
        let id = self.push(NodeKind::Folder(FolderData {
            name: name.to_string(),
            folders: Vec::new(),
            files: Vec::new(),
        }));
        self.node_mut(id).parent = parent;
        match parent {
            Some(p) => self.folder_mut(p).folders.push(id),
            None => self.roots.push(id),
        }
        id
    }

    // ---- handle plumbing ----

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let index = self.nodes.len() as u32;
        self.nodes.push(Node {
            parent: None,
            kind,
            alive: true,
        });
        NodeId {
            tree: self.id,
            index,
        }
    }

    /// A handle is valid only if it was minted by this tree and its node has
    /// not been removed. Handles from a superseded session fail here.
    pub fn is_valid(&self, id: NodeId) -> bool {
        id.tree == self.id && (id.index as usize) < self.nodes.len() && self.nodes[id.index as usize].alive
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index as usize]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index as usize]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub(crate) fn file(&self, id: NodeId) -> &FileData {
        match &self.node(id).kind {
            NodeKind::File(f) => f,
            _ => unreachable!("node is not a file"),
        }
    }

    pub(crate) fn file_mut(&mut self, id: NodeId) -> &mut FileData {
        match &mut self.node_mut(id).kind {
            NodeKind::File(f) => f,
            _ => unreachable!("node is not a file"),
        }
    }

    pub(crate) fn folder(&self, id: NodeId) -> &FolderData {
        match &self.node(id).kind {
            NodeKind::Folder(f) => f,
            _ => unreachable!("node is not a folder"),
        }
    }

    pub(crate) fn folder_mut(&mut self, id: NodeId) -> &mut FolderData {
        match &mut self.node_mut(id).kind {
            NodeKind::Folder(f) => f,
            _ => unreachable!("node is not a folder"),
        }
    }

    // ---- queries ----

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub(crate) fn folder_grouped(&self) -> bool {
        self.folder_grouped
    }

    /// Count of all reference leaves, maintained incrementally.
    pub fn total(&self) -> usize {
        self.leaf_count
    }

    pub(crate) fn leaf_count_sub(&mut self, n: usize) {
        self.leaf_count -= n;
    }

    /// Presentation-ordered children: subfolders before files for folders,
    /// references for files, nothing for leaves.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match &self.node(id).kind {
            NodeKind::Folder(f) => f.folders.iter().chain(f.files.iter()).copied().collect(),
            NodeKind::File(f) => f.refs.clone(),
            NodeKind::Reference(_) => Vec::new(),
        }
    }

    /// All files in presentation order (depth-first through folders).
    pub fn files_in_order(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for &root in &self.roots {
            self.collect_files(root, &mut out);
        }
        out
    }

    fn collect_files(&self, id: NodeId, out: &mut Vec<NodeId>) {
        match &self.node(id).kind {
            NodeKind::File(_) => out.push(id),
            NodeKind::Folder(f) => {
                for &sub in &f.folders {
                    self.collect_files(sub, out);
                }
                out.extend(f.files.iter().copied());
            }
            NodeKind::Reference(_) => {}
        }
    }

    pub fn file_for_identity(&self, identity: &str) -> Option<NodeId> {
        self.files_in_order()
            .into_iter()
            .find(|&id| self.file(id).identity == identity)
    }

    /// Reference ranges inside the given document, for editor highlights.
    pub fn ranges_in(&self, identity: &str) -> Vec<Range> {
        let Some(file) = self.file_for_identity(identity) else {
            return Vec::new();
        };
        self.file(file)
            .refs
            .iter()
            .map(|&r| self.reference(r).location.range)
            .collect()
    }

    pub(crate) fn reference(&self, id: NodeId) -> &RefData {
        match &self.node(id).kind {
            NodeKind::Reference(r) => r,
            _ => unreachable!("node is not a reference"),
        }
    }

    pub fn location(&self, id: NodeId) -> Option<&Location> {
        match &self.node(id).kind {
            NodeKind::Reference(r) => Some(&r.location),
            _ => None,
        }
    }
}

pub(crate) fn range_contains(range: &Range, position: Position) -> bool {
    range.start <= position && position <= range.end
}

/// Splits a document identity into folder path segments below `base`.
/// The trailing segment (the file name itself) is not a folder.
fn folder_segments(identity: &str, base: Option<&str>) -> Vec<String> {
    let path = match base {
        Some(base) if identity_path(identity).starts_with(base) => {
            &identity_path(identity)[base.len()..]
        }
        _ => identity_path(identity),
    };
    let mut segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    segments.pop();
    segments
}

/// The path portion of an identity string (after `scheme://authority`).
fn identity_path(identity: &str) -> &str {
    match identity.find("://") {
        Some(i) => {
            let rest = &identity[i + 3..];
            match rest.find('/') {
                Some(j) => &rest[j..],
                None => "",
            }
        }
        None => identity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn groups_by_identity_and_sorts_by_position() {
        let tree = RefTree::build(
            vec![
                loc("file:///b.ts", 3),
                loc("file:///a.ts", 10),
                loc("file:///a.ts", 2),
            ],
            &Grouping::Flat,
        );
        assert_eq!(tree.roots().len(), 2);
        assert_eq!(tree.total(), 3);

        let a = tree.roots()[0];
        assert_eq!(tree.file(a).identity, "file:///a.ts");
        let refs = tree.children(a);
        assert_eq!(refs.len(), 2);
        assert_eq!(tree.location(refs[0]).unwrap().range.start.line, 2);
        assert_eq!(tree.location(refs[1]).unwrap().range.start.line, 10);
    }

    #[test]
    fn fragment_is_stripped_from_identity() {
        let tree = RefTree::build(
            vec![loc("file:///a.ts#frag", 1), loc("file:///a.ts", 5)],
            &Grouping::Flat,
        );
        assert_eq!(tree.roots().len(), 1);
        assert_eq!(tree.total(), 2);
    }

    #[test]
    fn folder_grouping_compacts_single_child_chains() {
        let tree = RefTree::build(
            vec![loc("file:///root/x/y/a.ts", 1), loc("file:///root/x/y/b.ts", 1)],
            &Grouping::ByFolder {
                base: Some("/root".to_string()),
            },
        );
        assert_eq!(tree.roots().len(), 1);
        let folder = tree.roots()[0];
        assert_eq!(tree.folder(folder).name, "x/y");
        assert_eq!(tree.folder(folder).files.len(), 2);
    }

    #[test]
    fn stale_handle_from_another_tree_is_invalid() {
        let old = RefTree::build(vec![loc("file:///a.ts", 1)], &Grouping::Flat);
        let stale = old.roots()[0];
        let new = RefTree::build(vec![loc("file:///a.ts", 1)], &Grouping::Flat);
        assert!(!new.is_valid(stale));
        assert!(new.is_valid(new.roots()[0]));
    }
}
