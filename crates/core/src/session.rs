//! One resolved search and its live tree, plus the memoized request that
//! produces it.

use std::sync::{Arc, Mutex};

use dashmap::{DashMap, DashSet};
use lsp_types::{Position, Range, Uri};
use tokio::sync::{broadcast, watch, OnceCell};

use crate::error::Result;
use crate::history::{HistoryEntry, Rerun};
use crate::host::{Document, DocumentStore, LocationProvider, SearchKind};
use crate::preview::{preview, PREVIEW_LEAD};
use crate::tree::{normalize_identity, Grouping, NodeId, NodeKind, RefTree, TreeChange};

/// The (document, position) pair a search was triggered from.
#[derive(Debug, Clone)]
pub struct Anchor {
    pub uri: Uri,
    pub position: Position,
}

/// Per-node snapshot handed to the presentation layer, so rendering never
/// holds the tree lock.
#[derive(Debug, Clone)]
pub enum NodeInfo {
    Folder {
        name: String,
    },
    File {
        identity: String,
        uri: Uri,
        name: String,
        count: usize,
    },
    Reference {
        uri: Uri,
        range: Range,
    },
}

pub struct ResultSession {
    anchor: Anchor,
    kind: SearchKind,
    tree: Mutex<RefTree>,
    events: broadcast::Sender<TreeChange>,
    store: Arc<dyn DocumentStore>,
    /// One cell per identity; concurrent requests for the same document
    /// await the same open call.
    docs: DashMap<String, Arc<OnceCell<Arc<Document>>>>,
    warming: DashSet<String>,
}

impl ResultSession {
    pub fn new(
        anchor: Anchor,
        kind: SearchKind,
        locations: Vec<lsp_types::Location>,
        grouping: &Grouping,
        store: Arc<dyn DocumentStore>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            anchor,
            kind,
            tree: Mutex::new(RefTree::build(locations, grouping)),
            events,
            store,
            docs: DashMap::new(),
            warming: DashSet::new(),
        })
    }

    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    pub fn kind(&self) -> SearchKind {
        self.kind
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TreeChange> {
        self.events.subscribe()
    }

    pub fn total(&self) -> usize {
        self.tree.lock().unwrap().total()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.lock().unwrap().is_empty()
    }

    pub fn children(&self, of: Option<NodeId>) -> Vec<NodeId> {
        let tree = self.tree.lock().unwrap();
        match of {
            None => tree.roots().to_vec(),
            Some(id) if tree.is_valid(id) => tree.children(id),
            Some(_) => Vec::new(),
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        let tree = self.tree.lock().unwrap();
        if tree.is_valid(id) {
            tree.parent(id)
        } else {
            None
        }
    }

    pub fn info(&self, id: NodeId) -> Option<NodeInfo> {
        let tree = self.tree.lock().unwrap();
        if !tree.is_valid(id) {
            return None;
        }
        Some(match tree.kind(id) {
            NodeKind::Folder(f) => NodeInfo::Folder {
                name: f.name.clone(),
            },
            NodeKind::File(f) => NodeInfo::File {
                identity: f.identity.clone(),
                uri: f.uri.clone(),
                name: short_name(&f.identity),
                count: f.refs.len(),
            },
            NodeKind::Reference(r) => NodeInfo::Reference {
                uri: r.location.uri.clone(),
                range: r.location.range,
            },
        })
    }

    pub fn nearest(&self, uri: &Uri, position: Position) -> Option<NodeId> {
        let identity = normalize_identity(uri);
        self.tree.lock().unwrap().nearest(&identity, position)
    }

    /// Initial focus: the node closest to the anchor the search ran from.
    pub fn nearest_to_anchor(&self) -> Option<NodeId> {
        self.nearest(&self.anchor.uri, self.anchor.position)
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.tree.lock().unwrap().next(id)
    }

    pub fn previous(&self, id: NodeId) -> Option<NodeId> {
        self.tree.lock().unwrap().previous(id)
    }

    /// Removes a node (stale handles are a no-op) and notifies subscribers
    /// with the smallest affected scope.
    pub fn remove(&self, id: NodeId) -> Option<TreeChange> {
        let change = self.tree.lock().unwrap().remove(id)?;
        let _ = self.events.send(change);
        Some(change)
    }

    /// Reference ranges in the given document, for editor highlights.
    pub fn ranges_in(&self, uri: &Uri) -> Vec<Range> {
        let identity = normalize_identity(uri);
        self.tree.lock().unwrap().ranges_in(&identity)
    }

    /// Opens the document backing a file node, at most once per file, and
    /// speculatively warms the next file's document in the background.
    pub async fn document_for(self: &Arc<Self>, file: NodeId) -> Result<Arc<Document>> {
        let (identity, uri, next) = {
            let tree = self.tree.lock().unwrap();
            if !tree.is_valid(file) {
                return Err(crate::error::RefTreeError::DocumentUnavailable(
                    "stale file node".to_string(),
                ));
            }
            let NodeKind::File(f) = tree.kind(file) else {
                return Err(crate::error::RefTreeError::Internal(
                    "document_for on a non-file node".to_string(),
                ));
            };
            let files = tree.files_in_order();
            let next = files
                .iter()
                .position(|&x| x == file)
                .and_then(|i| files.get(i + 1).copied())
                .map(|id| match tree.kind(id) {
                    NodeKind::File(n) => (n.identity.clone(), n.uri.clone()),
                    _ => unreachable!("files_in_order yielded a non-file"),
                });
            (f.identity.clone(), f.uri.clone(), next)
        };

        let doc = self.open_cached(&identity, &uri).await?;
        if let Some((next_identity, next_uri)) = next {
            self.warm(next_identity, next_uri);
        }
        Ok(doc)
    }

    /// Trimmed snippet for a reference row. Opening the backing document
    /// goes through [`document_for`](Self::document_for), so rendering a row
    /// also warms the next file. `None` if the document cannot be opened;
    /// the caller degrades to a positional label.
    pub async fn reference_preview(self: &Arc<Self>, id: NodeId) -> Option<crate::preview::Preview> {
        let (file, range) = {
            let tree = self.tree.lock().unwrap();
            if !tree.is_valid(id) {
                return None;
            }
            let NodeKind::Reference(r) = tree.kind(id) else {
                return None;
            };
            (tree.parent(id)?, r.location.range)
        };
        match self.document_for(file).await {
            Ok(doc) => Some(preview(&doc, &range, PREVIEW_LEAD, true)),
            Err(e) => {
                tracing::warn!("preview unavailable: {}", e);
                None
            }
        }
    }

    async fn open_cached(&self, identity: &str, uri: &Uri) -> Result<Arc<Document>> {
        let cell = self
            .docs
            .entry(identity.to_string())
            .or_default()
            .clone();
        cell.get_or_try_init(|| self.store.open(uri))
            .await
            .map(Arc::clone)
    }

    /// Fire-and-forget prefetch. Never awaited by the caller, never
    /// duplicated for a document already open or already in flight; a
    /// failure is swallowed here and nowhere else.
    fn warm(self: &Arc<Self>, identity: String, uri: Uri) {
        let opened = self
            .docs
            .get(&identity)
            .is_some_and(|cell| cell.initialized());
        if opened || !self.warming.insert(identity.clone()) {
            return;
        }
        let session = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = session.open_cached(&identity, &uri).await {
                session.warming.remove(&identity);
                tracing::debug!("prefetch of {} failed: {}", identity, e);
            }
        });
    }

    /// Clipboard rendering: one header line per file, one untrimmed preview
    /// line per reference. A document that fails to open degrades to bare
    /// line:column entries for its references.
    pub async fn as_copy_text(&self) -> String {
        let files: Vec<(String, Uri, Vec<Range>)> = {
            let tree = self.tree.lock().unwrap();
            tree.files_in_order()
                .into_iter()
                .map(|id| {
                    let f = tree.file(id);
                    let ranges = f
                        .refs
                        .iter()
                        .map(|&r| tree.reference(r).location.range)
                        .collect();
                    (f.identity.clone(), f.uri.clone(), ranges)
                })
                .collect()
        };

        let mut out = String::new();
        for (identity, uri, ranges) in files {
            out.push_str(&identity);
            out.push('\n');
            let doc = match self.open_cached(&identity, &uri).await {
                Ok(doc) => Some(doc),
                Err(e) => {
                    tracing::warn!("copy: cannot open {}: {}", identity, e);
                    None
                }
            };
            for range in ranges {
                let line = range.start.line + 1;
                let col = range.start.character + 1;
                match &doc {
                    Some(doc) => {
                        let p = preview(doc, &range, PREVIEW_LEAD, false);
                        out.push_str(&format!("  {}:{}: {}\n", line, col, p.label()));
                    }
                    None => out.push_str(&format!("  {}:{}\n", line, col)),
                }
            }
        }
        out
    }

    /// A history snapshot of this search. Opens the anchor document to
    /// preview the word at the anchor; if the position no longer lands on a
    /// word (the document changed) the entry keeps a lower-fidelity label.
    pub async fn as_history_entry(&self) -> HistoryEntry {
        let identity = normalize_identity(&self.anchor.uri);
        let file_name = short_name(&identity);
        let position = self.anchor.position;

        let label = match self.open_cached(&identity, &self.anchor.uri).await {
            Ok(doc) => doc
                .word_range_at(position)
                .map(|word| preview(&doc, &word, PREVIEW_LEAD, true).label()),
            Err(e) => {
                tracing::warn!("history preview: cannot open {}: {}", identity, e);
                None
            }
        }
        .unwrap_or_else(|| {
            format!(
                "{}:{}:{}",
                file_name,
                position.line + 1,
                position.character + 1
            )
        });

        let rerun = Rerun::Locations {
            kind: self.kind,
            uri: self.anchor.uri.clone(),
            position,
        };
        HistoryEntry {
            id: rerun.id(),
            label,
            description: format!("{} • {}", file_name, self.kind.title()),
            rerun,
        }
    }
}

fn short_name(identity: &str) -> String {
    identity
        .rsplit('/')
        .next()
        .unwrap_or(identity)
        .to_string()
}

type Resolution = Option<Arc<ResultSession>>;

enum ResolveState {
    NotStarted,
    Pending {
        seq: u64,
        rx: watch::Receiver<Option<Resolution>>,
    },
    Resolved(Resolution),
}

struct ResolveSlot {
    /// Bumped by `reset()`; an in-flight provider call commits its value
    /// only if the generation it started under is still current.
    generation: u64,
    /// Distinguishes one pending attempt from the next.
    seq: u64,
    state: ResolveState,
}

/// One search request with memoized resolution.
///
/// The first caller of [`resolve`](Self::resolve) drives the provider call;
/// concurrent callers await the same pending value, so the provider is
/// invoked exactly once per request. [`reset`](Self::reset) forces a fresh
/// call on the next access (used by refresh); a provider call that outlives
/// a reset still settles its own waiters but never overwrites newer state.
pub struct SessionRequest {
    pub anchor: Anchor,
    pub kind: SearchKind,
    provider: Arc<dyn LocationProvider>,
    store: Arc<dyn DocumentStore>,
    grouping: Grouping,
    slot: Mutex<ResolveSlot>,
}

impl SessionRequest {
    pub fn new(
        anchor: Anchor,
        kind: SearchKind,
        provider: Arc<dyn LocationProvider>,
        store: Arc<dyn DocumentStore>,
        grouping: Grouping,
    ) -> Arc<Self> {
        Arc::new(Self {
            anchor,
            kind,
            provider,
            store,
            grouping,
            slot: Mutex::new(ResolveSlot {
                generation: 0,
                seq: 0,
                state: ResolveState::NotStarted,
            }),
        })
    }

    /// `None` means the provider yielded no results (or failed); it is a
    /// settled value, distinct from "not yet resolved".
    pub async fn resolve(&self) -> Resolution {
        loop {
            enum Action {
                Done(Resolution),
                Wait(u64, watch::Receiver<Option<Resolution>>),
                Run(u64, watch::Sender<Option<Resolution>>),
            }

            let action = {
                let mut slot = self.slot.lock().unwrap();
                match &slot.state {
                    ResolveState::Resolved(r) => Action::Done(r.clone()),
                    ResolveState::Pending { seq, rx } => Action::Wait(*seq, rx.clone()),
                    ResolveState::NotStarted => {
                        let (tx, rx) = watch::channel(None);
                        slot.seq += 1;
                        slot.state = ResolveState::Pending { seq: slot.seq, rx };
                        Action::Run(slot.generation, tx)
                    }
                }
            };

            match action {
                Action::Done(r) => return r,
                Action::Wait(seq, mut rx) => loop {
                    if let Some(r) = rx.borrow_and_update().clone() {
                        return r;
                    }
                    if rx.changed().await.is_err() {
                        // The driving caller was dropped before settling.
                        // Put the slot back to NotStarted and retry.
                        let mut slot = self.slot.lock().unwrap();
                        if matches!(&slot.state, ResolveState::Pending { seq: cur, .. } if *cur == seq)
                        {
                            slot.state = ResolveState::NotStarted;
                        }
                        break;
                    }
                },
                Action::Run(generation, tx) => {
                    let resolution = self.run_provider().await;
                    {
                        let mut slot = self.slot.lock().unwrap();
                        if slot.generation == generation {
                            slot.state = ResolveState::Resolved(resolution.clone());
                        }
                    }
                    let _ = tx.send(Some(resolution.clone()));
                    return resolution;
                }
            }
        }
    }

    /// Forgets the memoized value; the next [`resolve`](Self::resolve)
    /// triggers a fresh provider call.
    pub fn reset(&self) {
        let mut slot = self.slot.lock().unwrap();
        slot.generation += 1;
        slot.state = ResolveState::NotStarted;
    }

    async fn run_provider(&self) -> Resolution {
        match self
            .provider
            .find(self.kind, &self.anchor.uri, self.anchor.position)
            .await
        {
            Ok(Some(locations)) if !locations.is_empty() => Some(ResultSession::new(
                self.anchor.clone(),
                self.kind,
                locations,
                &self.grouping,
                self.store.clone(),
            )),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(
                    "{} lookup failed at {}:{}: {}",
                    self.kind.title(),
                    self.anchor.uri.as_str(),
                    self.anchor.position.line,
                    e
                );
                None
            }
        }
    }
}
