//! Call-hierarchy sessions.
//!
//! Structurally unlike the flat reference tree: the result is a tree of call
//! items rooted at whatever the prepare call returned, with children
//! (callers or callees, per direction) resolved lazily on first expansion
//! and cached per node. There is no file grouping; each item is its own
//! file-like unit.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use lsp_types::Range;
use serde_json::json;
use tokio::sync::broadcast;

use crate::history::{HistoryEntry, Rerun};
use crate::host::{
    CallDirection, CallHierarchyProvider, CallItemPayload, DocumentStore, SettingsStore,
};
use crate::preview::{preview, PREVIEW_LEAD};
use crate::session::Anchor;

/// Settings key the direction toggle is persisted under.
pub const CALL_DIRECTION_KEY: &str = "reftree.callHierarchyDirection";

static ARENA_NONCE: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId {
    arena: u32,
    index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallScope {
    Root,
    Node(CallId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallChange {
    pub scope: CallScope,
}

struct CallNode {
    parent: Option<CallId>,
    payload: CallItemPayload,
    /// Call sites implicating the parent item, in this item's document.
    sites: Vec<Range>,
    /// `None` until first expansion, then cached for good.
    children: Option<Vec<CallId>>,
    alive: bool,
}

struct CallArena {
    id: u32,
    direction: CallDirection,
    nodes: Vec<CallNode>,
    roots: Vec<CallId>,
}

impl CallArena {
    fn new(direction: CallDirection) -> Self {
        Self {
            id: ARENA_NONCE.fetch_add(1, Ordering::Relaxed),
            direction,
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    fn push(&mut self, parent: Option<CallId>, payload: CallItemPayload, sites: Vec<Range>) -> CallId {
        let id = CallId {
            arena: self.id,
            index: self.nodes.len() as u32,
        };
        self.nodes.push(CallNode {
            parent,
            payload,
            sites,
            children: None,
            alive: true,
        });
        id
    }

    fn is_valid(&self, id: CallId) -> bool {
        id.arena == self.id
            && (id.index as usize) < self.nodes.len()
            && self.nodes[id.index as usize].alive
    }

    fn node(&self, id: CallId) -> &CallNode {
        &self.nodes[id.index as usize]
    }

    fn node_mut(&mut self, id: CallId) -> &mut CallNode {
        &mut self.nodes[id.index as usize]
    }

    fn kill_subtree(&mut self, id: CallId) {
        if let Some(children) = self.node(id).children.clone() {
            for child in children {
                self.kill_subtree(child);
            }
        }
        self.node_mut(id).alive = false;
    }
}

pub struct CallSession {
    anchor: Anchor,
    provider: Arc<dyn CallHierarchyProvider>,
    settings: Arc<dyn SettingsStore>,
    store: Arc<dyn DocumentStore>,
    arena: Mutex<CallArena>,
    events: broadcast::Sender<CallChange>,
}

impl CallSession {
    /// Prepares roots at the anchor. `None` for an empty prepare result or a
    /// provider failure (logged, never surfaced as an error).
    pub async fn create(
        provider: Arc<dyn CallHierarchyProvider>,
        settings: Arc<dyn SettingsStore>,
        store: Arc<dyn DocumentStore>,
        anchor: Anchor,
    ) -> Option<Arc<Self>> {
        let direction = stored_direction(settings.as_ref());
        let payloads = match provider.prepare(&anchor.uri, anchor.position).await {
            Ok(Some(items)) if !items.is_empty() => items,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(
                    "call hierarchy prepare failed at {}:{}: {}",
                    anchor.uri.as_str(),
                    anchor.position.line,
                    e
                );
                return None;
            }
        };

        let mut arena = CallArena::new(direction);
        for payload in payloads {
            let id = arena.push(None, payload, Vec::new());
            arena.roots.push(id);
        }
        let (events, _) = broadcast::channel(64);
        Some(Arc::new(Self {
            anchor,
            provider,
            settings,
            store,
            arena: Mutex::new(arena),
            events,
        }))
    }

    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    pub fn direction(&self) -> CallDirection {
        self.arena.lock().unwrap().direction
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallChange> {
        self.events.subscribe()
    }

    pub fn roots(&self) -> Vec<CallId> {
        self.arena.lock().unwrap().roots.clone()
    }

    pub fn parent(&self, id: CallId) -> Option<CallId> {
        let arena = self.arena.lock().unwrap();
        if arena.is_valid(id) {
            arena.node(id).parent
        } else {
            None
        }
    }

    pub fn item(&self, id: CallId) -> Option<CallItemPayload> {
        let arena = self.arena.lock().unwrap();
        if arena.is_valid(id) {
            Some(arena.node(id).payload.clone())
        } else {
            None
        }
    }

    /// Call-site ranges implicating this item's parent.
    pub fn sites(&self, id: CallId) -> Vec<Range> {
        let arena = self.arena.lock().unwrap();
        if arena.is_valid(id) {
            arena.node(id).sites.clone()
        } else {
            Vec::new()
        }
    }

    /// Children of an item, resolving them on first expansion and caching
    /// on the node. A provider failure yields an empty list without caching,
    /// so a later expansion can retry.
    pub async fn expand(&self, id: CallId) -> Vec<CallId> {
        let (payload, direction, arena_id) = {
            let arena = self.arena.lock().unwrap();
            if !arena.is_valid(id) {
                return Vec::new();
            }
            if let Some(children) = &arena.node(id).children {
                return children.clone();
            }
            (arena.node(id).payload.clone(), arena.direction, arena.id)
        };

        let links = match direction {
            CallDirection::Incoming => self.provider.incoming(&payload).await,
            CallDirection::Outgoing => self.provider.outgoing(&payload).await,
        };
        let links = match links {
            Ok(links) => links,
            Err(e) => {
                tracing::warn!("call expansion failed for {}: {}", payload.name, e);
                return Vec::new();
            }
        };

        let mut arena = self.arena.lock().unwrap();
        // The session may have been rebuilt (direction toggle) or the node
        // removed while the provider ran; a raced sibling expansion wins.
        if arena.id != arena_id || !arena.is_valid(id) {
            return Vec::new();
        }
        if let Some(children) = &arena.node(id).children {
            return children.clone();
        }
        let children: Vec<CallId> = links
            .into_iter()
            .map(|link| arena.push(Some(id), link.item, link.sites))
            .collect();
        arena.node_mut(id).children = Some(children.clone());
        children
    }

    /// Switches direction, persists the choice, and rebuilds fresh roots
    /// from the same anchor, discarding every cached expansion.
    pub async fn set_direction(&self, direction: CallDirection) {
        self.settings.persist(
            CALL_DIRECTION_KEY,
            match direction {
                CallDirection::Incoming => json!("incoming"),
                CallDirection::Outgoing => json!("outgoing"),
            },
        );

        let payloads = match self
            .provider
            .prepare(&self.anchor.uri, self.anchor.position)
            .await
        {
            Ok(Some(items)) => items,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("call hierarchy re-prepare failed: {}", e);
                Vec::new()
            }
        };

        let mut rebuilt = CallArena::new(direction);
        for payload in payloads {
            let id = rebuilt.push(None, payload, Vec::new());
            rebuilt.roots.push(id);
        }
        *self.arena.lock().unwrap() = rebuilt;
        let _ = self.events.send(CallChange {
            scope: CallScope::Root,
        });
    }

    /// Sibling step, wrapping within a non-root sibling list and stopping at
    /// the ends of the root list. The sibling position is an explicit index
    /// lookup; index 0 is a valid position.
    pub fn next(&self, id: CallId) -> Option<CallId> {
        self.step(id, true)
    }

    pub fn previous(&self, id: CallId) -> Option<CallId> {
        self.step(id, false)
    }

    fn step(&self, id: CallId, forward: bool) -> Option<CallId> {
        let arena = self.arena.lock().unwrap();
        if !arena.is_valid(id) {
            return None;
        }
        let siblings: Vec<CallId> = match arena.node(id).parent {
            Some(p) => arena.node(p).children.clone().unwrap_or_default(),
            None => arena.roots.clone(),
        };
        let idx = siblings.iter().position(|&s| s == id)?;
        if arena.node(id).parent.is_some() {
            let len = siblings.len();
            let adjacent = if forward { (idx + 1) % len } else { (idx + len - 1) % len };
            Some(siblings[adjacent])
        } else if forward {
            siblings.get(idx + 1).copied()
        } else {
            idx.checked_sub(1).map(|i| siblings[i])
        }
    }

    /// Detaches an item and its cached descendants. Unlike the reference
    /// tree there is no empty-ancestor cascade: an item with no remaining
    /// children is still a real result.
    pub fn remove(&self, id: CallId) -> Option<CallChange> {
        let change = {
            let mut arena = self.arena.lock().unwrap();
            if !arena.is_valid(id) {
                return None;
            }
            let parent = arena.node(id).parent;
            match parent {
                Some(p) => {
                    if let Some(children) = &mut arena.node_mut(p).children {
                        children.retain(|&c| c != id);
                    }
                }
                None => arena.roots.retain(|&r| r != id),
            }
            arena.kill_subtree(id);
            CallChange {
                scope: match parent {
                    Some(p) => CallScope::Node(p),
                    None => CallScope::Root,
                },
            }
        };
        let _ = self.events.send(change);
        Some(change)
    }

    pub async fn as_history_entry(&self) -> HistoryEntry {
        let position = self.anchor.position;
        let file_name = self
            .anchor
            .uri
            .as_str()
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        let label = match self.store.open(&self.anchor.uri).await {
            Ok(doc) => doc
                .word_range_at(position)
                .map(|word| preview(&doc, &word, PREVIEW_LEAD, true).label()),
            Err(e) => {
                tracing::warn!("history preview: cannot open {}: {}", self.anchor.uri.as_str(), e);
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

        let rerun = Rerun::CallHierarchy {
            uri: self.anchor.uri.clone(),
            position,
        };
        HistoryEntry {
            id: rerun.id(),
            label,
            description: format!("{} • Call Hierarchy", file_name),
            rerun,
        }
    }
}

/// The persisted direction, defaulting to incoming calls.
pub fn stored_direction(settings: &dyn SettingsStore) -> CallDirection {
    settings
        .read(CALL_DIRECTION_KEY)
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or(CallDirection::Incoming)
}
