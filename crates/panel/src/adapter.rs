//! Translates whatever the panel currently shows (a pending search, a
//! resolved result tree, a call hierarchy, or past searches) into the
//! generic tree-view protocol a host tree widget consumes.

use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use reftree_core::calls::{CallId, CallScope, CallSession};
use reftree_core::history::HistoryEntry;
use reftree_core::session::{NodeInfo, ResultSession};
use reftree_core::tree::{ChangeScope, NodeId};

/// Opaque row handle handed to the host widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeHandle {
    Node(NodeId),
    Call(CallId),
    History(u64),
    /// The single informational row of the loading and empty states.
    Message,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayItem {
    pub label: String,
    pub description: Option<String>,
    pub expandable: bool,
}

/// Which backing model the adapter currently proxies.
#[derive(Clone)]
pub enum PanelModel {
    Empty,
    Loading,
    Results(Arc<ResultSession>),
    Calls(Arc<CallSession>),
    History(Vec<HistoryEntry>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterChange {
    Root,
    Subtree(TreeHandle),
}

pub struct TreeAdapter {
    model: RwLock<(u64, PanelModel)>,
    events: broadcast::Sender<AdapterChange>,
}

impl TreeAdapter {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            model: RwLock::new((0, PanelModel::Empty)),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AdapterChange> {
        self.events.subscribe()
    }

    fn generation(&self) -> u64 {
        self.model.read().unwrap().0
    }

    fn snapshot(&self) -> PanelModel {
        self.model.read().unwrap().1.clone()
    }

    /// Swaps the backing model, fires a root refresh, and (for live
    /// sessions) keeps forwarding their subtree-scoped changes until the
    /// model is swapped again.
    pub fn set_model(self: &Arc<Self>, model: PanelModel) {
        let generation = {
            let mut slot = self.model.write().unwrap();
            slot.0 += 1;
            slot.1 = model.clone();
            slot.0
        };
        let _ = self.events.send(AdapterChange::Root);

        match model {
            PanelModel::Results(session) => {
                let adapter = Arc::clone(self);
                let mut rx = session.subscribe();
                tokio::spawn(async move {
                    loop {
                        match rx.recv().await {
                            Ok(change) => {
                                if adapter.generation() != generation {
                                    break;
                                }
                                let mapped = match change.scope {
                                    ChangeScope::Root => AdapterChange::Root,
                                    ChangeScope::Node(id) => {
                                        AdapterChange::Subtree(TreeHandle::Node(id))
                                    }
                                };
                                let _ = adapter.events.send(mapped);
                            }
                            Err(broadcast::error::RecvError::Lagged(_)) => {
                                let _ = adapter.events.send(AdapterChange::Root);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                });
            }
            PanelModel::Calls(session) => {
                let adapter = Arc::clone(self);
                let mut rx = session.subscribe();
                tokio::spawn(async move {
                    loop {
                        match rx.recv().await {
                            Ok(change) => {
                                if adapter.generation() != generation {
                                    break;
                                }
                                let mapped = match change.scope {
                                    CallScope::Root => AdapterChange::Root,
                                    CallScope::Node(id) => {
                                        AdapterChange::Subtree(TreeHandle::Call(id))
                                    }
                                };
                                let _ = adapter.events.send(mapped);
                            }
                            Err(broadcast::error::RecvError::Lagged(_)) => {
                                let _ = adapter.events.send(AdapterChange::Root);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                });
            }
            PanelModel::Empty | PanelModel::Loading | PanelModel::History(_) => {}
        }
    }

    pub async fn children(&self, of: Option<&TreeHandle>) -> Vec<TreeHandle> {
        let model = self.snapshot();
        match (model, of) {
            (PanelModel::Empty, None) => Vec::new(),
            (PanelModel::Loading, None) => vec![TreeHandle::Message],
            (PanelModel::Results(s), None) => s
                .children(None)
                .into_iter()
                .map(TreeHandle::Node)
                .collect(),
            (PanelModel::Results(s), Some(TreeHandle::Node(id))) => s
                .children(Some(*id))
                .into_iter()
                .map(TreeHandle::Node)
                .collect(),
            (PanelModel::Calls(s), None) => {
                s.roots().into_iter().map(TreeHandle::Call).collect()
            }
            (PanelModel::Calls(s), Some(TreeHandle::Call(id))) => s
                .expand(*id)
                .await
                .into_iter()
                .map(TreeHandle::Call)
                .collect(),
            (PanelModel::History(entries), None) => entries
                .iter()
                .map(|e| TreeHandle::History(e.id))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn parent(&self, handle: &TreeHandle) -> Option<TreeHandle> {
        match (self.snapshot(), handle) {
            (PanelModel::Results(s), TreeHandle::Node(id)) => {
                s.parent(*id).map(TreeHandle::Node)
            }
            (PanelModel::Calls(s), TreeHandle::Call(id)) => s.parent(*id).map(TreeHandle::Call),
            _ => None,
        }
    }

    pub async fn display(&self, handle: &TreeHandle) -> DisplayItem {
        let model = self.snapshot();
        match (model, handle) {
            (PanelModel::Loading, TreeHandle::Message) => DisplayItem {
                label: "Searching…".to_string(),
                description: None,
                expandable: false,
            },
            (PanelModel::Results(s), TreeHandle::Node(id)) => match s.info(*id) {
                Some(NodeInfo::Folder { name }) => DisplayItem {
                    label: name,
                    description: None,
                    expandable: true,
                },
                Some(NodeInfo::File { name, count, .. }) => DisplayItem {
                    label: name,
                    description: Some(format!(
                        "{} {}",
                        count,
                        if count == 1 { "result" } else { "results" }
                    )),
                    expandable: true,
                },
                Some(NodeInfo::Reference { range, .. }) => {
                    let label = match s.reference_preview(*id).await {
                        Some(p) => p.label(),
                        None => format!(
                            "{}:{}",
                            range.start.line + 1,
                            range.start.character + 1
                        ),
                    };
                    DisplayItem {
                        label,
                        description: None,
                        expandable: false,
                    }
                }
                None => missing_row(),
            },
            (PanelModel::Calls(s), TreeHandle::Call(id)) => match s.item(*id) {
                Some(item) => DisplayItem {
                    label: item.name,
                    description: item.detail,
                    expandable: true,
                },
                None => missing_row(),
            },
            (PanelModel::History(entries), TreeHandle::History(id)) => entries
                .iter()
                .find(|e| e.id == *id)
                .map(|e| DisplayItem {
                    label: e.label.clone(),
                    description: Some(e.description.clone()),
                    expandable: false,
                })
                .unwrap_or_else(missing_row),
            _ => missing_row(),
        }
    }
}

fn missing_row() -> DisplayItem {
    DisplayItem {
        label: String::new(),
        description: None,
        expandable: false,
    }
}
