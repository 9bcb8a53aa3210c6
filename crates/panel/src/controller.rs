//! Glue between host commands and the core: runs searches, swaps the
//! adapter's backing model, records history, and keeps highlights fresh.
//!
//! Staleness is handled by generation counting, not cancellation: every
//! continuation after a suspension point re-checks that its search is still
//! the active one and silently discards its work otherwise.

use std::sync::{Arc, Mutex};

use lsp_types::{Position, Range, Uri};

use reftree_core::calls::{stored_direction, CallSession};
use reftree_core::history::{HistoryEntry, Rerun, SessionHistory};
use reftree_core::host::{
    CallDirection, CallHierarchyProvider, Clipboard, DocumentStore, LocationProvider, SearchKind,
    SettingsStore,
};
use reftree_core::session::{Anchor, ResultSession, SessionRequest};

use crate::adapter::{PanelModel, TreeAdapter, TreeHandle};
use crate::config::PanelConfig;
use crate::highlight::HighlightSync;

/// Explicit panel visibility state, pushed to the UI glue through
/// [`PanelObserver`] instead of ambient context flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Idle,
    Busy,
    Results,
    NoResults,
}

pub trait PanelObserver: Send + Sync {
    fn panel_state(&self, state: PanelState);
}

#[derive(Clone)]
enum ActiveSession {
    Results(Arc<ResultSession>),
    Calls(Arc<CallSession>),
}

#[derive(Default)]
struct ActiveSearch {
    generation: u64,
    request: Option<Arc<SessionRequest>>,
    session: Option<ActiveSession>,
}

pub struct SessionController {
    provider: Arc<dyn LocationProvider>,
    calls: Arc<dyn CallHierarchyProvider>,
    store: Arc<dyn DocumentStore>,
    clipboard: Arc<dyn Clipboard>,
    settings: Arc<dyn SettingsStore>,
    config: PanelConfig,
    pub adapter: Arc<TreeAdapter>,
    pub highlight: HighlightSync,
    history: Mutex<SessionHistory>,
    active: Mutex<ActiveSearch>,
    observers: Mutex<Vec<Arc<dyn PanelObserver>>>,
}

impl SessionController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        calls: Arc<dyn CallHierarchyProvider>,
        store: Arc<dyn DocumentStore>,
        clipboard: Arc<dyn Clipboard>,
        settings: Arc<dyn SettingsStore>,
        config: PanelConfig,
    ) -> Arc<Self> {
        let history = SessionHistory::with_cap(config.history_cap);
        Arc::new(Self {
            provider,
            calls,
            store,
            clipboard,
            settings,
            config,
            adapter: TreeAdapter::new(),
            highlight: HighlightSync::new(),
            history: Mutex::new(history),
            active: Mutex::new(ActiveSearch::default()),
            observers: Mutex::new(Vec::new()),
        })
    }

    pub fn add_observer(&self, observer: Arc<dyn PanelObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    fn notify(&self, state: PanelState) {
        for observer in self.observers.lock().unwrap().iter() {
            observer.panel_state(state);
        }
    }

    /// Runs a references/implementations search. Returns the handle to
    /// reveal initially, or `None` for no results (the panel then shows the
    /// search history) or a superseded search.
    pub async fn search(
        self: &Arc<Self>,
        uri: Uri,
        position: Position,
        kind: SearchKind,
    ) -> Option<TreeHandle> {
        let request = SessionRequest::new(
            Anchor { uri, position },
            kind,
            self.provider.clone(),
            self.store.clone(),
            self.config.grouping(),
        );
        let generation = self.begin(Some(request.clone()));

        let resolution = request.resolve().await;
        self.commit(generation, resolution.map(ActiveSession::Results))
            .await
    }

    /// Prepares a call hierarchy at the anchor.
    pub async fn search_calls(
        self: &Arc<Self>,
        uri: Uri,
        position: Position,
    ) -> Option<TreeHandle> {
        let anchor = Anchor { uri, position };
        let generation = self.begin(None);

        let session = CallSession::create(
            self.calls.clone(),
            self.settings.clone(),
            self.store.clone(),
            anchor,
        )
        .await;
        self.commit(generation, session.map(ActiveSession::Calls))
            .await
    }

    /// Re-runs the active request against a fresh provider call.
    pub async fn refresh(self: &Arc<Self>) -> Option<TreeHandle> {
        let (generation, request) = {
            let mut active = self.active.lock().unwrap();
            let Some(request) = active.request.clone() else {
                return None;
            };
            active.generation += 1;
            active.session = None;
            (active.generation, request)
        };
        request.reset();

        self.highlight.session_replaced();
        self.adapter.set_model(PanelModel::Loading);
        self.notify(PanelState::Busy);

        let resolution = request.resolve().await;
        self.commit(generation, resolution.map(ActiveSession::Results))
            .await
    }

    /// Replays a history entry: same anchor, same search kind.
    pub async fn rerun(self: &Arc<Self>, id: u64) -> Option<TreeHandle> {
        let rerun = self
            .history
            .lock()
            .unwrap()
            .get(id)
            .map(|e| e.rerun.clone())?;
        match rerun {
            Rerun::Locations {
                kind,
                uri,
                position,
            } => self.search(uri, position, kind).await,
            Rerun::CallHierarchy { uri, position } => self.search_calls(uri, position).await,
        }
    }

    fn begin(&self, request: Option<Arc<SessionRequest>>) -> u64 {
        let generation = {
            let mut active = self.active.lock().unwrap();
            active.generation += 1;
            active.request = request;
            active.session = None;
            active.generation
        };
        self.highlight.session_replaced();
        self.adapter.set_model(PanelModel::Loading);
        self.notify(PanelState::Busy);
        generation
    }

    /// Publishes a settled search, unless a newer one superseded it while
    /// the provider ran; stale resolutions are dropped without a trace.
    async fn commit(
        self: &Arc<Self>,
        generation: u64,
        session: Option<ActiveSession>,
    ) -> Option<TreeHandle> {
        // History entries open documents; do that before touching the lock.
        let entry = match &session {
            Some(ActiveSession::Results(s)) => Some(s.as_history_entry().await),
            Some(ActiveSession::Calls(c)) => Some(c.as_history_entry().await),
            None => None,
        };

        {
            let mut active = self.active.lock().unwrap();
            if active.generation != generation {
                tracing::debug!("dropping stale resolution");
                return None;
            }
            active.session = session.clone();
        }

        if let Some(entry) = entry {
            self.history.lock().unwrap().add(entry);
        }

        match session {
            Some(ActiveSession::Results(s)) => {
                self.adapter.set_model(PanelModel::Results(s.clone()));
                self.notify(PanelState::Results);
                s.nearest_to_anchor().map(TreeHandle::Node)
            }
            Some(ActiveSession::Calls(c)) => {
                self.adapter.set_model(PanelModel::Calls(c.clone()));
                self.notify(PanelState::Results);
                c.roots().first().copied().map(TreeHandle::Call)
            }
            None => {
                self.show_history();
                self.notify(PanelState::NoResults);
                None
            }
        }
    }

    pub fn show_history(&self) {
        let snapshot: Vec<HistoryEntry> = self
            .history
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .collect();
        self.adapter.set_model(PanelModel::History(snapshot));
    }

    pub fn clear_history(&self) {
        self.history.lock().unwrap().clear();
        self.show_history();
    }

    pub fn history_snapshot(&self) -> Vec<HistoryEntry> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    fn results_session(&self) -> Option<Arc<ResultSession>> {
        match &self.active.lock().unwrap().session {
            Some(ActiveSession::Results(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn call_session(&self) -> Option<Arc<CallSession>> {
        match &self.active.lock().unwrap().session {
            Some(ActiveSession::Calls(c)) => Some(c.clone()),
            _ => None,
        }
    }

    /// Removes a result row. Handles from a superseded session are no-ops.
    /// Removing the last row drops back to the history view.
    pub fn remove(&self, handle: TreeHandle) {
        match handle {
            TreeHandle::Node(id) => {
                let Some(session) = self.results_session() else {
                    return;
                };
                if session.remove(id).is_some() && session.is_empty() {
                    self.active.lock().unwrap().session = None;
                    self.show_history();
                    self.notify(PanelState::NoResults);
                }
            }
            TreeHandle::Call(id) => {
                if let Some(session) = self.call_session() {
                    session.remove(id);
                }
            }
            TreeHandle::History(id) => {
                self.history.lock().unwrap().remove(id);
                self.show_history();
            }
            TreeHandle::Message => {}
        }
    }

    pub fn next(&self, handle: TreeHandle) -> Option<TreeHandle> {
        match handle {
            TreeHandle::Node(id) => self.results_session()?.next(id).map(TreeHandle::Node),
            TreeHandle::Call(id) => self.call_session()?.next(id).map(TreeHandle::Call),
            _ => None,
        }
    }

    pub fn previous(&self, handle: TreeHandle) -> Option<TreeHandle> {
        match handle {
            TreeHandle::Node(id) => self.results_session()?.previous(id).map(TreeHandle::Node),
            TreeHandle::Call(id) => self.call_session()?.previous(id).map(TreeHandle::Call),
            _ => None,
        }
    }

    pub fn nearest(&self, uri: &Uri, position: Position) -> Option<TreeHandle> {
        self.results_session()?
            .nearest(uri, position)
            .map(TreeHandle::Node)
    }

    /// Highlight ranges for the given document under the active session.
    pub fn highlights_for(&self, uri: &Uri) -> Vec<Range> {
        let session = self.results_session();
        self.highlight.highlights(session.as_deref(), uri)
    }

    pub fn document_edited(&self, uri: &Uri) {
        self.highlight.document_edited(uri);
    }

    /// Copies the whole active result to the clipboard, untrimmed.
    pub async fn copy_results(&self) {
        let Some(session) = self.results_session() else {
            return;
        };
        let text = session.as_copy_text().await;
        if let Err(e) = self.clipboard.write(&text).await {
            tracing::warn!("clipboard write failed: {}", e);
        }
    }

    /// Flips the call-hierarchy direction, persisting the choice and
    /// rebuilding the active call session's roots.
    pub async fn toggle_call_direction(&self) {
        let Some(session) = self.call_session() else {
            // No active call session; still flip the stored preference.
            let flipped = match stored_direction(self.settings.as_ref()) {
                CallDirection::Incoming => CallDirection::Outgoing,
                CallDirection::Outgoing => CallDirection::Incoming,
            };
            self.settings.persist(
                reftree_core::calls::CALL_DIRECTION_KEY,
                serde_json::json!(match flipped {
                    CallDirection::Incoming => "incoming",
                    CallDirection::Outgoing => "outgoing",
                }),
            );
            return;
        };
        let flipped = match session.direction() {
            CallDirection::Incoming => CallDirection::Outgoing,
            CallDirection::Outgoing => CallDirection::Incoming,
        };
        session.set_direction(flipped).await;
        self.adapter.set_model(PanelModel::Calls(session));
    }
}
