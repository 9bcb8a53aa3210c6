//! In-memory collaborator stubs shared by the integration tests.

// Each test binary compiles this module separately and uses a subset.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lsp_types::{Location, Position, Range, Uri};

use reftree_core::error::{RefTreeError, Result};
use reftree_core::host::{
    CallHierarchyProvider, CallItemPayload, CallLink, Document, DocumentStore, LocationProvider,
    SearchKind, SettingsStore,
};

pub fn uri(s: &str) -> Uri {
    Uri::from_str(s).unwrap()
}

pub fn pos(line: u32, character: u32) -> Position {
    Position::new(line, character)
}

pub fn loc(u: &str, line: u32, from: u32, to: u32) -> Location {
    Location {
        uri: uri(u),
        range: Range {
            start: pos(line, from),
            end: pos(line, to),
        },
    }
}

/// Document store backed by a map; records every open call.
#[derive(Default)]
pub struct StubStore {
    docs: Mutex<HashMap<String, String>>,
    delay: Option<Duration>,
    pub opened: Mutex<Vec<String>>,
}

impl StubStore {
    pub fn with_doc(self, u: &str, text: &str) -> Self {
        self.docs
            .lock()
            .unwrap()
            .insert(u.to_string(), text.to_string());
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn open_count(&self, u: &str) -> usize {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.as_str() == u)
            .count()
    }
}

#[async_trait]
impl DocumentStore for StubStore {
    async fn open(&self, u: &Uri) -> Result<Arc<Document>> {
        self.opened.lock().unwrap().push(u.as_str().to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.docs.lock().unwrap().get(u.as_str()) {
            Some(text) => Ok(Arc::new(Document::new(u.clone(), text.clone(), 1))),
            None => Err(RefTreeError::DocumentUnavailable(u.as_str().to_string())),
        }
    }
}

/// Location provider that plays back a script of (delay, result) batches and
/// counts invocations.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<(Duration, Option<Vec<Location>>)>>,
    pub calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(script: Vec<(Duration, Option<Vec<Location>>)>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationProvider for ScriptedProvider {
    async fn find(
        &self,
        _kind: SearchKind,
        _uri: &Uri,
        _position: Position,
    ) -> Result<Option<Vec<Location>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some((delay, batch)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(batch)
            }
            None => Ok(None),
        }
    }
}

/// Provider whose every call rejects.
pub struct FailingProvider;

#[async_trait]
impl LocationProvider for FailingProvider {
    async fn find(
        &self,
        _kind: SearchKind,
        _uri: &Uri,
        _position: Position,
    ) -> Result<Option<Vec<Location>>> {
        Err(RefTreeError::Provider("lookup rejected".to_string()))
    }
}

pub fn payload(name: &str, u: &str, line: u32) -> CallItemPayload {
    let range = Range {
        start: pos(line, 0),
        end: pos(line, 10),
    };
    CallItemPayload {
        name: name.to_string(),
        detail: None,
        uri: uri(u),
        range,
        selection_range: range,
    }
}

/// Call-hierarchy provider with one root and canned callers/callees.
#[derive(Default)]
pub struct StubCalls {
    pub prepares: AtomicUsize,
    pub incoming_calls: AtomicUsize,
    pub outgoing_calls: AtomicUsize,
}

#[async_trait]
impl CallHierarchyProvider for StubCalls {
    async fn prepare(&self, u: &Uri, position: Position) -> Result<Option<Vec<CallItemPayload>>> {
        self.prepares.fetch_add(1, Ordering::SeqCst);
        Ok(Some(vec![payload("root_fn", u.as_str(), position.line)]))
    }

    async fn incoming(&self, item: &CallItemPayload) -> Result<Vec<CallLink>> {
        self.incoming_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            CallLink {
                item: payload(&format!("{}_caller_a", item.name), "file:///callers/a.rs", 3),
                sites: vec![Range {
                    start: pos(3, 4),
                    end: pos(3, 10),
                }],
            },
            CallLink {
                item: payload(&format!("{}_caller_b", item.name), "file:///callers/b.rs", 7),
                sites: vec![Range {
                    start: pos(7, 0),
                    end: pos(7, 6),
                }],
            },
        ])
    }

    async fn outgoing(&self, item: &CallItemPayload) -> Result<Vec<CallLink>> {
        self.outgoing_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![CallLink {
            item: payload(&format!("{}_callee", item.name), "file:///callees/c.rs", 1),
            sites: vec![Range {
                start: pos(1, 0),
                end: pos(1, 6),
            }],
        }])
    }
}

#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, serde_json::Value>>,
}

impl SettingsStore for MemorySettings {
    fn read(&self, key: &str) -> Option<serde_json::Value> {
        self.values.lock().unwrap().get(key).cloned()
    }

    fn persist(&self, key: &str, value: serde_json::Value) {
        self.values.lock().unwrap().insert(key.to_string(), value);
    }
}
