//! Resolution lifecycle behavior: memoization, reset, no-results handling,
//! lazy document access, and history snapshots.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use reftree_core::history::Rerun;
use reftree_core::host::SearchKind;
use reftree_core::session::{Anchor, ResultSession, SessionRequest};
use reftree_core::tree::{ChangeScope, Grouping};

fn anchor(u: &str, line: u32, character: u32) -> Anchor {
    Anchor {
        uri: uri(u),
        position: pos(line, character),
    }
}

#[tokio::test]
async fn concurrent_awaiters_share_one_provider_call() {
    let provider = Arc::new(ScriptedProvider::new(vec![(
        Duration::from_millis(20),
        Some(vec![loc("file:///a.ts", 1, 0, 4)]),
    )]));
    let store = Arc::new(StubStore::default().with_doc("file:///a.ts", "refs here"));
    let request = SessionRequest::new(
        anchor("file:///a.ts", 1, 0),
        SearchKind::References,
        provider.clone(),
        store,
        Grouping::Flat,
    );

    let (a, b) = tokio::join!(request.resolve(), request.resolve());
    assert_eq!(provider.call_count(), 1);

    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(Arc::ptr_eq(&a, &b));

    let c = request.resolve().await.unwrap();
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn reset_forces_a_fresh_provider_call() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        (Duration::ZERO, Some(vec![loc("file:///a.ts", 1, 0, 4)])),
        (
            Duration::ZERO,
            Some(vec![
                loc("file:///a.ts", 1, 0, 4),
                loc("file:///a.ts", 9, 0, 4),
            ]),
        ),
    ]));
    let store = Arc::new(StubStore::default());
    let request = SessionRequest::new(
        anchor("file:///a.ts", 1, 0),
        SearchKind::References,
        provider.clone(),
        store,
        Grouping::Flat,
    );

    let first = request.resolve().await.unwrap();
    assert_eq!(first.total(), 1);

    request.reset();
    let second = request.resolve().await.unwrap();
    assert_eq!(second.total(), 2);
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn empty_result_resolves_to_no_session() {
    let provider = Arc::new(ScriptedProvider::new(vec![(Duration::ZERO, Some(vec![]))]));
    let request = SessionRequest::new(
        anchor("file:///a.ts", 0, 0),
        SearchKind::References,
        provider,
        Arc::new(StubStore::default()),
        Grouping::Flat,
    );
    assert!(request.resolve().await.is_none());
}

#[tokio::test]
async fn provider_failure_degrades_to_no_results() {
    let request = SessionRequest::new(
        anchor("file:///a.ts", 0, 0),
        SearchKind::Implementations,
        Arc::new(FailingProvider),
        Arc::new(StubStore::default()),
        Grouping::Flat,
    );
    assert!(request.resolve().await.is_none());
}

#[tokio::test]
async fn session_groups_locations_per_document() {
    let session = ResultSession::new(
        anchor("file:///a.ts", 10, 0),
        SearchKind::References,
        vec![
            loc("file:///a.ts", 10, 0, 4),
            loc("file:///a.ts", 10, 8, 12),
            loc("file:///b.ts", 3, 0, 4),
        ],
        &Grouping::Flat,
        Arc::new(StubStore::default()),
    );

    let files = session.children(None);
    assert_eq!(files.len(), 2);
    assert_eq!(session.children(Some(files[0])).len(), 2);
    assert_eq!(session.children(Some(files[1])).len(), 1);
    assert_eq!(session.total(), 3);
}

#[tokio::test]
async fn documents_open_once_and_the_next_file_is_warmed() {
    let store = Arc::new(
        StubStore::default()
            .with_doc("file:///a.ts", "alpha")
            .with_doc("file:///b.ts", "beta"),
    );
    let session = ResultSession::new(
        anchor("file:///a.ts", 0, 0),
        SearchKind::References,
        vec![loc("file:///a.ts", 0, 0, 4), loc("file:///b.ts", 0, 0, 4)],
        &Grouping::Flat,
        store.clone(),
    );

    let files = session.children(None);
    session.document_for(files[0]).await.unwrap();

    // Let the fire-and-forget prefetch run.
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
    assert_eq!(store.open_count("file:///b.ts"), 1);

    session.document_for(files[0]).await.unwrap();
    assert_eq!(store.open_count("file:///a.ts"), 1);

    // The warmed document is served from the cache.
    session.document_for(files[1]).await.unwrap();
    assert_eq!(store.open_count("file:///b.ts"), 1);
}

#[tokio::test]
async fn concurrent_document_requests_share_one_open() {
    let store = Arc::new(
        StubStore::default()
            .with_doc("file:///a.ts", "alpha")
            .with_open_delay(Duration::from_millis(20)),
    );
    let session = ResultSession::new(
        anchor("file:///a.ts", 0, 0),
        SearchKind::References,
        vec![loc("file:///a.ts", 0, 0, 4)],
        &Grouping::Flat,
        store.clone(),
    );

    let file = session.children(None)[0];
    let (a, b) = tokio::join!(session.document_for(file), session.document_for(file));
    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    assert_eq!(store.open_count("file:///a.ts"), 1);
}

#[tokio::test]
async fn prefetch_failure_is_swallowed() {
    let store = Arc::new(StubStore::default().with_doc("file:///a.ts", "alpha"));
    let session = ResultSession::new(
        anchor("file:///a.ts", 0, 0),
        SearchKind::References,
        vec![loc("file:///a.ts", 0, 0, 4), loc("file:///gone.ts", 0, 0, 4)],
        &Grouping::Flat,
        store.clone(),
    );

    let files = session.children(None);
    session.document_for(files[0]).await.unwrap();
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
    // The missing document was attempted exactly once and nothing blew up.
    assert_eq!(store.open_count("file:///gone.ts"), 1);
}

#[tokio::test]
async fn removing_a_top_level_file_notifies_at_root_scope() {
    let session = ResultSession::new(
        anchor("file:///a.ts", 10, 0),
        SearchKind::References,
        vec![
            loc("file:///a.ts", 10, 0, 4),
            loc("file:///a.ts", 12, 0, 4),
            loc("file:///b.ts", 3, 0, 4),
        ],
        &Grouping::Flat,
        Arc::new(StubStore::default()),
    );
    let mut rx = session.subscribe();

    let b = session.children(None)[1];
    let only_ref = session.children(Some(b))[0];
    session.remove(only_ref).unwrap();

    let change = rx.recv().await.unwrap();
    assert_eq!(change.scope, ChangeScope::Root);
    assert_eq!(session.children(None).len(), 1);
    assert_eq!(session.total(), 2);
}

#[tokio::test]
async fn history_entry_previews_the_anchor_word_and_replays_the_kind() {
    let store = Arc::new(
        StubStore::default().with_doc("file:///src/main.rs", "fn alpha() {}\nalpha();\n"),
    );
    let session = ResultSession::new(
        anchor("file:///src/main.rs", 1, 2),
        SearchKind::Implementations,
        vec![loc("file:///src/main.rs", 0, 3, 8)],
        &Grouping::Flat,
        store,
    );

    let entry = session.as_history_entry().await;
    assert!(entry.label.contains("alpha"), "label: {}", entry.label);
    assert!(entry.description.contains("main.rs"));
    assert!(entry.description.contains("Implementations"));
    match entry.rerun {
        Rerun::Locations {
            kind,
            uri: u,
            position,
        } => {
            assert_eq!(kind, SearchKind::Implementations);
            assert_eq!(u.as_str(), "file:///src/main.rs");
            assert_eq!(position, pos(1, 2));
        }
        _ => panic!("expected a locations rerun"),
    }
}

#[tokio::test]
async fn history_entry_degrades_when_the_anchor_left_the_word() {
    let store =
        Arc::new(StubStore::default().with_doc("file:///src/main.rs", "fn alpha() {}\n   \n"));
    let session = ResultSession::new(
        anchor("file:///src/main.rs", 1, 1),
        SearchKind::References,
        vec![loc("file:///src/main.rs", 0, 3, 8)],
        &Grouping::Flat,
        store,
    );

    let entry = session.as_history_entry().await;
    assert_eq!(entry.label, "main.rs:2:2");
}

#[tokio::test]
async fn copy_text_lists_files_with_untrimmed_previews() {
    let store = Arc::new(StubStore::default().with_doc("file:///a.ts", "let value = 1;\nvalue += 1;"));
    let session = ResultSession::new(
        anchor("file:///a.ts", 0, 4),
        SearchKind::References,
        vec![loc("file:///a.ts", 0, 4, 9), loc("file:///a.ts", 1, 0, 5)],
        &Grouping::Flat,
        store,
    );

    let text = session.as_copy_text().await;
    assert_eq!(
        text,
        "file:///a.ts\n  1:5: let value = 1;\n  2:1: value += 1;\n"
    );
}

#[tokio::test]
async fn copy_text_degrades_to_positions_for_missing_documents() {
    let session = ResultSession::new(
        anchor("file:///gone.ts", 0, 0),
        SearchKind::References,
        vec![loc("file:///gone.ts", 4, 2, 6)],
        &Grouping::Flat,
        Arc::new(StubStore::default()),
    );

    let text = session.as_copy_text().await;
    assert_eq!(text, "file:///gone.ts\n  5:3\n");
}
