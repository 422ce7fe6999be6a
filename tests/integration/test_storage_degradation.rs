// Queries keep working when session storage misbehaves

#[path = "../common/mod.rs"]
mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{maintenance_generator, test_app, test_config, FailMode, FailingStore};
use ragsession::models::{ConversationMessage, QueryRequest, SessionId};
use ragsession::services::{SessionStore, SqliteSessionStore};

fn maintenance_history() -> Vec<ConversationMessage> {
    vec![ConversationMessage::new(
        1,
        "열차 정비 절차가 뭐야?",
        "일상점검, 주기점검, 특별점검으로 나뉩니다.",
    )]
}

#[tokio::test]
async fn test_unreadable_storage_degrades_to_memory_session() {
    let store = Arc::new(FailingStore::new(FailMode::FailLoads));
    let app = test_app(maintenance_generator(), store.clone(), &test_config());

    let response = app
        .orchestrator
        .query(QueryRequest::new("그거 주기가 어떻게 돼?").with_session("offline"))
        .await
        .unwrap();

    assert_eq!(response.used_query, "그거 주기가 어떻게 돼?");
    assert!(response.answer.contains("그거 주기가 어떻게 돼?"));
    assert!(response
        .warnings
        .iter()
        .any(|w| w.contains("session storage unavailable")));
    // Detached sessions are never installed in the cache
    assert!(!app.cache.contains_resident(&SessionId::new("offline").unwrap()));
}

#[tokio::test]
async fn test_storage_recovers_after_outage() {
    let store = Arc::new(FailingStore::new(FailMode::FailLoads));
    let app = test_app(maintenance_generator(), store.clone(), &test_config());

    let session = app.orchestrator.init("flaky", false).await.unwrap();
    assert!(!session.warnings.is_empty());

    store.set_mode(FailMode::Healthy);
    let session = app.orchestrator.init("flaky", false).await.unwrap();
    assert!(session.warnings.is_empty());
    assert!(app.cache.contains_resident(&SessionId::new("flaky").unwrap()));
}

#[tokio::test]
async fn test_failed_saves_keep_session_dirty_in_memory() {
    let store = Arc::new(FailingStore::new(FailMode::FailSaves));
    let app = test_app(maintenance_generator(), store.clone(), &test_config());
    let id = SessionId::new("unsaved").unwrap();

    let switched = app
        .orchestrator
        .switch("unsaved", maintenance_history())
        .await
        .unwrap();
    assert_eq!(switched.turns, 1);
    assert!(switched
        .warnings
        .iter()
        .any(|w| w.contains("failed to persist session")));
    assert!(app.cache.is_dirty(&id));
    assert!(store.inner().load(&id).await.unwrap().is_none());

    // The resident copy still drives repair
    let response = app
        .orchestrator
        .query(QueryRequest::new("그거 주기가 어떻게 돼?").with_session("unsaved"))
        .await
        .unwrap();
    assert!(response.used_query.contains("주기점검"));

    store.set_mode(FailMode::Healthy);
    let report = app.cache.run_maintenance().await;
    assert_eq!(report.flushed, 1);
    assert!(!app.cache.is_dirty(&id));
    let saved = store.inner().load(&id).await.unwrap().unwrap();
    assert_eq!(saved.turn_count(), 1);
    assert!(store.save_calls.load(Ordering::SeqCst) >= 3);
}

#[tokio::test]
async fn test_total_outage_still_answers() {
    let store = Arc::new(FailingStore::new(FailMode::FailAll));
    let app = test_app(maintenance_generator(), store, &test_config());

    let switched = app
        .orchestrator
        .switch("down", maintenance_history())
        .await
        .unwrap();
    assert!(!switched.warnings.is_empty());

    let response = app
        .orchestrator
        .query(QueryRequest::new("특별점검은 언제 해?").with_session("down"))
        .await
        .unwrap();
    assert!(!response.answer.is_empty());
    assert!(!response.warnings.is_empty());
}

#[tokio::test]
async fn test_corrupt_record_is_treated_as_absent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sessions.db");
    let config = test_config();

    {
        let store = Arc::new(SqliteSessionStore::open(&db_path).unwrap());
        let app = test_app(maintenance_generator(), store, &config);
        app.orchestrator
            .switch("mangled", maintenance_history())
            .await
            .unwrap();
    }

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    conn.execute(
        "UPDATE sessions SET created_at = 'not a timestamp' WHERE id = 'mangled'",
        [],
    )
    .unwrap();
    drop(conn);

    let store = Arc::new(SqliteSessionStore::open(&db_path).unwrap());
    let app = test_app(maintenance_generator(), store.clone(), &config);

    let session = app.orchestrator.init("mangled", false).await.unwrap();
    assert_eq!(session.turns, 0);

    let reloaded = store
        .load(&SessionId::new("mangled").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(reloaded.is_empty());
}
