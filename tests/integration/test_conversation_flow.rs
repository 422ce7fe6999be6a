// End-to-end flows through init, switch and query

#[path = "../common/mod.rs"]
mod common;

use common::{in_memory_store, maintenance_generator, test_app, test_config};
use ragsession::models::{ConversationMessage, QueryRequest, SessionId};
use ragsession::services::SessionStore;

fn maintenance_history() -> Vec<ConversationMessage> {
    vec![ConversationMessage::new(
        1,
        "열차 정비 절차가 뭐야?",
        "일상점검, 주기점검, 특별점검으로 나뉩니다.",
    )
    .with_created_at("2024-05-01T09:00:00Z")]
}

#[tokio::test]
async fn test_follow_up_query_is_repaired_against_history() {
    let app = test_app(maintenance_generator(), in_memory_store(), &test_config());

    let switched = app
        .orchestrator
        .switch("depot-7", maintenance_history())
        .await
        .unwrap();
    assert_eq!(switched.turns, 1);
    assert!(!switched.summary_all.is_empty());
    assert!(!switched.summary_recent.is_empty());
    assert!(switched.warnings.is_empty());

    let response = app
        .orchestrator
        .query(QueryRequest::new("그거 주기가 어떻게 돼?").with_session("depot-7"))
        .await
        .unwrap();

    assert!(response.used_query.contains("주기점검"));
    assert!(!response.used_query.contains("그거"));
    let repair = response.repair_context.as_ref().unwrap();
    assert!(!repair.assumptions.is_empty());
    assert_eq!(repair.corrections.len(), 1);
    assert!(repair.advisories.is_empty());

    // Retrieval runs on the rewrite, generation on the original wording
    assert_eq!(app.retriever.seen_queries(), vec![response.used_query.clone()]);
    assert!(response.answer.contains("그거 주기가 어떻게 돼?"));
    assert_eq!(response.files[0], "periodic_inspection.pdf");
    assert!(response.warnings.is_empty());
}

#[tokio::test]
async fn test_eval_mode_bypasses_session_and_repair() {
    let app = test_app(maintenance_generator(), in_memory_store(), &test_config());

    let response = app
        .orchestrator
        .query(
            QueryRequest::new("그거 주기가 어떻게 돼?")
                .with_session("eval-run")
                .with_eval_mode(true),
        )
        .await
        .unwrap();

    assert_eq!(response.used_query, "그거 주기가 어떻게 돼?");
    assert!(response.repair_context.is_none());
    assert_eq!(app.generator.call_count(), 0);
    assert!(!app.cache.contains_resident(&SessionId::new("eval-run").unwrap()));
}

#[tokio::test]
async fn test_query_without_session_is_not_repaired() {
    let app = test_app(maintenance_generator(), in_memory_store(), &test_config());

    let response = app
        .orchestrator
        .query(QueryRequest::new("주기점검 주기"))
        .await
        .unwrap();

    assert_eq!(response.used_query, "주기점검 주기");
    assert!(response.repair_context.is_none());
    assert_eq!(app.cache.resident_count(), 0);
}

#[tokio::test]
async fn test_query_on_empty_session_keeps_original() {
    let app = test_app(maintenance_generator(), in_memory_store(), &test_config());
    app.orchestrator.init("blank", false).await.unwrap();

    let response = app
        .orchestrator
        .query(QueryRequest::new("특별점검은 언제 해?").with_session("blank"))
        .await
        .unwrap();

    assert_eq!(response.used_query, "특별점검은 언제 해?");
    let repair = response.repair_context.unwrap();
    assert!(repair.corrections.is_empty());
    assert_eq!(repair.advisories.len(), 1);
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let app = test_app(maintenance_generator(), in_memory_store(), &test_config());

    let err = app
        .orchestrator
        .query(QueryRequest::new("  ").with_session("s"))
        .await
        .unwrap_err();
    assert_eq!(err.category(), "validation");

    let err = app
        .orchestrator
        .query(QueryRequest::new("q").with_top_k(0))
        .await
        .unwrap_err();
    assert_eq!(err.category(), "validation");

    assert!(app.orchestrator.init("", false).await.is_err());
    assert!(app.retriever.seen_queries().is_empty());
}

#[tokio::test]
async fn test_answered_queries_are_recorded_when_enabled() {
    let mut config = test_config();
    config.query.append_query_turns = true;
    let app = test_app(maintenance_generator(), in_memory_store(), &config);

    app.orchestrator
        .switch("log", maintenance_history())
        .await
        .unwrap();
    app.orchestrator
        .query(QueryRequest::new("그거 주기가 어떻게 돼?").with_session("log"))
        .await
        .unwrap();

    let (session, warnings) = app.orchestrator.history("log").await.unwrap();
    assert!(warnings.is_empty());
    assert_eq!(session.turn_count(), 2);
    let recorded = &session.turns()[1];
    assert_eq!(recorded.turn_id, 2);
    assert_eq!(recorded.user_query, "그거 주기가 어떻게 돼?");
    assert!(recorded.has_embedding());
}

#[tokio::test]
async fn test_answered_queries_are_not_recorded_by_default() {
    let app = test_app(maintenance_generator(), in_memory_store(), &test_config());

    app.orchestrator
        .switch("log", maintenance_history())
        .await
        .unwrap();
    app.orchestrator
        .query(QueryRequest::new("그거 주기가 어떻게 돼?").with_session("log"))
        .await
        .unwrap();

    let (session, _) = app.orchestrator.history("log").await.unwrap();
    assert_eq!(session.turn_count(), 1);
}

#[tokio::test]
async fn test_init_with_new_session_destroys_state() {
    let app = test_app(maintenance_generator(), in_memory_store(), &test_config());
    app.orchestrator
        .switch("reset-me", maintenance_history())
        .await
        .unwrap();

    let kept = app.orchestrator.init("reset-me", false).await.unwrap();
    assert_eq!(kept.turns, 1);
    assert!(!kept.summary_all.is_empty());

    let fresh = app.orchestrator.init("reset-me", true).await.unwrap();
    assert_eq!(fresh.turns, 0);
    assert!(fresh.summary_all.is_empty());
    assert!(fresh.summary_recent.is_empty());
    assert!(fresh.warnings.is_empty());

    let stored = app
        .cache
        .store()
        .load(&SessionId::new("reset-me").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(stored.is_empty());
}

#[tokio::test]
async fn test_switch_replaces_history_and_summaries() {
    let app = test_app(maintenance_generator(), in_memory_store(), &test_config());
    app.orchestrator
        .switch("swap", maintenance_history())
        .await
        .unwrap();

    let replaced = app
        .orchestrator
        .switch(
            "swap",
            vec![
                ConversationMessage::new(10, "제동장치 점검은?", "매일 확인합니다."),
                ConversationMessage::new(11, "공조 필터는?", "분기마다 세척합니다."),
            ],
        )
        .await
        .unwrap();
    assert_eq!(replaced.turns, 2);

    let (session, _) = app.orchestrator.history("swap").await.unwrap();
    let ids: Vec<i64> = session.turns().iter().map(|t| t.turn_id).collect();
    assert_eq!(ids, vec![10, 11]);
    assert!(session.turns().iter().all(|t| t.has_embedding()));
    assert_eq!(session.qa_index().len(), 2);

    let cleared = app.orchestrator.switch("swap", Vec::new()).await.unwrap();
    assert_eq!(cleared.turns, 0);
    assert!(cleared.summary_all.is_empty());
    assert!(cleared.summary_recent.is_empty());
}

#[tokio::test]
async fn test_history_survives_cache_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sessions.db");
    let config = test_config();

    {
        let store = std::sync::Arc::new(
            ragsession::services::SqliteSessionStore::open(&db_path).unwrap(),
        );
        let app = test_app(maintenance_generator(), store, &config);
        app.orchestrator
            .switch("durable", maintenance_history())
            .await
            .unwrap();
    }

    let store = std::sync::Arc::new(ragsession::services::SqliteSessionStore::open(&db_path).unwrap());
    let app = test_app(maintenance_generator(), store, &config);
    let response = app
        .orchestrator
        .query(QueryRequest::new("그거 주기가 어떻게 돼?").with_session("durable"))
        .await
        .unwrap();

    assert!(response.used_query.contains("주기점검"));
    assert!(response.warnings.is_empty());
}
