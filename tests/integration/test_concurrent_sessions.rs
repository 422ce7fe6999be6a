// Per-session serialization and cross-session parallelism

#[path = "../common/mod.rs"]
mod common;

use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{
    in_memory_store, maintenance_generator, test_app, test_app_with_embedder, test_config,
    GatedEmbedder, ScriptedGenerator,
};
use ragsession::models::{ConversationMessage, QueryRequest, SessionId};
use ragsession::services::llm::GenerateResponse;

fn history(tag: usize, len: usize) -> Vec<ConversationMessage> {
    (1..=len as i64)
        .map(|id| {
            ConversationMessage::new(id, format!("q{tag}-{id}"), format!("a{tag}-{id}"))
        })
        .collect()
}

#[tokio::test]
async fn test_concurrent_switches_on_one_session_never_interleave() {
    let generator = ScriptedGenerator::new(|_| Ok(GenerateResponse::from_text("summary")))
        .with_delay(Duration::from_millis(20));
    let app = test_app(generator, in_memory_store(), &test_config());

    let switches = (1..=5).map(|tag| app.orchestrator.switch("shared", history(tag, tag)));
    for result in join_all(switches).await {
        assert!(result.unwrap().warnings.is_empty());
    }

    let (session, _) = app.orchestrator.history("shared").await.unwrap();
    let count = session.turn_count();
    assert!((1..=5).contains(&count));
    for (i, turn) in session.turns().iter().enumerate() {
        assert_eq!(turn.turn_id, i as i64 + 1);
        assert_eq!(turn.user_query, format!("q{count}-{}", i + 1));
    }
    assert_eq!(session.qa_index().len(), count);
    assert_eq!(app.cache.resident_count(), 1);
}

#[tokio::test]
async fn test_distinct_sessions_progress_in_parallel() {
    let generator = ScriptedGenerator::new(|_| Ok(GenerateResponse::from_text("summary")))
        .with_delay(Duration::from_millis(150));
    let app = test_app(generator, in_memory_store(), &test_config());

    let ids: Vec<String> = (0..4).map(|tag| format!("user-{tag}")).collect();
    let started = Instant::now();
    let switches = ids
        .iter()
        .enumerate()
        .map(|(tag, id)| app.orchestrator.switch(id, history(tag, 2)));
    for result in join_all(switches).await {
        assert_eq!(result.unwrap().turns, 2);
    }

    // Four sessions switched one after another would need at least 600ms
    assert!(started.elapsed() < Duration::from_millis(550));
    assert_eq!(app.cache.resident_count(), 4);
}

#[tokio::test]
async fn test_query_during_switch_sees_a_whole_history() {
    let app = test_app(maintenance_generator(), in_memory_store(), &test_config());
    app.orchestrator
        .switch(
            "busy",
            vec![ConversationMessage::new(
                1,
                "열차 정비 절차가 뭐야?",
                "일상점검, 주기점검, 특별점검으로 나뉩니다.",
            )],
        )
        .await
        .unwrap();

    let replacement = history(9, 3);
    let (switched, answered) = tokio::join!(
        app.orchestrator.switch("busy", replacement),
        app.orchestrator
            .query(QueryRequest::new("그거 주기가 어떻게 돼?").with_session("busy"))
    );

    assert_eq!(switched.unwrap().turns, 3);
    let answered = answered.unwrap();
    assert!(!answered.answer.is_empty());

    let (session, _) = app.orchestrator.history("busy").await.unwrap();
    assert_eq!(session.turn_count(), 3);
    assert!(session.turns().iter().all(|t| t.user_query.starts_with("q9-")));
}

#[tokio::test]
async fn test_recorded_turn_is_embedded_without_holding_the_session() {
    let mut config = test_config();
    config.query.append_query_turns = true;
    let embedder = Arc::new(GatedEmbedder::new(config.embedding.dimension));
    let app = test_app_with_embedder(
        maintenance_generator(),
        in_memory_store(),
        &config,
        embedder.clone(),
    );
    app.orchestrator.switch("gated", history(1, 2)).await.unwrap();
    embedder.arm();

    let query = app
        .orchestrator
        .query(QueryRequest::new("q1-3").with_session("gated"));
    let observer = async {
        embedder.entered.notified().await;
        let id = SessionId::new("gated").unwrap();
        let seen = tokio::time::timeout(Duration::from_secs(1), app.cache.get_or_create(&id))
            .await
            .map(|handle| handle.turn_count());
        embedder.release();
        seen
    };
    let (response, seen) = tokio::join!(query, observer);

    assert_eq!(seen.expect("session was locked while embedding"), 2);
    response.unwrap();
    let (session, _) = app.orchestrator.history("gated").await.unwrap();
    assert_eq!(session.turn_count(), 3);
}
