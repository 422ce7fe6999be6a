use chrono::{Duration, Utc};
use ragsession::models::QaTurn;
use ragsession::services::{Embedder, HashingEmbedder, QaIndex};

fn turn(id: i64, embedding: Vec<f32>) -> QaTurn {
    QaTurn::new(id, format!("q{id}"), format!("a{id}"), Utc::now()).with_embedding(embedding)
}

#[test]
fn test_empty_index_returns_no_hits() {
    let index = QaIndex::new();
    assert!(index.search(&[1.0, 0.0], 3, 0.0).is_empty());
}

#[test]
fn test_insert_same_turn_id_is_noop() {
    let mut index = QaIndex::new();
    assert!(index.insert(turn(1, vec![1.0, 0.0])));
    assert!(!index.insert(turn(1, vec![0.0, 1.0])));

    assert_eq!(index.len(), 1);
    assert_eq!(index.get(1).unwrap().embedding(), &[1.0, 0.0]);
}

#[test]
fn test_turns_stay_ordered_by_id() {
    let index = QaIndex::from_turns(vec![
        turn(3, vec![1.0]),
        turn(1, vec![1.0]),
        turn(2, vec![1.0]),
    ]);
    let ids: Vec<i64> = index.turns().iter().map(|t| t.turn_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(index.last_turn_id(), Some(3));
}

#[test]
fn test_ranking_and_recency_tie_break() {
    let index = QaIndex::from_turns(vec![
        turn(1, vec![1.0, 0.0]),
        turn(2, vec![0.6, 0.8]),
        turn(3, vec![1.0, 0.0]),
        turn(4, vec![0.0, 1.0]),
    ]);

    let hits = index.search(&[1.0, 0.0], 3, 0.0);
    let ids: Vec<i64> = hits.iter().map(|hit| hit.turn.turn_id).collect();
    assert_eq!(ids, vec![3, 1, 2]);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
}

#[test]
fn test_min_relevance_filters_everything() {
    let index = QaIndex::from_turns(vec![turn(1, vec![0.6, 0.8])]);
    assert!(index.search(&[1.0, 0.0], 5, 0.9).is_empty());
    assert_eq!(index.search(&[1.0, 0.0], 5, 0.5).len(), 1);
}

#[test]
fn test_turn_without_embedding_never_matches() {
    let index = QaIndex::from_turns(vec![QaTurn::new(1, "q", "a", Utc::now())]);
    assert!(index.search(&[1.0, 0.0], 5, 0.0).is_empty());
}

#[tokio::test]
async fn test_each_turn_found_by_its_own_text() {
    let embedder = HashingEmbedder::new(256);
    let start = Utc::now();
    let pairs = [
        ("열차 정비 절차가 뭐야?", "일상점검, 주기점검, 특별점검으로 나뉩니다."),
        ("How often are brake pads replaced?", "Every 60,000 km or when worn below 3 mm."),
        ("운전실 공조 장치 필터는?", "분기마다 세척합니다."),
    ];

    let mut turns = Vec::new();
    for (i, (query, answer)) in pairs.iter().enumerate() {
        let turn = QaTurn::new(i as i64 + 1, *query, *answer, start + Duration::seconds(i as i64));
        let embedding = embedder.embed_one(&turn.document_text()).await.unwrap();
        turns.push(turn.with_embedding(embedding));
    }
    let index = QaIndex::from_turns(turns.clone());

    for turn in &turns {
        let query = embedder.embed_one(&turn.document_text()).await.unwrap();
        let hits = index.search(&query, 1, 0.05);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].turn.turn_id, turn.turn_id);
        assert!(hits[0].score > 0.99);
    }
}
