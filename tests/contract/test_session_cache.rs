#[path = "../common/mod.rs"]
mod common;

use chrono::Duration;
use std::sync::Arc;

use common::{FailMode, FailingStore};
use ragsession::models::{QaTurn, SessionId};
use ragsession::services::{CacheSettings, SessionCache, SessionStore, SqliteSessionStore};
use ragsession::utils::{Clock, ManualClock};

fn id(raw: &str) -> SessionId {
    SessionId::new(raw).unwrap()
}

fn setup(max_sessions: usize) -> (SessionCache, Arc<SqliteSessionStore>, Arc<ManualClock>) {
    let store = Arc::new(SqliteSessionStore::in_memory().unwrap());
    let clock = Arc::new(ManualClock::default());
    let cache = SessionCache::with_clock(
        store.clone(),
        CacheSettings {
            max_sessions,
            ttl: Some(Duration::hours(1)),
        },
        clock.clone(),
    );
    (cache, store, clock)
}

async fn add_turn(cache: &SessionCache, session: &SessionId, text: &str) {
    let mut handle = cache.get_or_create(session).await;
    let now = cache.clock().now();
    let turn = QaTurn::new(handle.next_turn_id(), text, format!("answer to {text}"), now);
    assert!(handle.append_turn(turn, now));
    cache.put(&mut handle).await;
    assert!(handle.warnings().is_empty());
}

#[tokio::test]
async fn test_unknown_id_yields_empty_session() {
    let (cache, store, _) = setup(4);

    let handle = cache.get_or_create(&id("fresh")).await;
    assert!(handle.is_new());
    assert!(handle.is_empty());
    assert!(handle.summary_all.is_empty());
    assert!(handle.summary_recent.is_empty());
    drop(handle);

    assert!(store.load(&id("fresh")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_lru_evicts_first_created_and_reloads_it() {
    let (cache, _, clock) = setup(2);
    add_turn(&cache, &id("a"), "first").await;
    clock.advance(Duration::seconds(1));
    add_turn(&cache, &id("b"), "second").await;
    clock.advance(Duration::seconds(1));
    add_turn(&cache, &id("c"), "third").await;

    assert_eq!(cache.resident_count(), 2);
    assert!(!cache.contains_resident(&id("a")));
    assert!(cache.contains_resident(&id("b")));
    assert!(cache.contains_resident(&id("c")));

    let handle = cache.get_or_create(&id("a")).await;
    assert!(!handle.is_new());
    assert_eq!(handle.turn_count(), 1);
    assert_eq!(handle.turns()[0].user_query, "first");
    drop(handle);

    // Reloading "a" pushed out the next least recently used entry
    assert!(!cache.contains_resident(&id("b")));
}

#[tokio::test]
async fn test_access_refreshes_recency() {
    let (cache, _, _) = setup(2);
    drop(cache.get_or_create(&id("a")).await);
    drop(cache.get_or_create(&id("b")).await);
    drop(cache.get_or_create(&id("a")).await);
    drop(cache.get_or_create(&id("c")).await);

    assert!(cache.contains_resident(&id("a")));
    assert!(!cache.contains_resident(&id("b")));
    assert_eq!(cache.resident_ids(), vec![id("c"), id("a")]);
}

#[tokio::test]
async fn test_ttl_sweep_is_destructive() {
    let (cache, store, clock) = setup(4);
    add_turn(&cache, &id("old"), "stale question").await;

    clock.advance(Duration::minutes(61));
    assert!(cache.sweep_expired().await >= 1);

    assert!(!cache.contains_resident(&id("old")));
    assert!(store.load(&id("old")).await.unwrap().is_none());

    let handle = cache.get_or_create(&id("old")).await;
    assert!(handle.is_new());
    assert!(handle.is_empty());
}

#[tokio::test]
async fn test_ttl_sweep_purges_evicted_sessions_from_storage() {
    let (cache, store, clock) = setup(1);
    add_turn(&cache, &id("evicted"), "q").await;
    clock.advance(Duration::seconds(1));
    drop(cache.get_or_create(&id("resident")).await);
    assert!(!cache.contains_resident(&id("evicted")));
    assert!(store.load(&id("evicted")).await.unwrap().is_some());

    clock.advance(Duration::hours(2));
    cache.sweep_expired().await;

    assert!(store.load(&id("evicted")).await.unwrap().is_none());
    assert!(store.load(&id("resident")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_expired_resident_is_recreated_on_access() {
    let (cache, store, clock) = setup(4);
    add_turn(&cache, &id("s"), "q").await;
    clock.advance(Duration::hours(2));

    let handle = cache.get_or_create(&id("s")).await;
    assert!(handle.is_new());
    assert!(handle.is_empty());
    drop(handle);

    let stored = store.load(&id("s")).await.unwrap().unwrap();
    assert!(stored.is_empty());
}

#[tokio::test]
async fn test_pinned_entry_survives_capacity_pressure() {
    let (cache, _, _) = setup(1);

    let pinned = cache.get_or_create(&id("pinned")).await;
    let other = cache.get_or_create(&id("other")).await;
    assert_eq!(cache.resident_count(), 2);
    drop(other);

    assert_eq!(cache.evict_if_needed().await, 1);
    assert!(cache.contains_resident(&id("pinned")));
    assert!(!cache.contains_resident(&id("other")));
    drop(pinned);
}

#[tokio::test]
async fn test_pinned_entry_survives_sweep() {
    let (cache, _, clock) = setup(4);
    let handle = cache.get_or_create(&id("busy")).await;
    clock.advance(Duration::hours(3));

    cache.sweep_expired().await;
    assert!(cache.contains_resident(&id("busy")));
    drop(handle);

    cache.sweep_expired().await;
    assert!(!cache.contains_resident(&id("busy")));
}

#[tokio::test]
async fn test_dirty_entries_are_exempt_from_eviction() {
    let store = Arc::new(FailingStore::new(FailMode::FailSaves));
    let cache = SessionCache::with_clock(
        store.clone(),
        CacheSettings {
            max_sessions: 1,
            ttl: None,
        },
        Arc::new(ManualClock::default()),
    );

    let mut handle = cache.get_or_create(&id("a")).await;
    let now = cache.clock().now();
    handle.append_turn(QaTurn::new(1, "unsaved", "answer", now), now);
    cache.put(&mut handle).await;
    assert!(!handle.warnings().is_empty());
    drop(handle);
    assert!(cache.is_dirty(&id("a")));

    drop(cache.get_or_create(&id("b")).await);
    assert!(cache.contains_resident(&id("a")));
    assert!(cache.contains_resident(&id("b")));

    store.set_mode(FailMode::Healthy);
    assert_eq!(cache.flush_dirty().await, 2);
    assert!(!cache.is_dirty(&id("a")));
    assert_eq!(cache.evict_if_needed().await, 1);

    let saved = store.inner().load(&id("a")).await.unwrap().unwrap();
    assert_eq!(saved.turn_count(), 1);
}

#[tokio::test]
async fn test_remove_destroys_memory_and_storage() {
    let (cache, store, _) = setup(4);
    add_turn(&cache, &id("gone"), "q").await;

    cache.remove(&id("gone")).await.unwrap();
    assert!(!cache.contains_resident(&id("gone")));
    assert!(store.load(&id("gone")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_maintenance_report() {
    let (cache, _, clock) = setup(4);
    drop(cache.get_or_create(&id("x")).await);
    clock.advance(Duration::hours(2));

    let report = cache.run_maintenance().await;
    assert_eq!(report.expired, 1);
    assert_eq!(report.evicted, 0);
}

fn file_cache(path: &std::path::Path, clock: &Arc<ManualClock>) -> SessionCache {
    let store = Arc::new(SqliteSessionStore::open(path).unwrap());
    SessionCache::with_clock(
        store,
        CacheSettings {
            max_sessions: 4,
            ttl: Some(Duration::hours(1)),
        },
        clock.clone(),
    )
}

#[tokio::test]
async fn test_reads_keep_session_alive_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sessions.db");
    let clock = Arc::new(ManualClock::default());

    {
        let cache = file_cache(&db_path, &clock);
        let mut handle = cache.get_or_create(&id("reader")).await;
        handle.summary_all = "kept".to_string();
        cache.put(&mut handle).await;
    }

    // Each process only reads; none of them calls put
    clock.advance(Duration::minutes(50));
    {
        let cache = file_cache(&db_path, &clock);
        let handle = cache.get_or_create(&id("reader")).await;
        assert!(!handle.is_new());
        assert!(handle.warnings().is_empty());
    }

    clock.advance(Duration::minutes(20));
    let cache = file_cache(&db_path, &clock);
    assert_eq!(cache.sweep_expired().await, 0);
    let handle = cache.get_or_create(&id("reader")).await;
    assert!(!handle.is_new());
    assert_eq!(handle.summary_all, "kept");
}

#[tokio::test]
async fn test_failed_access_write_keeps_entry_dirty() {
    let store = Arc::new(FailingStore::new(FailMode::Healthy));
    let cache = SessionCache::with_clock(
        store.clone(),
        CacheSettings {
            max_sessions: 1,
            ttl: Some(Duration::hours(1)),
        },
        Arc::new(ManualClock::default()),
    );
    drop(cache.get_or_create(&id("a")).await);

    store.set_mode(FailMode::FailSaves);
    let handle = cache.get_or_create(&id("a")).await;
    assert!(handle
        .warnings()
        .iter()
        .any(|w| w.contains("failed to record session access")));
    drop(handle);
    assert!(cache.is_dirty(&id("a")));

    store.set_mode(FailMode::Healthy);
    assert_eq!(cache.flush_dirty().await, 1);
    assert!(!cache.is_dirty(&id("a")));
}
