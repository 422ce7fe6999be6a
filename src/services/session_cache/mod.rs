//! Bounded, expiring cache of per-conversation state.
//!
//! Policy:
//! - capacity eviction drops the least recently used entry from memory only;
//!   the durable copy stays so the session can be reloaded later
//! - TTL expiry destroys both the in-memory entry and the durable record
//! - an entry with a live `SessionHandle` (or a caller waiting for one) is
//!   pinned and never evicted
//! - an entry whose last persist failed is dirty and is skipped by capacity
//!   eviction until a later `put` or flush succeeds
//!
//! The index lock is a plain `std::sync::Mutex` guarding map and metadata
//! updates. Storage calls happen outside of it, under the per-session lock
//! only.

pub mod store;
pub mod sweeper;

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::models::session::is_expired_at;
use crate::models::{Session, SessionId};
use crate::utils::{Clock, SystemClock};

pub use store::{SessionStore, SqliteSessionStore};
pub use sweeper::spawn_sweeper;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheSettings {
    /// Resident sessions allowed before capacity eviction kicks in
    pub max_sessions: usize,
    /// Idle time after which a session is destroyed; `None` disables expiry
    pub ttl: Option<Duration>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

impl CacheSettings {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            max_sessions: config.max_sessions.max(1),
            ttl: config.ttl(),
        }
    }
}

type Slot = Arc<Mutex<Session>>;

struct CacheEntry {
    slot: Slot,
    last_accessed_at: DateTime<Utc>,
    dirty: bool,
}

impl CacheEntry {
    /// A handle or a waiter holds another reference to the slot
    fn is_pinned(&self) -> bool {
        Arc::strong_count(&self.slot) > 1
    }
}

/// Exclusive access to one session.
///
/// Holding a handle serializes all other `get_or_create`/`remove` calls for
/// the same id and pins the entry against eviction. Mutations become durable
/// through `SessionCache::put`.
pub struct SessionHandle {
    slot: Slot,
    guard: OwnedMutexGuard<Session>,
    is_new: bool,
    detached: bool,
    warnings: Vec<String>,
}

impl SessionHandle {
    /// The session did not exist (or had expired) and was created by this call
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Storage was unavailable; the session lives only in this handle
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    fn warn(&mut self, message: String) {
        warn!(session_id = %self.guard.id, "{}", message);
        self.warnings.push(message);
    }
}

impl Deref for SessionHandle {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.guard
    }
}

impl DerefMut for SessionHandle {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.guard
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.guard.id)
            .field("turns", &self.guard.turn_count())
            .field("is_new", &self.is_new)
            .field("detached", &self.detached)
            .finish()
    }
}

/// Counts from one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired: usize,
    pub flushed: usize,
    pub evicted: usize,
}

pub struct SessionCache {
    entries: StdMutex<LruCache<SessionId, CacheEntry>>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
}

impl SessionCache {
    pub fn new(store: Arc<dyn SessionStore>, settings: CacheSettings) -> Self {
        Self::with_clock(store, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn SessionStore>,
        settings: CacheSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            // Capacity is enforced by policy so pinned and dirty entries can be skipped
            entries: StdMutex::new(LruCache::unbounded()),
            store,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    fn index(&self) -> MutexGuard<'_, LruCache<SessionId, CacheEntry>> {
        // Entries hold only metadata, so a panic elsewhere cannot leave them half-written
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, id: &SessionId, slot: &Slot) -> bool {
        self.index()
            .peek(id)
            .is_some_and(|entry| Arc::ptr_eq(&entry.slot, slot))
    }

    fn set_dirty(&self, id: &SessionId, slot: &Slot, dirty: bool) {
        if let Some(entry) = self.index().peek_mut(id) {
            if Arc::ptr_eq(&entry.slot, slot) {
                entry.dirty = dirty;
            }
        }
    }

    /// Lock the resident slot for `id`, installing a fresh placeholder when
    /// absent. Returns the slot, its guard, and whether the placeholder was
    /// installed by this call.
    async fn lock_slot(&self, id: &SessionId) -> (Slot, OwnedMutexGuard<Session>, bool) {
        loop {
            let now = self.clock.now();
            let (slot, fresh_guard) = {
                let mut entries = self.index();
                match entries.get_mut(id) {
                    Some(entry) => (Arc::clone(&entry.slot), None),
                    None => {
                        let slot: Slot = Arc::new(Mutex::new(Session::new(id.clone(), now)));
                        let guard = Arc::clone(&slot).try_lock_owned().ok();
                        entries.put(
                            id.clone(),
                            CacheEntry {
                                slot: Arc::clone(&slot),
                                last_accessed_at: now,
                                dirty: false,
                            },
                        );
                        (slot, guard)
                    }
                }
            };

            let installed = fresh_guard.is_some();
            let guard = match fresh_guard {
                Some(guard) => guard,
                None => Arc::clone(&slot).lock_owned().await,
            };

            // The entry may have been evicted or replaced while we waited
            if self.is_current(id, &slot) {
                return (slot, guard, installed);
            }
            debug!(session_id = %id, "Cache entry changed while waiting, retrying");
        }
    }

    /// Return the session for `id`, loading or creating it as needed.
    ///
    /// Never fails: storage problems degrade to a memory-only session and
    /// are reported through `SessionHandle::warnings`.
    pub async fn get_or_create(&self, id: &SessionId) -> SessionHandle {
        let (slot, guard, installed) = self.lock_slot(id).await;
        let mut handle = SessionHandle {
            slot,
            guard,
            is_new: false,
            detached: false,
            warnings: Vec::new(),
        };
        let now = self.clock.now();

        if installed {
            self.load_into(&mut handle, now).await;
        } else if handle.is_expired(self.settings.ttl, now) {
            info!(session_id = %id, "Resident session expired, recreating");
            if let Err(e) = self.store.delete(id).await {
                handle.warn(format!("failed to delete expired session: {e}"));
            }
            *handle.guard = Session::new(id.clone(), now);
            self.persist_new(&mut handle).await;
        }

        if !handle.detached {
            handle.guard.touch(now);
            if let Some(entry) = self.index().get_mut(id) {
                if Arc::ptr_eq(&entry.slot, &handle.slot) {
                    entry.last_accessed_at = handle.guard.last_accessed_at;
                }
            }
            if !handle.is_new {
                self.record_access(&mut handle).await;
            }
            self.evict_if_needed().await;
        }

        handle
    }

    /// Write the read's access time through to storage so durable expiry
    /// matches the resident entry. A failure leaves the entry dirty, which
    /// keeps it resident until a flush saves the whole session.
    async fn record_access(&self, handle: &mut SessionHandle) {
        let id = handle.guard.id.clone();
        if let Err(e) = self.store.touch(&id, handle.guard.last_accessed_at).await {
            self.set_dirty(&id, &handle.slot, true);
            handle.warn(format!("failed to record session access: {e}"));
        }
    }

    /// Fill a freshly installed placeholder from durable storage
    async fn load_into(&self, handle: &mut SessionHandle, now: DateTime<Utc>) {
        let id = handle.guard.id.clone();

        match self.store.load(&id).await {
            Ok(Some(stored)) if stored.is_expired(self.settings.ttl, now) => {
                info!(session_id = %id, "Stored session expired, recreating");
                if let Err(e) = self.store.delete(&id).await {
                    handle.warn(format!("failed to delete expired session: {e}"));
                }
                self.persist_new(handle).await;
            }
            Ok(Some(stored)) => {
                debug!(session_id = %id, turns = stored.turn_count(), "Session reloaded from storage");
                *handle.guard = stored;
            }
            Ok(None) => {
                debug!(session_id = %id, "Creating new session");
                self.persist_new(handle).await;
            }
            Err(e) if e.is_corrupt() => {
                warn!(session_id = %id, error = %e, "Stored session is corrupt, treating as absent");
                if let Err(e) = self.store.delete(&id).await {
                    handle.warn(format!("failed to delete corrupt session: {e}"));
                }
                self.persist_new(handle).await;
            }
            Err(e) => {
                // Serve from memory for this call only; waiters retry against storage
                {
                    let mut entries = self.index();
                    if entries
                        .peek(&id)
                        .is_some_and(|entry| Arc::ptr_eq(&entry.slot, &handle.slot))
                    {
                        entries.pop(&id);
                    }
                }
                handle.detached = true;
                handle.is_new = true;
                handle.guard.touch(now);
                handle.warn(format!(
                    "session storage unavailable, continuing with in-memory session: {e}"
                ));
            }
        }
    }

    async fn persist_new(&self, handle: &mut SessionHandle) {
        handle.is_new = true;
        let id = handle.guard.id.clone();
        match self.store.save(&handle.guard).await {
            Ok(()) => self.set_dirty(&id, &handle.slot, false),
            Err(e) => {
                self.set_dirty(&id, &handle.slot, true);
                handle.warn(format!("failed to persist new session: {e}"));
            }
        }
    }

    /// Persist the handle's session and mark it most recently used.
    ///
    /// A failed save leaves the entry dirty and adds a warning to the handle.
    pub async fn put(&self, handle: &mut SessionHandle) {
        let now = self.clock.now();
        handle.guard.touch(now);
        let id = handle.guard.id.clone();
        let result = self.store.save(&handle.guard).await;

        if !handle.detached {
            let mut entries = self.index();
            match entries.get_mut(&id) {
                Some(entry) if Arc::ptr_eq(&entry.slot, &handle.slot) => {
                    entry.last_accessed_at = handle.guard.last_accessed_at;
                    entry.dirty = result.is_err();
                }
                _ => {
                    // Unreachable while the handle pins the entry; reinstall to be safe
                    entries.put(
                        id.clone(),
                        CacheEntry {
                            slot: Arc::clone(&handle.slot),
                            last_accessed_at: handle.guard.last_accessed_at,
                            dirty: result.is_err(),
                        },
                    );
                }
            }
        }

        match result {
            Ok(()) => debug!(session_id = %id, turns = handle.guard.turn_count(), "Session persisted"),
            Err(e) => handle.warn(format!("failed to persist session: {e}")),
        }

        if !handle.detached {
            self.evict_if_needed().await;
        }
    }

    /// Drop least recently used entries from memory while over capacity.
    ///
    /// Pinned and dirty entries are skipped. Victims past their TTL are also
    /// deleted from storage. Every read and put has already written the
    /// access time through, so a victim's durable record is current before it
    /// leaves the index; the touch below only re-asserts it.
    pub async fn evict_if_needed(&self) -> usize {
        let now = self.clock.now();
        let victims: Vec<(SessionId, CacheEntry)> = {
            let mut entries = self.index();
            let excess = entries.len().saturating_sub(self.settings.max_sessions);
            if excess == 0 {
                return 0;
            }

            let ids: Vec<SessionId> = entries
                .iter()
                .rev()
                .filter(|(_, entry)| !entry.is_pinned() && !entry.dirty)
                .map(|(id, _)| id.clone())
                .take(excess)
                .collect();

            ids.into_iter()
                .filter_map(|id| entries.pop(&id).map(|entry| (id, entry)))
                .collect()
        };

        for (id, entry) in &victims {
            if is_expired_at(entry.last_accessed_at, self.settings.ttl, now) {
                debug!(session_id = %id, "Evicting expired session");
                if let Err(e) = self.store.delete(id).await {
                    warn!(session_id = %id, error = %e, "Failed to delete expired session");
                }
            } else {
                debug!(session_id = %id, "Evicting least recently used session");
                if let Err(e) = self.store.touch(id, entry.last_accessed_at).await {
                    warn!(session_id = %id, error = %e, "Failed to record access time on eviction");
                }
            }
        }

        victims.len()
    }

    /// Destroy every session idle past its TTL, resident or not.
    ///
    /// Returns the number of sessions removed from memory plus the number of
    /// durable records purged.
    pub async fn sweep_expired(&self) -> usize {
        let Some(ttl) = self.settings.ttl else {
            return 0;
        };
        let now = self.clock.now();

        let victims: Vec<SessionId> = {
            let mut entries = self.index();
            let ids: Vec<SessionId> = entries
                .iter()
                .filter(|(_, entry)| {
                    !entry.is_pinned() && is_expired_at(entry.last_accessed_at, Some(ttl), now)
                })
                .map(|(id, _)| id.clone())
                .collect();
            for id in &ids {
                entries.pop(id);
            }
            ids
        };

        for id in &victims {
            if let Err(e) = self.store.delete(id).await {
                warn!(session_id = %id, error = %e, "Failed to delete expired session");
            }
        }

        let resident: Vec<SessionId> = self.index().iter().map(|(id, _)| id.clone()).collect();
        let purged = match self.store.purge_expired(now - ttl, &resident).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Failed to purge expired sessions from storage");
                0
            }
        };

        let total = victims.len() + purged;
        if total > 0 {
            info!(resident = victims.len(), stored = purged, "Expired sessions removed");
        }
        total
    }

    /// Retry persisting entries whose last save failed. Returns how many succeeded.
    pub async fn flush_dirty(&self) -> usize {
        let dirty: Vec<(SessionId, Slot)> = self
            .index()
            .iter()
            .filter(|(_, entry)| entry.dirty && !entry.is_pinned())
            .map(|(id, entry)| (id.clone(), Arc::clone(&entry.slot)))
            .collect();

        let mut flushed = 0;
        for (id, slot) in dirty {
            let session = slot.lock().await;
            if !self.is_current(&id, &slot) {
                continue;
            }
            match self.store.save(&session).await {
                Ok(()) => {
                    self.set_dirty(&id, &slot, false);
                    flushed += 1;
                }
                Err(e) => warn!(session_id = %id, error = %e, "Dirty session still not persisted"),
            }
        }
        flushed
    }

    /// Destroy a session in memory and storage.
    ///
    /// Waits for any in-flight handle on the same id first.
    pub async fn remove(&self, id: &SessionId) -> crate::Result<()> {
        let (slot, _guard, _) = self.lock_slot(id).await;

        // Delete while the entry still routes newcomers to our locked slot
        let result = self.store.delete(id).await;

        {
            let mut entries = self.index();
            if entries
                .peek(id)
                .is_some_and(|entry| Arc::ptr_eq(&entry.slot, &slot))
            {
                entries.pop(id);
            }
        }

        match &result {
            Ok(()) => info!(session_id = %id, "Session removed"),
            Err(e) => warn!(session_id = %id, error = %e, "Failed to delete session from storage"),
        }
        result
    }

    /// One sweep, flush and eviction pass
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let expired = self.sweep_expired().await;
        let flushed = self.flush_dirty().await;
        let evicted = self.evict_if_needed().await;
        MaintenanceReport {
            expired,
            flushed,
            evicted,
        }
    }

    pub fn resident_count(&self) -> usize {
        self.index().len()
    }

    pub fn contains_resident(&self, id: &SessionId) -> bool {
        self.index().contains(id)
    }

    pub fn is_dirty(&self, id: &SessionId) -> bool {
        self.index().peek(id).is_some_and(|entry| entry.dirty)
    }

    /// Forget a pending persist for `id`, making it evictable again
    pub fn mark_clean(&self, id: &SessionId) {
        if let Some(entry) = self.index().peek_mut(id) {
            entry.dirty = false;
        }
    }

    /// Resident ids from most to least recently used
    pub fn resident_ids(&self) -> Vec<SessionId> {
        self.index().iter().map(|(id, _)| id.clone()).collect()
    }
}
