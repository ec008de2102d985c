//! Per-user clipboard state.
//!
//! One row per user id holds the current payload, its copy time, the
//! producer's delay getter, the snapshot published to peers, the last remote
//! event consumed and the input-method pid.  Change counters live in a
//! separate map because they follow the *active* user rather than the row.
//!
//! # Concurrency
//!
//! Payloads are stored as `Arc<PasteData>` and replaced wholesale, so a reader
//! that cloned the `Arc` keeps a complete payload even if a writer replaces
//! it a microsecond later.  Locks are plain `std::sync` locks held only for
//! map lookups; nothing awaits while holding one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use pasteboard_core::protocol::messages::DistributedEvent;
use pasteboard_core::PasteData;
use tracing::{debug, info};

use super::delay::DelayGetterHandle;

/// The payload this device published for peers, with its announcement.
#[derive(Debug, Clone)]
pub struct DistributedSnapshot {
    pub event: DistributedEvent,
    pub data: Arc<PasteData>,
}

/// The current payload with the delay getter and remote event read
/// alongside it, so all three describe the same copy.
#[derive(Debug, Clone)]
pub struct CurrentPayload {
    pub data: Arc<PasteData>,
    pub delay_getter: Option<DelayGetterHandle>,
    pub remote_event: Option<DistributedEvent>,
}

#[derive(Debug)]
struct UserRow {
    current: Option<Arc<PasteData>>,
    delay_getter: Option<DelayGetterHandle>,
    copy_time: Option<Instant>,
    published: Option<DistributedSnapshot>,
    last_remote: Option<DistributedEvent>,
    ime_pid: Option<u32>,
    next_data_id: u32,
}

impl Default for UserRow {
    fn default() -> Self {
        Self {
            current: None,
            delay_getter: None,
            copy_time: None,
            published: None,
            last_remote: None,
            ime_pid: None,
            next_data_id: 1,
        }
    }
}

impl UserRow {
    fn take_data_id(&mut self) -> u32 {
        let id = self.next_data_id;
        self.next_data_id = self.next_data_id.wrapping_add(1).max(1);
        id
    }

    fn is_aged(&self, window: Duration) -> bool {
        match self.copy_time {
            None => true,
            Some(t) => t.elapsed() > window,
        }
    }

    /// Drops the payload only if it is still aged when the row is examined.
    fn evict_if_aged(&mut self, window: Duration) -> bool {
        self.is_aged(window) && self.drop_payload()
    }

    fn drop_payload(&mut self) -> bool {
        let had_payload = self.current.take().is_some();
        self.delay_getter = None;
        self.copy_time = None;
        had_payload
    }
}

/// Concurrent map from user id to clipboard state.
#[derive(Debug)]
pub struct ClipboardStore {
    rows: RwLock<HashMap<u32, UserRow>>,
    change_counts: Mutex<HashMap<u32, u32>>,
    active_user: Mutex<Option<u32>>,
    aged_window: Duration,
}

impl ClipboardStore {
    pub fn new(aged_window: Duration) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            change_counts: Mutex::new(HashMap::new()),
            active_user: Mutex::new(None),
            aged_window,
        }
    }

    pub fn aged_window(&self) -> Duration {
        self.aged_window
    }

    fn read_rows(&self) -> RwLockReadGuard<'_, HashMap<u32, UserRow>> {
        self.rows.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_rows(&self) -> RwLockWriteGuard<'_, HashMap<u32, UserRow>> {
        self.rows.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn counts(&self) -> MutexGuard<'_, HashMap<u32, u32>> {
        self.change_counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ── Current payload ───────────────────────────────────────────────────────

    /// Replaces the user's current payload, stamping its data id.
    ///
    /// The previously published snapshot is dropped; the caller publishes the
    /// new payload if it is shareable.
    pub fn save(
        &self,
        user_id: u32,
        mut data: PasteData,
        delay_getter: Option<DelayGetterHandle>,
    ) -> Arc<PasteData> {
        let mut rows = self.write_rows();
        let row = rows.entry(user_id).or_default();
        data.props_mut().data_id = row.take_data_id();
        let data = Arc::new(data);
        row.current = Some(Arc::clone(&data));
        row.delay_getter = delay_getter;
        row.copy_time = Some(Instant::now());
        row.published = None;
        debug!(user_id, data_id = data.data_id(), "current payload replaced");
        data
    }

    /// Installs a payload fetched from a peer and remembers its event.
    ///
    /// Returns `None` if `event` was already installed, so concurrent readers
    /// that fetched the same event install it once.
    pub fn install_remote(
        &self,
        user_id: u32,
        mut data: PasteData,
        event: DistributedEvent,
    ) -> Option<Arc<PasteData>> {
        let mut rows = self.write_rows();
        let row = rows.entry(user_id).or_default();
        if row.last_remote.as_ref() == Some(&event) {
            return None;
        }
        data.props_mut().data_id = row.take_data_id();
        data.props_mut().is_remote = true;
        let data = Arc::new(data);
        row.current = Some(Arc::clone(&data));
        row.delay_getter = None;
        row.copy_time = Some(Instant::now());
        row.published = None;
        row.last_remote = Some(event);
        debug!(user_id, data_id = data.data_id(), "remote payload installed");
        Some(data)
    }

    pub fn current(&self, user_id: u32) -> Option<Arc<PasteData>> {
        self.read_rows()
            .get(&user_id)
            .and_then(|row| row.current.clone())
    }

    /// Payload, delay getter and last remote event under one lock.
    pub fn current_payload(&self, user_id: u32) -> Option<CurrentPayload> {
        let rows = self.read_rows();
        let row = rows.get(&user_id)?;
        Some(CurrentPayload {
            data: row.current.clone()?,
            delay_getter: row.delay_getter.clone(),
            remote_event: row.last_remote.clone(),
        })
    }

    /// The remote event the user's clipboard was last filled from.
    pub fn last_remote_event(&self, user_id: u32) -> Option<DistributedEvent> {
        self.read_rows()
            .get(&user_id)
            .and_then(|row| row.last_remote.clone())
    }

    /// Marks `event` as consumed without installing anything.
    pub fn mark_remote_consumed(&self, user_id: u32, event: DistributedEvent) {
        self.write_rows().entry(user_id).or_default().last_remote = Some(event);
    }

    /// Removes the user's payload and its bookkeeping.
    ///
    /// Returns `true` if a payload was actually removed.
    pub fn clear(&self, user_id: u32) -> bool {
        let mut rows = self.write_rows();
        let Some(row) = rows.get_mut(&user_id) else {
            return false;
        };
        row.published = None;
        row.drop_payload()
    }

    // ── Aging ─────────────────────────────────────────────────────────────────

    /// `true` if no copy time is recorded or the copy is older than the
    /// aging window.
    pub fn is_data_aged(&self, user_id: u32) -> bool {
        self.read_rows()
            .get(&user_id)
            .map_or(true, |row| row.is_aged(self.aged_window))
    }

    /// Evicts the user's payload, copy time and change count if aged.
    ///
    /// The age is checked under the write lock, so a copy saved after a
    /// caller's own [`Self::is_data_aged`] check survives.  Returns `true` if
    /// something was evicted.
    pub fn clear_aged_data(&self, user_id: u32) -> bool {
        let removed = {
            let mut rows = self.write_rows();
            match rows.get_mut(&user_id) {
                Some(row) => row.evict_if_aged(self.aged_window),
                None => false,
            }
        };
        if removed {
            self.counts().remove(&user_id);
            info!(user_id, "aged clipboard data evicted");
        }
        removed
    }

    /// Overrides the recorded copy time.
    pub fn set_copy_time(&self, user_id: u32, copy_time: Option<Instant>) {
        self.write_rows().entry(user_id).or_default().copy_time = copy_time;
    }

    // ── Change counter ────────────────────────────────────────────────────────

    /// Increments the user's change counter, wrapping to `0` past `u32::MAX`.
    pub fn increase_change_count(&self, user_id: u32) -> u32 {
        let mut counts = self.counts();
        let count = counts.entry(user_id).or_insert(0);
        *count = count.wrapping_add(1);
        *count
    }

    pub fn change_count(&self, user_id: u32) -> u32 {
        self.counts().get(&user_id).copied().unwrap_or(0)
    }

    pub fn set_change_count(&self, user_id: u32, value: u32) {
        self.counts().insert(user_id, value);
    }

    /// Records the newly active user and resets its visible counter.
    pub fn on_user_switched(&self, user_id: u32) {
        let mut active = self.active_user.lock().unwrap_or_else(PoisonError::into_inner);
        if *active != Some(user_id) {
            *active = Some(user_id);
            self.counts().insert(user_id, 0);
            info!(user_id, "active user switched");
        }
    }

    pub fn active_user(&self) -> Option<u32> {
        *self.active_user.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Input method ──────────────────────────────────────────────────────────

    pub fn set_input_method_pid(&self, user_id: u32, pid: Option<u32>) {
        self.write_rows().entry(user_id).or_default().ime_pid = pid;
    }

    pub fn input_method_pid(&self, user_id: u32) -> Option<u32> {
        self.read_rows().get(&user_id).and_then(|row| row.ime_pid)
    }

    /// Forgets `pid` as input method for every user.
    pub fn release_input_method_pid(&self, pid: u32) {
        for row in self.write_rows().values_mut() {
            if row.ime_pid == Some(pid) {
                row.ime_pid = None;
            }
        }
    }

    // ── Distributed snapshot ──────────────────────────────────────────────────

    pub fn set_published(&self, user_id: u32, snapshot: DistributedSnapshot) {
        self.write_rows().entry(user_id).or_default().published = Some(snapshot);
    }

    /// The published snapshot, if its sequence id is `seq_id`.
    pub fn published(&self, user_id: u32, seq_id: u64) -> Option<DistributedSnapshot> {
        self.read_rows()
            .get(&user_id)
            .and_then(|row| row.published.clone())
            .filter(|snap| snap.event.seq_id == seq_id)
    }

    // ── Rows ──────────────────────────────────────────────────────────────────

    /// Drops every trace of `user_id`.
    pub fn remove_user(&self, user_id: u32) {
        self.write_rows().remove(&user_id);
        self.counts().remove(&user_id);
        info!(user_id, "user clipboard state removed");
    }

    pub fn user_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.read_rows().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const USER: u32 = 100;

    fn store() -> ClipboardStore {
        ClipboardStore::new(Duration::from_secs(60))
    }

    fn event(seq_id: u64) -> DistributedEvent {
        DistributedEvent {
            device_id: "net-b".into(),
            user_id: USER,
            seq_id,
            timestamp_ms: 0,
            expiration_ms: u64::MAX,
            data_len: 10,
            is_delay: false,
            mime_types: vec!["text/plain".into()],
        }
    }

    #[test]
    fn test_save_stamps_monotonic_data_ids_from_one() {
        // Arrange
        let store = store();

        // Act
        let first = store.save(USER, PasteData::with_text("a"), None);
        let second = store.save(USER, PasteData::with_text("b"), None);

        // Assert
        assert_eq!(first.data_id(), 1);
        assert_eq!(second.data_id(), 2);
        assert_eq!(store.current(USER).unwrap().primary_text(), Some("b"));
    }

    #[test]
    fn test_data_ids_are_per_user() {
        let store = store();
        store.save(USER, PasteData::with_text("a"), None);
        let other = store.save(101, PasteData::with_text("b"), None);
        assert_eq!(other.data_id(), 1);
    }

    #[test]
    fn test_reader_keeps_old_payload_across_replacement() {
        // Arrange
        let store = store();
        store.save(USER, PasteData::with_text("old"), None);
        let held = store.current(USER).unwrap();

        // Act
        store.save(USER, PasteData::with_text("new"), None);

        // Assert
        assert_eq!(held.primary_text(), Some("old"));
        assert_eq!(store.current(USER).unwrap().primary_text(), Some("new"));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = store();
        store.save(USER, PasteData::with_text("a"), None);

        assert!(store.clear(USER));
        assert!(!store.clear(USER));
        assert!(!store.clear(999));
        assert!(store.current(USER).is_none());
    }

    #[test]
    fn test_data_id_keeps_counting_after_clear() {
        let store = store();
        store.save(USER, PasteData::with_text("a"), None);
        store.clear(USER);
        let next = store.save(USER, PasteData::with_text("b"), None);
        assert_eq!(next.data_id(), 2);
    }

    #[test]
    fn test_is_data_aged_without_copy_time() {
        let store = store();
        assert!(store.is_data_aged(USER));
    }

    #[test]
    fn test_is_data_aged_by_window() {
        // Arrange
        let store = ClipboardStore::new(Duration::from_millis(1));
        store.save(USER, PasteData::with_text("a"), None);

        // Act / Assert: fresh copy
        store.set_copy_time(USER, Some(Instant::now()));
        assert!(!store.is_data_aged(USER));

        // Act / Assert: copy two milliseconds ago
        let past = Instant::now()
            .checked_sub(Duration::from_millis(2))
            .expect("monotonic clock is past boot by more than 2 ms");
        store.set_copy_time(USER, Some(past));
        assert!(store.is_data_aged(USER));
    }

    #[test]
    fn test_clear_aged_data_evicts_payload_and_counter() {
        // Arrange
        let store = ClipboardStore::new(Duration::from_millis(1));
        store.save(USER, PasteData::with_text("a"), None);
        store.increase_change_count(USER);
        let past = Instant::now()
            .checked_sub(Duration::from_millis(5))
            .expect("clock");
        store.set_copy_time(USER, Some(past));

        // Act
        let evicted = store.clear_aged_data(USER);

        // Assert
        assert!(evicted);
        assert!(store.current(USER).is_none());
        assert_eq!(store.change_count(USER), 0);
    }

    #[test]
    fn test_clear_aged_data_keeps_fresh_payload() {
        let store = store();
        store.save(USER, PasteData::with_text("a"), None);
        assert!(!store.clear_aged_data(USER));
        assert!(store.current(USER).is_some());
    }

    #[test]
    fn test_eviction_rechecks_age_of_the_row_it_holds() {
        // Arrange: a row that was aged, then received a fresh copy
        let window = Duration::from_secs(60);
        let mut row = UserRow::default();
        row.current = Some(Arc::new(PasteData::with_text("recopied")));
        row.copy_time = Some(Instant::now());

        // Act
        let evicted = row.evict_if_aged(window);

        // Assert
        assert!(!evicted);
        assert!(row.current.is_some());
    }

    #[test]
    fn test_clear_aged_data_spares_copy_saved_after_age_check() {
        // Arrange: the caller saw aged data
        let store = ClipboardStore::new(Duration::from_secs(60));
        store.save(USER, PasteData::with_text("old"), None);
        store.set_copy_time(USER, None);
        assert!(store.is_data_aged(USER));

        // Act: a writer saves before the eviction runs
        store.save(USER, PasteData::with_text("new"), None);
        let evicted = store.clear_aged_data(USER);

        // Assert
        assert!(!evicted);
        assert_eq!(store.current(USER).unwrap().primary_text(), Some("new"));
    }

    #[test]
    fn test_current_payload_pairs_data_with_its_getter() {
        // Arrange
        let store = store();
        let (getter, _rx) = crate::application::delay::delay_getter_channel(1);
        store.save(USER, PasteData::delayed([pasteboard_core::model::mime::utd::PLAIN_TEXT]), Some(getter));

        // Act
        let with_getter = store.current_payload(USER).unwrap();
        store.save(USER, PasteData::with_text("plain"), None);
        let without_getter = store.current_payload(USER).unwrap();

        // Assert
        assert!(with_getter.data.is_delay_data());
        assert!(with_getter.delay_getter.is_some());
        assert_eq!(without_getter.data.primary_text(), Some("plain"));
        assert!(without_getter.delay_getter.is_none());
        assert!(store.current_payload(999).is_none());
    }

    #[test]
    fn test_change_count_wraps_at_maximum() {
        let store = store();
        store.set_change_count(USER, u32::MAX);

        assert_eq!(store.increase_change_count(USER), 0);
        assert_eq!(store.increase_change_count(USER), 1);
    }

    #[test]
    fn test_user_switch_resets_counter_for_new_user() {
        // Arrange
        let store = store();
        store.on_user_switched(USER);
        store.set_change_count(101, 7);

        // Act
        store.on_user_switched(101);

        // Assert
        assert_eq!(store.change_count(101), 0);
        assert_eq!(store.active_user(), Some(101));
    }

    #[test]
    fn test_install_remote_marks_payload_remote() {
        let store = store();

        let data = store
            .install_remote(USER, PasteData::with_text("r"), event(4))
            .unwrap();

        assert!(data.is_remote());
        assert_eq!(store.last_remote_event(USER).unwrap().seq_id, 4);
        assert!(store.current_payload(USER).unwrap().delay_getter.is_none());
    }

    #[test]
    fn test_install_remote_is_once_per_event() {
        let store = store();
        store.install_remote(USER, PasteData::with_text("r"), event(4));

        let again = store.install_remote(USER, PasteData::with_text("r"), event(4));

        assert!(again.is_none());
        assert_eq!(store.current(USER).unwrap().data_id(), 1);
    }

    #[test]
    fn test_local_save_drops_published_snapshot() {
        let store = store();
        store.set_published(
            USER,
            DistributedSnapshot {
                event: event(2),
                data: Arc::new(PasteData::with_text("old")),
            },
        );

        store.save(USER, PasteData::with_text("new"), None);

        assert!(store.published(USER, 2).is_none());
    }

    #[test]
    fn test_published_snapshot_matches_sequence() {
        let store = store();
        let data = Arc::new(PasteData::with_text("p"));
        store.set_published(
            USER,
            DistributedSnapshot {
                event: event(9),
                data,
            },
        );

        assert!(store.published(USER, 9).is_some());
        assert!(store.published(USER, 8).is_none());
        store.clear(USER);
        assert!(store.published(USER, 9).is_none());
    }

    #[test]
    fn test_input_method_pid_is_released_by_pid() {
        let store = store();
        store.set_input_method_pid(USER, Some(42));
        store.set_input_method_pid(101, Some(43));

        store.release_input_method_pid(42);

        assert_eq!(store.input_method_pid(USER), None);
        assert_eq!(store.input_method_pid(101), Some(43));
    }

    #[test]
    fn test_remove_user_drops_row() {
        let store = store();
        store.save(USER, PasteData::with_text("a"), None);
        store.increase_change_count(USER);

        store.remove_user(USER);

        assert!(store.user_ids().is_empty());
        assert_eq!(store.change_count(USER), 0);
    }
}
