use chrono::{DateTime, Utc};
use voyage_core::model::{UserId, WaitingEntryId, WaitingListEntry};

/// Read-only view of one trip's waiting list, always in FIFO order.
///
/// Offer state is evaluated against the `now` handed to each query; nothing
/// here caches whether an offer is live.
#[derive(Debug, Clone, Default)]
pub struct WaitingQueue {
    entries: Vec<WaitingListEntry>,
}

impl WaitingQueue {
    pub fn new(mut entries: Vec<WaitingListEntry>) -> Self {
        entries.sort_by(|a, b| a.join_date.cmp(&b.join_date).then(a.id.cmp(&b.id)));
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[WaitingListEntry] {
        &self.entries
    }

    pub fn entry_for(&self, user_id: UserId) -> Option<&WaitingListEntry> {
        self.entries.iter().find(|e| e.user_id == user_id)
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.entry_for(user_id).is_some()
    }

    /// 1-based place in line
    pub fn position(&self, user_id: UserId) -> Option<usize> {
        self.entries.iter().position(|e| e.user_id == user_id).map(|i| i + 1)
    }

    pub fn active_notified(&self, now: DateTime<Utc>) -> usize {
        self.entries.iter().filter(|e| e.is_active_notified(now)).count()
    }

    pub fn holds_live_offer(&self, user_id: UserId, now: DateTime<Utc>) -> bool {
        self.entry_for(user_id).is_some_and(|e| e.is_active_notified(now))
    }

    /// Whether `user_id` may take rooms right now.
    ///
    /// While live offers cover every free room, only offer holders get in.
    /// Rooms beyond the outstanding offers are open to anyone.
    pub fn admits(&self, user_id: UserId, available_rooms: i32, now: DateTime<Utc>) -> bool {
        let notified = self.active_notified(now) as i64;
        if notified > 0 && i64::from(available_rooms) <= notified {
            return self.holds_live_offer(user_id, now);
        }
        true
    }

    /// Entries that have never been offered a room
    pub fn pending(&self) -> impl Iterator<Item = &WaitingListEntry> {
        self.entries.iter().filter(|e| e.is_pending())
    }

    pub fn expired_ids(&self, now: DateTime<Utc>) -> Vec<WaitingEntryId> {
        self.entries.iter().filter(|e| e.is_expired(now)).map(|e| e.id).collect()
    }

    pub fn earliest_live_deadline(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.entries
            .iter()
            .filter(|e| e.is_active_notified(now))
            .filter_map(|e| e.expiration_at)
            .min()
    }

    /// Head of the pending line, capped at the rooms not already promised
    pub fn next_offers(&self, available_rooms: i32, now: DateTime<Utc>) -> Vec<&WaitingListEntry> {
        if available_rooms <= 0 {
            return Vec::new();
        }
        let free_slots = i64::from(available_rooms) - self.active_notified(now) as i64;
        if free_slots <= 0 {
            return Vec::new();
        }
        self.pending().take(free_slots as usize).collect()
    }

    pub fn remove(&mut self, ids: &[WaitingEntryId]) {
        self.entries.retain(|e| !ids.contains(&e.id));
    }
}
