use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use voyage_core::model::{Booking, BookingId, BookingStatus, BookingSummary, NewBooking, Trip, TripId, UserId, WaitingEntryId, WaitingListEntry};
use voyage_core::payment::{NewPayment, PaymentRecord};
use voyage_core::repository::{InventoryStore, StoreError, StoreResult, StoreTx};

/// Committed rows
#[derive(Default)]
struct Tables {
    trips: HashMap<TripId, Trip>,
    bookings: BTreeMap<BookingId, Booking>,
    waiting: BTreeMap<WaitingEntryId, WaitingListEntry>,
    payments: Vec<PaymentRecord>,
    contacts: HashMap<UserId, String>,
}

#[derive(Default)]
struct Sequences {
    booking: AtomicI64,
    waiting: AtomicI64,
    payment: AtomicI64,
}

impl Sequences {
    fn next(counter: &AtomicI64) -> i64 {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

type LockMap<K> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>;

/// Lazily created async mutex per key, standing in for a row lock. An entry
/// lives only while someone holds or waits for it.
struct LockTable<K> {
    locks: LockMap<K>,
}

impl<K: Eq + Hash + Copy> LockTable<K> {
    fn new() -> Self {
        Self { locks: Arc::new(Mutex::new(HashMap::new())) }
    }

    async fn acquire(&self, key: K) -> KeyGuard<K> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.entry(key).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        KeyGuard {
            key,
            locks: self.locks.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

struct KeyGuard<K: Eq + Hash> {
    key: K,
    locks: LockMap<K>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash> Drop for KeyGuard<K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // only the map's own handle left: nobody holds or waits
        if locks.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.key);
        }
    }
}

struct Shared {
    tables: Mutex<Tables>,
    sequences: Sequences,
    trip_locks: LockTable<TripId>,
    user_locks: LockTable<UserId>,
}

impl Shared {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-process store. Each trip is guarded by its own async mutex held for
/// the life of a transaction; a transaction works on a private copy of the
/// locked trip's rows and publishes them atomically on commit.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables::default()),
                sequences: Sequences::default(),
                trip_locks: LockTable::new(),
                user_locks: LockTable::new(),
            }),
        }
    }

    /// Admin-side trip creation; not part of the booking core
    pub fn insert_trip(&self, trip: Trip) {
        self.shared.tables().trips.insert(trip.id, trip);
    }

    pub fn register_contact(&self, user_id: UserId, address: impl Into<String>) {
        self.shared.tables().contacts.insert(user_id, address.into());
    }

    pub fn payments_for(&self, booking_id: BookingId) -> Vec<PaymentRecord> {
        self.shared
            .tables()
            .payments
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect()
    }

    pub fn bookings_for_trip(&self, trip_id: TripId) -> Vec<Booking> {
        self.shared
            .tables()
            .bookings
            .values()
            .filter(|b| b.trip_id == trip_id)
            .cloned()
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn fifo(mut entries: Vec<WaitingListEntry>) -> Vec<WaitingListEntry> {
    entries.sort_by(|a, b| a.join_date.cmp(&b.join_date).then(a.id.cmp(&b.id)));
    entries
}

fn summaries<'a>(tables: &Tables, bookings: impl Iterator<Item = &'a Booking>) -> Vec<BookingSummary> {
    let mut list: Vec<BookingSummary> = bookings
        .filter_map(|b| {
            tables.trips.get(&b.trip_id).map(|trip| BookingSummary {
                booking: b.clone(),
                trip: trip.clone(),
            })
        })
        .collect();
    list.sort_by(|a, b| a.trip.start_date.cmp(&b.trip.start_date).then(a.booking.id.cmp(&b.booking.id)));
    list
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        Ok(Box::new(MemoryTx {
            shared: self.shared.clone(),
            user_guards: Vec::new(),
            locked: None,
        }))
    }

    async fn get_trip(&self, trip_id: TripId) -> StoreResult<Option<Trip>> {
        Ok(self.shared.tables().trips.get(&trip_id).cloned())
    }

    async fn get_booking(&self, booking_id: BookingId) -> StoreResult<Option<Booking>> {
        Ok(self.shared.tables().bookings.get(&booking_id).cloned())
    }

    async fn list_active_bookings(&self, user_id: UserId) -> StoreResult<Vec<BookingSummary>> {
        let tables = self.shared.tables();
        let bookings = tables
            .bookings
            .values()
            .filter(|b| b.user_id == user_id && b.status == BookingStatus::Active);
        Ok(summaries(&tables, bookings))
    }

    async fn list_waiting_entries(&self, trip_id: TripId) -> StoreResult<Vec<WaitingListEntry>> {
        let entries = self
            .shared
            .tables()
            .waiting
            .values()
            .filter(|e| e.trip_id == trip_id)
            .cloned()
            .collect();
        Ok(fifo(entries))
    }

    async fn trips_with_expired_offers(&self, now: DateTime<Utc>) -> StoreResult<Vec<TripId>> {
        let tables = self.shared.tables();
        let mut trips: Vec<TripId> = tables
            .waiting
            .values()
            .filter(|e| e.is_expired(now))
            .map(|e| e.trip_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        trips.sort();
        Ok(trips)
    }

    async fn trips_awaiting_promotion(&self, now: DateTime<Utc>) -> StoreResult<Vec<TripId>> {
        let tables = self.shared.tables();
        let mut pending: HashSet<TripId> = HashSet::new();
        let mut live: HashMap<TripId, i64> = HashMap::new();
        for entry in tables.waiting.values() {
            if entry.is_pending() {
                pending.insert(entry.trip_id);
            } else if entry.is_active_notified(now) {
                *live.entry(entry.trip_id).or_default() += 1;
            }
        }
        let mut trips: Vec<TripId> = pending
            .into_iter()
            .filter(|id| {
                tables.trips.get(id).is_some_and(|t| {
                    i64::from(t.available_rooms) > live.get(id).copied().unwrap_or(0)
                })
            })
            .collect();
        trips.sort();
        Ok(trips)
    }

    async fn bookings_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<BookingSummary>> {
        let tables = self.shared.tables();
        let bookings = tables.bookings.values().filter(|b| {
            b.status == BookingStatus::Active
                && tables
                    .trips
                    .get(&b.trip_id)
                    .is_some_and(|t| t.start_date >= from && t.start_date < to)
        });
        Ok(summaries(&tables, bookings))
    }

    async fn contact_address(&self, user_id: UserId) -> StoreResult<Option<String>> {
        Ok(self.shared.tables().contacts.get(&user_id).cloned())
    }
}

/// Private copy of one locked trip's rows
struct LockedTrip {
    _guard: KeyGuard<TripId>,
    trip: Trip,
    bookings: BTreeMap<BookingId, Booking>,
    waiting: BTreeMap<WaitingEntryId, WaitingListEntry>,
    new_payments: Vec<PaymentRecord>,
}

pub struct MemoryTx {
    shared: Arc<Shared>,
    user_guards: Vec<KeyGuard<UserId>>,
    locked: Option<LockedTrip>,
}

impl MemoryTx {
    fn locked(&mut self, trip_id: TripId) -> StoreResult<&mut LockedTrip> {
        match self.locked.as_mut() {
            Some(locked) if locked.trip.id == trip_id => Ok(locked),
            _ => Err(StoreError::TripNotLocked(trip_id)),
        }
    }

    fn any_locked(&mut self) -> Option<&mut LockedTrip> {
        self.locked.as_mut()
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_user(&mut self, user_id: UserId) -> StoreResult<()> {
        let guard = self.shared.user_locks.acquire(user_id).await;
        self.user_guards.push(guard);
        Ok(())
    }

    async fn count_upcoming_trips(
        &mut self,
        user_id: UserId,
        excluding: TripId,
        now: DateTime<Utc>,
    ) -> StoreResult<u32> {
        let tables = self.shared.tables();
        let trips: HashSet<TripId> = tables
            .bookings
            .values()
            .filter(|b| b.user_id == user_id && b.status == BookingStatus::Active && b.trip_id != excluding)
            .filter(|b| tables.trips.get(&b.trip_id).is_some_and(|t| t.start_date > now))
            .map(|b| b.trip_id)
            .collect();
        Ok(trips.len() as u32)
    }

    async fn lock_trip(&mut self, trip_id: TripId) -> StoreResult<Option<Trip>> {
        if let Some(locked) = self.locked.as_ref() {
            if locked.trip.id == trip_id {
                return Ok(Some(locked.trip.clone()));
            }
            return Err(StoreError::LockConflict {
                held: locked.trip.id,
                requested: trip_id,
            });
        }

        let guard = self.shared.trip_locks.acquire(trip_id).await;

        let tables = self.shared.tables();
        let Some(trip) = tables.trips.get(&trip_id).cloned() else {
            return Ok(None);
        };
        let bookings = tables
            .bookings
            .iter()
            .filter(|(_, b)| b.trip_id == trip_id)
            .map(|(id, b)| (*id, b.clone()))
            .collect();
        let waiting = tables
            .waiting
            .iter()
            .filter(|(_, e)| e.trip_id == trip_id)
            .map(|(id, e)| (*id, e.clone()))
            .collect();
        drop(tables);

        self.locked = Some(LockedTrip {
            _guard: guard,
            trip: trip.clone(),
            bookings,
            waiting,
            new_payments: Vec::new(),
        });
        Ok(Some(trip))
    }

    async fn adjust_rooms(&mut self, trip_id: TripId, delta: i32) -> StoreResult<()> {
        self.locked(trip_id)?.trip.available_rooms += delta;
        Ok(())
    }

    async fn set_available_rooms(&mut self, trip_id: TripId, rooms: i32) -> StoreResult<()> {
        self.locked(trip_id)?.trip.available_rooms = rooms;
        Ok(())
    }

    async fn find_active_booking(&mut self, user_id: UserId, trip_id: TripId) -> StoreResult<Option<Booking>> {
        let locked = self.locked(trip_id)?;
        Ok(locked
            .bookings
            .values()
            .find(|b| b.user_id == user_id && b.status == BookingStatus::Active)
            .cloned())
    }

    async fn get_booking(&mut self, booking_id: BookingId) -> StoreResult<Option<Booking>> {
        Ok(self.any_locked().and_then(|locked| locked.bookings.get(&booking_id).cloned()))
    }

    async fn insert_booking(&mut self, booking: NewBooking) -> StoreResult<Booking> {
        let id = BookingId(Sequences::next(&self.shared.sequences.booking));
        let locked = self.locked(booking.trip_id)?;
        let row = Booking {
            id,
            user_id: booking.user_id,
            trip_id: booking.trip_id,
            quantity: booking.quantity,
            status: BookingStatus::Active,
            is_paid: false,
            paid_at: None,
            group_min_age: booking.group_min_age,
            booked_at: booking.booked_at,
        };
        locked.bookings.insert(id, row.clone());
        Ok(row)
    }

    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        let locked = self.locked(booking.trip_id)?;
        match locked.bookings.get_mut(&booking.id) {
            Some(row) => {
                *row = booking.clone();
                Ok(())
            }
            None => Err(StoreError::Corrupt(format!("booking {} missing from trip {}", booking.id, booking.trip_id))),
        }
    }

    async fn record_payment(&mut self, payment: NewPayment) -> StoreResult<PaymentRecord> {
        let id = Sequences::next(&self.shared.sequences.payment);
        let locked = self
            .any_locked()
            .ok_or_else(|| StoreError::Corrupt("payment recorded outside a trip lock".to_string()))?;
        if !locked.bookings.contains_key(&payment.booking_id) {
            return Err(StoreError::Corrupt(format!("payment for unknown booking {}", payment.booking_id)));
        }
        let record = PaymentRecord {
            id,
            booking_id: payment.booking_id,
            amount_cents: payment.amount_cents,
            status: payment.status,
            recorded_at: payment.recorded_at,
        };
        locked.new_payments.push(record.clone());
        Ok(record)
    }

    async fn waiting_entries(&mut self, trip_id: TripId) -> StoreResult<Vec<WaitingListEntry>> {
        let locked = self.locked(trip_id)?;
        Ok(fifo(locked.waiting.values().cloned().collect()))
    }

    async fn insert_waiting_entry(
        &mut self,
        trip_id: TripId,
        user_id: UserId,
        join_date: DateTime<Utc>,
    ) -> StoreResult<WaitingListEntry> {
        let id = WaitingEntryId(Sequences::next(&self.shared.sequences.waiting));
        let locked = self.locked(trip_id)?;
        if locked.waiting.values().any(|e| e.user_id == user_id) {
            return Err(StoreError::Corrupt(format!("user {} already queued on trip {}", user_id, trip_id)));
        }
        let entry = WaitingListEntry {
            id,
            trip_id,
            user_id,
            join_date,
            notified_at: None,
            expiration_at: None,
        };
        locked.waiting.insert(id, entry.clone());
        Ok(entry)
    }

    async fn mark_notified(
        &mut self,
        trip_id: TripId,
        entry_id: WaitingEntryId,
        notified_at: DateTime<Utc>,
        expiration_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let locked = self.locked(trip_id)?;
        if let Some(entry) = locked.waiting.get_mut(&entry_id) {
            entry.notified_at = Some(notified_at);
            entry.expiration_at = Some(expiration_at);
        }
        Ok(())
    }

    async fn delete_waiting_entry(&mut self, trip_id: TripId, user_id: UserId) -> StoreResult<bool> {
        let locked = self.locked(trip_id)?;
        let before = locked.waiting.len();
        locked.waiting.retain(|_, e| e.user_id != user_id);
        Ok(locked.waiting.len() != before)
    }

    async fn delete_waiting_entries(&mut self, trip_id: TripId, ids: &[WaitingEntryId]) -> StoreResult<u64> {
        let locked = self.locked(trip_id)?;
        let removed = ids.iter().filter(|id| locked.waiting.remove(id).is_some()).count();
        Ok(removed as u64)
    }

    async fn clear_waiting_list(&mut self, trip_id: TripId) -> StoreResult<u64> {
        let locked = self.locked(trip_id)?;
        let removed = locked.waiting.len();
        locked.waiting.clear();
        Ok(removed as u64)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { shared, user_guards, locked } = *self;
        if let Some(locked) = locked {
            let trip_id = locked.trip.id;
            let mut tables = shared.tables();
            tables.trips.insert(trip_id, locked.trip);
            tables.bookings.extend(locked.bookings);
            tables.waiting.retain(|_, e| e.trip_id != trip_id);
            tables.waiting.extend(locked.waiting);
            tables.payments.extend(locked.new_payments);
            // row locks are released only after the new rows are visible
            drop(tables);
            drop(locked._guard);
        }
        drop(user_guards);
        Ok(())
    }
}
