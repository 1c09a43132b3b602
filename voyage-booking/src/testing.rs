use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use voyage_core::notify::{Notifier, Outbox, RecordingSink};
use voyage_core::{
    Booking, BookingId, BookingSummary, Clock, InventoryStore, ManualClock, StoreError, StoreResult, StoreTx, Trip, TripId,
    UserId, WaitingListEntry,
};
use voyage_store::MemoryStore;
use voyage_waitlist::{PromotionEngine, PromotionSettings, WaitingListService};

use crate::admin::InventoryAdmin;
use crate::service::{BookingLimits, BookingService};

pub struct Fixture {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<RecordingSink>,
    pub engine: PromotionEngine,
    pub waitlist: WaitingListService,
    pub bookings: Arc<BookingService>,
    pub admin: InventoryAdmin,
    next_trip: AtomicI64,
}

impl Fixture {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let dyn_store: Arc<dyn InventoryStore> = Arc::new(store.clone());
        Self::over(store, dyn_store)
    }

    /// Services run over a store whose `begin` can be made to fail
    pub fn with_failing_store() -> (Self, Arc<FailingStore>) {
        let store = MemoryStore::new();
        let failing = Arc::new(FailingStore::new(store.clone()));
        (Self::over(store, failing.clone()), failing)
    }

    fn over(store: MemoryStore, dyn_store: Arc<dyn InventoryStore>) -> Self {
        for user in 1..=100 {
            store.register_contact(UserId(user), format!("user{}@example.com", user));
        }
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2031, 6, 1, 8, 0, 0).unwrap()));
        let sink = Arc::new(RecordingSink::new());
        let outbox = Outbox::new(dyn_store.clone(), Notifier::new(sink.clone(), 1));
        let engine = PromotionEngine::new(
            dyn_store.clone(),
            clock.clone(),
            outbox.clone(),
            PromotionSettings::default(),
        );
        let waitlist = WaitingListService::new(dyn_store.clone(), clock.clone(), engine.clone());
        let bookings = Arc::new(BookingService::new(
            dyn_store.clone(),
            clock.clone(),
            outbox,
            engine.clone(),
            BookingLimits::default(),
        ));
        let admin = InventoryAdmin::new(dyn_store, engine.clone());

        Self {
            store,
            clock,
            sink,
            engine,
            waitlist,
            bookings,
            admin,
            next_trip: AtomicI64::new(1),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn trip(&self, rooms: i32) -> TripId {
        self.trip_with(rooms, |_| {})
    }

    pub fn trip_with(&self, rooms: i32, customize: impl FnOnce(&mut Trip)) -> TripId {
        let id = TripId(self.next_trip.fetch_add(1, Ordering::SeqCst));
        let start = self.now() + Duration::days(30 + id.0);
        let mut trip = Trip {
            id,
            package_name: format!("Coastal Escape {}", id),
            destination: "Split".to_string(),
            country: "Croatia".to_string(),
            start_date: start,
            end_date: start + Duration::days(7),
            price_cents: 75_000,
            available_rooms: rooms,
            min_age: None,
            cancellation_window_days: 0,
        };
        customize(&mut trip);
        self.store.insert_trip(trip);
        id
    }

    pub async fn rooms(&self, trip_id: TripId) -> i32 {
        self.store.get_trip(trip_id).await.unwrap().unwrap().available_rooms
    }

    /// Queue users in the given order, one second apart
    pub async fn queue(&self, trip_id: TripId, users: &[i64]) {
        for user in users {
            self.waitlist.join(UserId(*user), trip_id).await.unwrap();
            self.clock.advance(Duration::seconds(1));
        }
    }

    pub async fn wait_for_subject(&self, subject: &str) {
        for _ in 0..200 {
            if self.sink.sent().iter().any(|n| n.subject == subject) {
                return;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        panic!("no notification with subject {:?}", subject);
    }
}

/// Delegates to a [`MemoryStore`] but fails one chosen `begin` call
pub struct FailingStore {
    inner: MemoryStore,
    begins_before_failure: Mutex<Option<u32>>,
}

impl FailingStore {
    fn new(inner: MemoryStore) -> Self {
        Self { inner, begins_before_failure: Mutex::new(None) }
    }

    /// Let `skip` transactions open normally, then fail the next one
    pub fn fail_begin_after(&self, skip: u32) {
        *self.begins_before_failure.lock().unwrap() = Some(skip);
    }
}

#[async_trait]
impl InventoryStore for FailingStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        {
            let mut remaining = self.begins_before_failure.lock().unwrap();
            match *remaining {
                Some(0) => {
                    *remaining = None;
                    return Err(StoreError::backend("connection reset by peer"));
                }
                Some(n) => *remaining = Some(n - 1),
                None => {}
            }
        }
        self.inner.begin().await
    }

    async fn get_trip(&self, trip_id: TripId) -> StoreResult<Option<Trip>> {
        self.inner.get_trip(trip_id).await
    }

    async fn get_booking(&self, booking_id: BookingId) -> StoreResult<Option<Booking>> {
        self.inner.get_booking(booking_id).await
    }

    async fn list_active_bookings(&self, user_id: UserId) -> StoreResult<Vec<BookingSummary>> {
        self.inner.list_active_bookings(user_id).await
    }

    async fn list_waiting_entries(&self, trip_id: TripId) -> StoreResult<Vec<WaitingListEntry>> {
        self.inner.list_waiting_entries(trip_id).await
    }

    async fn trips_with_expired_offers(&self, now: DateTime<Utc>) -> StoreResult<Vec<TripId>> {
        self.inner.trips_with_expired_offers(now).await
    }

    async fn trips_awaiting_promotion(&self, now: DateTime<Utc>) -> StoreResult<Vec<TripId>> {
        self.inner.trips_awaiting_promotion(now).await
    }

    async fn bookings_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<BookingSummary>> {
        self.inner.bookings_starting_between(from, to).await
    }

    async fn contact_address(&self, user_id: UserId) -> StoreResult<Option<String>> {
        self.inner.contact_address(user_id).await
    }
}
