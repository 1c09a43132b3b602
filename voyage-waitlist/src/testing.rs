use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use voyage_core::model::{Trip, TripId, UserId};
use voyage_core::notify::{Notifier, Outbox, RecordingSink};
use voyage_core::{Clock, InventoryStore, ManualClock};
use voyage_store::MemoryStore;

use crate::promotion::{PromotionEngine, PromotionSettings};
use crate::service::WaitingListService;

pub struct Fixture {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<RecordingSink>,
    pub outbox: Outbox,
    pub engine: PromotionEngine,
    pub waitlist: WaitingListService,
    next_trip: AtomicI64,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_settings(PromotionSettings::default())
    }

    pub fn with_settings(settings: PromotionSettings) -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2031, 1, 10, 9, 0, 0).unwrap()));
        let sink = Arc::new(RecordingSink::new());
        let dyn_store: Arc<dyn InventoryStore> = Arc::new(store.clone());
        let notifier = Notifier::new(sink.clone(), 1);
        let outbox = Outbox::new(dyn_store.clone(), notifier);
        let engine = PromotionEngine::new(dyn_store.clone(), clock.clone(), outbox.clone(), settings);
        let waitlist = WaitingListService::new(dyn_store, clock.clone(), engine.clone());

        Self {
            store,
            clock,
            sink,
            outbox,
            engine,
            waitlist,
            next_trip: AtomicI64::new(1),
        }
    }

    pub fn dyn_store(&self) -> Arc<dyn InventoryStore> {
        Arc::new(self.store.clone())
    }

    pub fn trip(&self, rooms: i32) -> TripId {
        self.insert_trip(self.clock.now() + Duration::days(30), rooms)
    }

    pub fn trip_starting(&self, start: DateTime<Utc>) -> TripId {
        self.insert_trip(start, 5)
    }

    fn insert_trip(&self, start: DateTime<Utc>, rooms: i32) -> TripId {
        let id = TripId(self.next_trip.fetch_add(1, Ordering::SeqCst));
        self.store.insert_trip(Trip {
            id,
            package_name: format!("Package {}", id),
            destination: "Reykjavik".to_string(),
            country: "Iceland".to_string(),
            start_date: start,
            end_date: start + Duration::days(7),
            price_cents: 150_000,
            available_rooms: rooms,
            min_age: None,
            cancellation_window_days: 0,
        });
        id
    }

    /// Queue users in the given order, one second apart
    pub async fn queue(&self, trip_id: TripId, users: &[i64]) {
        for user in users {
            self.store.register_contact(UserId(*user), format!("user{}@example.com", user));
            self.waitlist.join(UserId(*user), trip_id).await.unwrap();
            self.clock.advance(Duration::seconds(1));
        }
    }

    pub async fn wait_for_notifications(&self, count: usize) {
        for _ in 0..200 {
            if self.sink.sent().len() >= count {
                return;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        panic!("expected {} notifications, got {}", count, self.sink.sent().len());
    }
}
