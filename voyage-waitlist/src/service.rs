use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use voyage_core::model::{TripId, UserId, WaitingListEntry};
use voyage_core::{BookingError, BookingResult, Clock, InventoryStore};

use crate::promotion::PromotionEngine;
use crate::queue::WaitingQueue;

/// What a user sees when checking their place on a trip's waiting list
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WaitingStatus {
    pub trip_id: TripId,
    pub waiting_count: usize,
    pub in_list: bool,
    pub position: Option<usize>,
    pub has_live_offer: bool,
    pub offer_expires_at: Option<DateTime<Utc>>,
    /// Earliest deadline among live offers: when a room may next free up
    pub next_release_estimate: Option<DateTime<Utc>>,
}

pub struct WaitingListService {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    engine: PromotionEngine,
}

impl WaitingListService {
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>, engine: PromotionEngine) -> Self {
        Self { store, clock, engine }
    }

    pub async fn join(&self, user_id: UserId, trip_id: TripId) -> BookingResult<WaitingListEntry> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        tx.lock_trip(trip_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("trip {}", trip_id)))?;

        if tx.find_active_booking(user_id, trip_id).await?.is_some() {
            return Err(BookingError::AlreadyBooked);
        }
        let queue = WaitingQueue::new(tx.waiting_entries(trip_id).await?);
        if queue.contains(user_id) {
            return Err(BookingError::AlreadyWaiting);
        }

        let entry = tx.insert_waiting_entry(trip_id, user_id, now).await?;
        tx.commit().await?;

        info!("User {} joined the waiting list of trip {} at position {}", user_id, trip_id, queue.len() + 1);
        Ok(entry)
    }

    /// Leaving may hand a held offer back, so a promotion pass follows.
    pub async fn leave(&self, user_id: UserId, trip_id: TripId) -> BookingResult<()> {
        let mut tx = self.store.begin().await?;
        tx.lock_trip(trip_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("trip {}", trip_id)))?;

        if !tx.delete_waiting_entry(trip_id, user_id).await? {
            return Err(BookingError::NotFound("waiting list entry".to_string()));
        }
        tx.commit().await?;
        info!("User {} left the waiting list of trip {}", user_id, trip_id);

        if let Err(e) = self.engine.promote(trip_id).await {
            error!("Promotion after leave failed for trip {}: {}", trip_id, e);
        }
        Ok(())
    }

    pub async fn status(&self, user_id: UserId, trip_id: TripId) -> BookingResult<WaitingStatus> {
        let now = self.clock.now();
        if self.store.get_trip(trip_id).await?.is_none() {
            return Err(BookingError::NotFound(format!("trip {}", trip_id)));
        }
        let queue = WaitingQueue::new(self.store.list_waiting_entries(trip_id).await?);
        let own = queue.entry_for(user_id);
        let has_live_offer = own.is_some_and(|e| e.is_active_notified(now));

        Ok(WaitingStatus {
            trip_id,
            waiting_count: queue.len(),
            in_list: own.is_some(),
            position: queue.position(user_id),
            has_live_offer,
            offer_expires_at: if has_live_offer { own.and_then(|e| e.expiration_at) } else { None },
            next_release_estimate: queue.earliest_live_deadline(now),
        })
    }
}
