use std::sync::Arc;
use tracing::{error, info};
use voyage_core::{BookingError, BookingResult, InventoryStore, Trip, TripId};
use voyage_waitlist::PromotionEngine;

use crate::service::lock_trip;

/// Back-office control over a trip's room inventory
pub struct InventoryAdmin {
    store: Arc<dyn InventoryStore>,
    engine: PromotionEngine,
}

impl InventoryAdmin {
    pub fn new(store: Arc<dyn InventoryStore>, engine: PromotionEngine) -> Self {
        Self { store, engine }
    }

    pub async fn set_available_rooms(&self, trip_id: TripId, rooms: i32) -> BookingResult<Trip> {
        if rooms < 0 {
            return Err(BookingError::InvalidQuantity("available rooms cannot be negative".to_string()));
        }

        let mut tx = self.store.begin().await?;
        let mut trip = lock_trip(tx.as_mut(), trip_id).await?;
        let previous = trip.available_rooms;
        tx.set_available_rooms(trip_id, rooms).await?;
        tx.commit().await?;
        trip.available_rooms = rooms;

        info!("Trip {} rooms set from {} to {}", trip_id, previous, rooms);
        if rooms > previous {
            if let Err(e) = self.engine.promote(trip_id).await {
                error!("Promotion after room increase failed for trip {}: {}", trip_id, e);
            }
        }
        Ok(trip)
    }
}
