use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use voyage_core::notify::{Notification, Outbox};
use voyage_core::payment::PaymentOutcome;
use voyage_core::{
    Booking, BookingError, BookingId, BookingResult, BookingStatus, BookingSummary, Clock, InventoryStore, NewBooking,
    StoreTx, Trip, TripId, UserId,
};
use voyage_waitlist::{PromotionEngine, WaitingQueue};

use crate::admission;
use crate::finance;

#[derive(Debug, Clone)]
pub struct BookingLimits {
    pub max_upcoming_trips: u32,
}

impl Default for BookingLimits {
    fn default() -> Self {
        Self { max_upcoming_trips: 3 }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationReceipt {
    pub booking: Booking,
    pub refunded_cents: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub booking: Booking,
    pub amount_cents: i64,
    pub already_paid: bool,
}

/// Admission control and transactional commit for every change to a
/// user's bookings. Each call holds the trip lock for its whole
/// read-check-write sequence and notifies only after commit.
pub struct BookingService {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    outbox: Outbox,
    engine: PromotionEngine,
    limits: BookingLimits,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        clock: Arc<dyn Clock>,
        outbox: Outbox,
        engine: PromotionEngine,
        limits: BookingLimits,
    ) -> Self {
        Self { store, clock, outbox, engine, limits }
    }

    pub async fn reserve(
        &self,
        user_id: UserId,
        trip_id: TripId,
        quantity: i32,
        group_min_age: Option<u32>,
    ) -> BookingResult<Booking> {
        let qty = admission::normalize_quantity(quantity);
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        tx.lock_user(user_id).await?;
        let upcoming = tx.count_upcoming_trips(user_id, trip_id, now).await?;

        // cap check precedes NotFound for unknown trips
        let trip = tx.lock_trip(trip_id).await?;
        let existing = match trip {
            Some(_) => tx.find_active_booking(user_id, trip_id).await?,
            None => None,
        };
        admission::check_trip_limit(existing.is_some(), upcoming, self.limits.max_upcoming_trips)?;
        let trip = trip.ok_or_else(|| BookingError::NotFound(format!("trip {}", trip_id)))?;
        admission::check_age(&trip, group_min_age)?;
        admission::check_rooms(trip.available_rooms, qty)?;

        let queue = WaitingQueue::new(tx.waiting_entries(trip_id).await?);
        if !queue.admits(user_id, trip.available_rooms, now) {
            return Err(BookingError::NotFirstInLine);
        }

        let booking = match existing {
            Some(mut booking) => {
                booking.quantity += qty;
                booking.group_min_age = group_min_age;
                tx.update_booking(&booking).await?;
                booking
            }
            None => {
                tx.insert_booking(NewBooking {
                    user_id,
                    trip_id,
                    quantity: qty,
                    group_min_age,
                    booked_at: now,
                })
                .await?
            }
        };
        tx.adjust_rooms(trip_id, -(qty as i32)).await?;
        tx.delete_waiting_entry(trip_id, user_id).await?;
        tx.commit().await?;

        info!(
            "User {} booked {} rooms on trip {} (booking {}, now holding {})",
            user_id, qty, trip_id, booking.id, booking.quantity
        );
        self.outbox
            .send_to(user_id, |to| Notification::booking_confirmed(to, &trip, &booking, qty))
            .await;
        Ok(booking)
    }

    pub async fn cancel(&self, user_id: UserId, booking_id: BookingId) -> BookingResult<CancellationReceipt> {
        let now = self.clock.now();
        let trip_id = self.owned_booking(user_id, booking_id).await?.trip_id;

        let mut tx = self.store.begin().await?;
        let trip = lock_trip(tx.as_mut(), trip_id).await?;
        let mut booking = locked_booking(tx.as_mut(), user_id, booking_id).await?;

        if trip.within_cancellation_window(now) {
            return Err(BookingError::CancellationWindowViolated {
                window_days: trip.cancellation_window_days,
            });
        }

        booking.status = BookingStatus::Cancelled;
        let mut refunded_cents = None;
        if booking.is_paid {
            let refund = finance::refund(&trip, &booking, now);
            refunded_cents = Some(refund.amount_cents);
            tx.record_payment(refund).await?;
            booking.is_paid = false;
            booking.paid_at = None;
        }
        tx.update_booking(&booking).await?;
        tx.adjust_rooms(trip_id, booking.quantity as i32).await?;
        tx.commit().await?;

        info!("User {} cancelled booking {} releasing {} rooms on trip {}", user_id, booking_id, booking.quantity, trip_id);
        self.promote_after_release(trip_id).await;
        self.outbox
            .send_to(user_id, |to| Notification::booking_cancelled(to, &trip, refunded_cents))
            .await;

        Ok(CancellationReceipt { booking, refunded_cents })
    }

    /// Set the room count of an unpaid, not yet started booking. Shrinking
    /// hands the freed rooms to the waiting list.
    pub async fn update_quantity(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        new_quantity: i32,
    ) -> BookingResult<Booking> {
        if new_quantity < 1 {
            return Err(BookingError::InvalidQuantity(
                "quantity must be at least 1; cancel the booking to release every room".to_string(),
            ));
        }
        let new_quantity = new_quantity as u32;
        let now = self.clock.now();
        let trip_id = self.owned_booking(user_id, booking_id).await?.trip_id;

        let mut tx = self.store.begin().await?;
        let trip = lock_trip(tx.as_mut(), trip_id).await?;
        let mut booking = locked_booking(tx.as_mut(), user_id, booking_id).await?;

        if booking.is_paid {
            return Err(BookingError::PaidBookingImmutable);
        }
        if trip.has_started(now) {
            return Err(BookingError::TripAlreadyStarted);
        }
        if new_quantity == booking.quantity {
            return Ok(booking);
        }

        let delta = i64::from(new_quantity) - i64::from(booking.quantity);
        if delta > 0 {
            admission::check_rooms(trip.available_rooms, delta as u32)?;
            let queue = WaitingQueue::new(tx.waiting_entries(trip_id).await?);
            if !queue.admits(user_id, trip.available_rooms, now) {
                return Err(BookingError::NotFirstInLine);
            }
        }

        booking.quantity = new_quantity;
        tx.update_booking(&booking).await?;
        tx.adjust_rooms(trip_id, -(delta as i32)).await?;
        tx.commit().await?;

        info!("Booking {} on trip {} changed by {} rooms", booking_id, trip_id, delta);
        if delta < 0 {
            self.promote_after_release(trip_id).await;
        }
        Ok(booking)
    }

    /// Record the payment collaborator's verdict. Confirming an already paid
    /// booking succeeds without writing anything.
    pub async fn confirm_payment(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        outcome: PaymentOutcome,
    ) -> BookingResult<PaymentReceipt> {
        let now = self.clock.now();
        let trip_id = self.owned_booking(user_id, booking_id).await?.trip_id;

        if !outcome.succeeded {
            info!("Payment for booking {} declined (reference {:?})", booking_id, outcome.reference);
            return Err(BookingError::PaymentDeclined);
        }

        let mut tx = self.store.begin().await?;
        let trip = lock_trip(tx.as_mut(), trip_id).await?;
        let mut booking = locked_booking(tx.as_mut(), user_id, booking_id).await?;
        let amount_cents = finance::booking_total(&trip, &booking);

        if booking.is_paid {
            return Ok(PaymentReceipt { booking, amount_cents, already_paid: true });
        }

        tx.record_payment(finance::settlement(&trip, &booking, now)).await?;
        booking.is_paid = true;
        booking.paid_at = Some(now);
        tx.update_booking(&booking).await?;
        tx.commit().await?;

        info!("Booking {} paid ({} cents, reference {:?})", booking_id, amount_cents, outcome.reference);
        self.outbox
            .send_to(user_id, |to| Notification::payment_received(to, &trip, amount_cents))
            .await;

        Ok(PaymentReceipt { booking, amount_cents, already_paid: false })
    }

    pub async fn list_bookings(&self, user_id: UserId) -> BookingResult<Vec<BookingSummary>> {
        Ok(self.store.list_active_bookings(user_id).await?)
    }

    /// Committed lookup used to find which trip to lock
    async fn owned_booking(&self, user_id: UserId, booking_id: BookingId) -> BookingResult<Booking> {
        match self.store.get_booking(booking_id).await? {
            Some(booking) if booking.user_id == user_id && booking.is_active() => Ok(booking),
            _ => Err(BookingError::NotFound(format!("booking {}", booking_id))),
        }
    }

    async fn promote_after_release(&self, trip_id: TripId) {
        if let Err(e) = self.engine.promote(trip_id).await {
            error!("Promotion after release failed for trip {}: {}", trip_id, e);
        }
    }
}

pub(crate) async fn lock_trip(tx: &mut dyn StoreTx, trip_id: TripId) -> BookingResult<Trip> {
    tx.lock_trip(trip_id)
        .await?
        .ok_or_else(|| BookingError::NotFound(format!("trip {}", trip_id)))
}

/// Re-read under the trip lock; the committed copy may be stale
async fn locked_booking(tx: &mut dyn StoreTx, user_id: UserId, booking_id: BookingId) -> BookingResult<Booking> {
    match tx.get_booking(booking_id).await? {
        Some(booking) if booking.user_id == user_id && booking.is_active() => Ok(booking),
        _ => Err(BookingError::NotFound(format!("booking {}", booking_id))),
    }
}
