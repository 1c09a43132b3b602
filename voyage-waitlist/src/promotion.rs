use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info};
use voyage_core::model::{Trip, TripId, WaitingListEntry};
use voyage_core::notify::{Notification, Outbox};
use voyage_core::{BookingError, BookingResult, Clock, InventoryStore, StoreResult, StoreTx};

use crate::queue::WaitingQueue;

#[derive(Debug, Clone)]
pub struct PromotionSettings {
    /// How long a promoted entry holds its first right of refusal
    pub offer_window: Duration,
    /// Clear the whole list once every remaining entry has been offered a room
    pub drain_serviced: bool,
}

impl Default for PromotionSettings {
    fn default() -> Self {
        Self {
            offer_window: Duration::hours(24),
            drain_serviced: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromotionOutcome {
    /// Entries that received a new offer, as committed
    pub offers: Vec<WaitingListEntry>,
    pub expired_removed: u64,
    pub drained: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub trips_swept: usize,
    pub expired_removed: u64,
    pub offers_extended: usize,
    pub failures: usize,
}

/// Turns freed rooms into time-boxed offers for the head of a trip's
/// waiting list.
#[derive(Clone)]
pub struct PromotionEngine {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    outbox: Outbox,
    settings: PromotionSettings,
}

impl PromotionEngine {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        clock: Arc<dyn Clock>,
        outbox: Outbox,
        settings: PromotionSettings,
    ) -> Self {
        Self { store, clock, outbox, settings }
    }

    /// Offer every room not already covered by a live offer, in FIFO order.
    /// Offers are committed before any notification is sent.
    pub async fn promote(&self, trip_id: TripId) -> BookingResult<PromotionOutcome> {
        self.run(trip_id, false).await
    }

    /// Drop lapsed offers on every affected trip and pass their rooms down
    /// the line. Trips left with uncovered free rooms by an earlier failed
    /// pass are promoted too. Safe to repeat: a second run over the same
    /// state does nothing.
    pub async fn sweep_expired(&self) -> BookingResult<SweepReport> {
        let now = self.clock.now();
        let mut trips: BTreeSet<TripId> = self.store.trips_with_expired_offers(now).await?.into_iter().collect();
        trips.extend(self.store.trips_awaiting_promotion(now).await?);
        let mut report = SweepReport::default();

        for trip_id in trips {
            match self.run(trip_id, true).await {
                Ok(outcome) => {
                    report.trips_swept += 1;
                    report.expired_removed += outcome.expired_removed;
                    report.offers_extended += outcome.offers.len();
                }
                Err(e) => {
                    error!("Expiry sweep failed for trip {}: {}", trip_id, e);
                    report.failures += 1;
                }
            }
        }

        if report.trips_swept > 0 || report.failures > 0 {
            info!(
                "Expiry sweep: {} trips, {} lapsed offers removed, {} new offers, {} failures",
                report.trips_swept, report.expired_removed, report.offers_extended, report.failures
            );
        }
        Ok(report)
    }

    async fn run(&self, trip_id: TripId, reclaim_expired: bool) -> BookingResult<PromotionOutcome> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let trip = tx
            .lock_trip(trip_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("trip {}", trip_id)))?;

        let mut queue = WaitingQueue::new(tx.waiting_entries(trip_id).await?);
        let mut outcome = PromotionOutcome::default();

        if reclaim_expired {
            let expired = queue.expired_ids(now);
            if !expired.is_empty() {
                outcome.expired_removed = tx.delete_waiting_entries(trip_id, &expired).await?;
                queue.remove(&expired);
            }
        }

        let (offers, drained) = self.extend_offers(tx.as_mut(), &trip, &queue, now).await?;
        outcome.offers = offers;
        outcome.drained = drained;
        tx.commit().await?;

        if !outcome.offers.is_empty() {
            info!("Trip {}: offered rooms to {} waiting users", trip_id, outcome.offers.len());
        }
        self.announce(&trip, &outcome.offers).await;
        Ok(outcome)
    }

    /// Promotion steps that run inside the caller's transaction, with `trip`
    /// already locked.
    async fn extend_offers(
        &self,
        tx: &mut dyn StoreTx,
        trip: &Trip,
        queue: &WaitingQueue,
        now: DateTime<Utc>,
    ) -> StoreResult<(Vec<WaitingListEntry>, u64)> {
        if trip.available_rooms <= 0 {
            return Ok((Vec::new(), 0));
        }
        if i64::from(trip.available_rooms) <= queue.active_notified(now) as i64 {
            return Ok((Vec::new(), 0));
        }

        let expires = now + self.settings.offer_window;
        let mut offers = Vec::new();
        for entry in queue.next_offers(trip.available_rooms, now) {
            tx.mark_notified(trip.id, entry.id, now, expires).await?;
            let mut offered = entry.clone();
            offered.notified_at = Some(now);
            offered.expiration_at = Some(expires);
            offers.push(offered);
        }

        let mut drained = 0;
        let still_pending = queue.pending().count() > offers.len();
        if self.settings.drain_serviced && !queue.is_empty() && !still_pending {
            drained = tx.clear_waiting_list(trip.id).await?;
        }
        Ok((offers, drained))
    }

    async fn announce(&self, trip: &Trip, offers: &[WaitingListEntry]) {
        let window_hours = self.settings.offer_window.num_hours();
        for offer in offers {
            self.outbox
                .send_to(offer.user_id, |to| Notification::offer_extended(to, trip, window_hours))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use voyage_core::model::UserId;

    #[tokio::test]
    async fn test_promote_offers_free_rooms_in_fifo_order() {
        let fx = Fixture::new();
        let trip = fx.trip(2);
        fx.queue(trip, &[1, 2, 3]).await;

        let outcome = fx.engine.promote(trip).await.unwrap();
        let users: Vec<UserId> = outcome.offers.iter().map(|e| e.user_id).collect();
        assert_eq!(users, vec![UserId(1), UserId(2)]);

        let entries = fx.store.list_waiting_entries(trip).await.unwrap();
        let deadline = fx.clock.now() + Duration::hours(24);
        assert_eq!(entries[0].expiration_at, Some(deadline));
        assert_eq!(entries[1].expiration_at, Some(deadline));
        assert!(entries[2].is_pending());

        fx.wait_for_notifications(2).await;
        assert!(fx.sink.sent().iter().all(|n| n.subject == "Room available – complete your booking"));
    }

    #[tokio::test]
    async fn test_promote_is_noop_when_offers_cover_rooms() {
        let fx = Fixture::new();
        let trip = fx.trip(1);
        fx.queue(trip, &[1, 2]).await;

        assert_eq!(fx.engine.promote(trip).await.unwrap().offers.len(), 1);
        assert!(fx.engine.promote(trip).await.unwrap().offers.is_empty());
    }

    #[tokio::test]
    async fn test_promote_without_rooms_does_nothing() {
        let fx = Fixture::new();
        let trip = fx.trip(0);
        fx.queue(trip, &[1]).await;

        let outcome = fx.engine.promote(trip).await.unwrap();
        assert!(outcome.offers.is_empty());
        assert!(fx.store.list_waiting_entries(trip).await.unwrap()[0].is_pending());
    }

    #[tokio::test]
    async fn test_promote_unknown_trip_is_not_found() {
        let fx = Fixture::new();
        let err = fx.engine.promote(TripId(404)).await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_sweep_moves_offer_to_next_in_line() {
        let fx = Fixture::new();
        let trip = fx.trip(1);
        fx.queue(trip, &[1, 2]).await;
        fx.engine.promote(trip).await.unwrap();

        fx.clock.advance(Duration::hours(24) + Duration::seconds(1));
        let report = fx.engine.sweep_expired().await.unwrap();
        assert_eq!(report.trips_swept, 1);
        assert_eq!(report.expired_removed, 1);
        assert_eq!(report.offers_extended, 1);

        let entries = fx.store.list_waiting_entries(trip).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user_id, UserId(2));
        assert!(entries[0].is_active_notified(fx.clock.now()));

        let again = fx.engine.sweep_expired().await.unwrap();
        assert_eq!(again, SweepReport::default());
    }

    #[tokio::test]
    async fn test_sweep_promotes_trip_with_uncovered_rooms() {
        let fx = Fixture::new();
        let trip = fx.trip(1);
        fx.queue(trip, &[1, 2]).await;

        // joining never promotes, so the free room has no offer yet
        let report = fx.engine.sweep_expired().await.unwrap();
        assert_eq!(report.trips_swept, 1);
        assert_eq!(report.expired_removed, 0);
        assert_eq!(report.offers_extended, 1);

        let entries = fx.store.list_waiting_entries(trip).await.unwrap();
        assert_eq!(entries[0].user_id, UserId(1));
        assert!(entries[0].is_active_notified(fx.clock.now()));
        assert!(entries[1].is_pending());

        assert_eq!(fx.engine.sweep_expired().await.unwrap(), SweepReport::default());
    }

    #[tokio::test]
    async fn test_sweep_leaves_live_offers_alone() {
        let fx = Fixture::new();
        let trip = fx.trip(1);
        fx.queue(trip, &[1, 2]).await;
        fx.engine.promote(trip).await.unwrap();

        fx.clock.advance(Duration::hours(23));
        assert_eq!(fx.engine.sweep_expired().await.unwrap(), SweepReport::default());
        assert_eq!(fx.store.list_waiting_entries(trip).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_drain_clears_serviced_list_when_enabled() {
        let fx = Fixture::with_settings(PromotionSettings {
            offer_window: Duration::hours(24),
            drain_serviced: true,
        });
        let trip = fx.trip(3);
        fx.queue(trip, &[1, 2]).await;

        let outcome = fx.engine.promote(trip).await.unwrap();
        assert_eq!(outcome.offers.len(), 2);
        assert_eq!(outcome.drained, 2);
        assert!(fx.store.list_waiting_entries(trip).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drain_keeps_list_while_users_still_wait() {
        let fx = Fixture::with_settings(PromotionSettings {
            offer_window: Duration::hours(24),
            drain_serviced: true,
        });
        let trip = fx.trip(1);
        fx.queue(trip, &[1, 2]).await;

        let outcome = fx.engine.promote(trip).await.unwrap();
        assert_eq!(outcome.drained, 0);
        assert_eq!(fx.store.list_waiting_entries(trip).await.unwrap().len(), 2);
    }
}
