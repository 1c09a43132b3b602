use chrono::{Duration, NaiveTime};
use std::sync::Arc;
use tracing::info;
use voyage_core::notify::{Notification, Outbox};
use voyage_core::{BookingResult, Clock, InventoryStore};

/// Daily nudge to travellers whose trip starts `lead_days` from today (UTC)
pub struct ReminderSweeper {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    outbox: Outbox,
    lead_days: i64,
}

impl ReminderSweeper {
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>, outbox: Outbox, lead_days: i64) -> Self {
        Self { store, clock, outbox, lead_days }
    }

    /// Returns how many bookings were due a reminder
    pub async fn run_once(&self) -> BookingResult<usize> {
        let day = self.clock.now().date_naive() + Duration::days(self.lead_days);
        let from = day.and_time(NaiveTime::MIN).and_utc();
        let to = from + Duration::days(1);

        let due = self.store.bookings_starting_between(from, to).await?;
        for summary in &due {
            self.outbox
                .send_to(summary.booking.user_id, |to| {
                    Notification::trip_reminder(to, &summary.trip, self.lead_days)
                })
                .await;
        }

        if !due.is_empty() {
            info!("Sent {} trip reminders for trips starting {}", due.len(), day);
        }
        Ok(due.len())
    }
}
