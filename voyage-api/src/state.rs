use std::sync::Arc;
use voyage_booking::{BookingLimits, BookingService, InventoryAdmin};
use voyage_core::notify::{NotificationSink, Notifier, Outbox};
use voyage_core::{Clock, InventoryStore};
use voyage_store::app_config::BookingRules;
use voyage_waitlist::{PromotionEngine, PromotionSettings, ReminderSweeper, WaitingListService};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingService>,
    pub waitlist: Arc<WaitingListService>,
    pub admin: Arc<InventoryAdmin>,
    pub engine: PromotionEngine,
    pub reminders: Arc<ReminderSweeper>,
    pub auth: AuthConfig,
}

impl AppState {
    /// Wire every service over one store, clock and notification sink
    pub fn build(
        store: Arc<dyn InventoryStore>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
        rules: &BookingRules,
        auth: AuthConfig,
    ) -> Self {
        let outbox = Outbox::new(store.clone(), Notifier::new(sink, rules.notification_retries));
        let engine = PromotionEngine::new(
            store.clone(),
            clock.clone(),
            outbox.clone(),
            PromotionSettings {
                offer_window: chrono::Duration::hours(rules.offer_window_hours),
                drain_serviced: rules.drain_serviced_waitlist,
            },
        );
        let bookings = BookingService::new(
            store.clone(),
            clock.clone(),
            outbox.clone(),
            engine.clone(),
            BookingLimits { max_upcoming_trips: rules.max_upcoming_trips },
        );
        let waitlist = WaitingListService::new(store.clone(), clock.clone(), engine.clone());
        let reminders = ReminderSweeper::new(store.clone(), clock, outbox, rules.reminder_lead_days);
        let admin = InventoryAdmin::new(store, engine.clone());

        Self {
            bookings: Arc::new(bookings),
            waitlist: Arc::new(waitlist),
            admin: Arc::new(admin),
            engine,
            reminders: Arc::new(reminders),
            auth,
        }
    }
}
