use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::model::{Booking, Trip, UserId};
use crate::pii::Masked;
use crate::repository::InventoryStore;

const SIGNATURE: &str = "Travel Agency";

/// An outbound message for the delivery collaborator
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notification {
    pub to: Masked<String>,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: Masked(to.into()),
            subject: subject.into(),
            body: body.into(),
        }
    }

    pub fn booking_confirmed(to: impl Into<String>, trip: &Trip, booking: &Booking, added: u32) -> Self {
        let body = format!(
            "Your booking was successful!\n\nTrip: {}\nDates: {}\nRooms added: {}\nRooms held: {}\n\n{}",
            trip.display_title(),
            trip.date_range(),
            added,
            booking.quantity,
            SIGNATURE
        );
        Self::new(to, "Booking Confirmation", body)
    }

    pub fn booking_cancelled(to: impl Into<String>, trip: &Trip, refunded_cents: Option<i64>) -> Self {
        let refund = match refunded_cents {
            Some(cents) => format!("A refund of {}.{:02} has been recorded.\n\n", cents / 100, cents % 100),
            None => String::new(),
        };
        let body = format!(
            "Your booking has been cancelled.\n\nTrip: {}\nDates: {}\n\n{}{}",
            trip.display_title(),
            trip.date_range(),
            refund,
            SIGNATURE
        );
        Self::new(to, "Booking Cancelled", body)
    }

    pub fn offer_extended(to: impl Into<String>, trip: &Trip, window_hours: i64) -> Self {
        let body = format!(
            "Good news! A room is now available for your trip.\n\nTrip: {}\nDates: {}\n\n\
             You have {} hours to complete your booking before the offer moves to the next person in the waiting list.\n\n{}",
            trip.display_title(),
            trip.date_range(),
            window_hours,
            SIGNATURE
        );
        Self::new(to, "Room available – complete your booking", body)
    }

    pub fn payment_received(to: impl Into<String>, trip: &Trip, amount_cents: i64) -> Self {
        let body = format!(
            "Your payment of {}.{:02} was successful.\n\nTrip: {}\nDates: {}\n\nThank you for booking with {}!",
            amount_cents / 100,
            amount_cents % 100,
            trip.display_title(),
            trip.date_range(),
            SIGNATURE
        );
        Self::new(to, "Payment Confirmation", body)
    }

    pub fn trip_reminder(to: impl Into<String>, trip: &Trip, lead_days: i64) -> Self {
        let body = format!(
            "Friendly reminder: your upcoming trip is starting soon.\n\nTrip: {}\nDates: {}\n\n{}",
            trip.display_title(),
            trip.date_range(),
            SIGNATURE
        );
        Self::new(to, format!("Trip reminder – starts in {} days", lead_days), body)
    }
}

/// Delivery collaborator. Implementations may fail; callers never let a
/// failure affect a committed booking.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Sink that only writes to the log. Used when no broker is configured.
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn send(&self, notification: &Notification) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!(to = %notification.to, subject = %notification.subject, "Notification");
        Ok(())
    }
}

/// Sink that keeps every delivered notification in memory
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, notification: &Notification) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification.clone());
        Ok(())
    }
}

/// Fire-and-forget dispatcher in front of a [`NotificationSink`].
///
/// Each notification runs on its own task with bounded retries. The returned
/// handle resolves to whether delivery eventually succeeded; callers on the
/// booking path drop it.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    max_attempts: u32,
    backoff: Duration,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, max_attempts: u32) -> Self {
        Self {
            sink,
            max_attempts: max_attempts.max(1),
            backoff: Duration::from_millis(200),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn dispatch(&self, notification: Notification) -> JoinHandle<bool> {
        let sink = self.sink.clone();
        let max_attempts = self.max_attempts;
        let backoff = self.backoff;

        tokio::spawn(async move {
            for attempt in 1..=max_attempts {
                match sink.send(&notification).await {
                    Ok(()) => return true,
                    Err(e) => {
                        tracing::warn!(
                            "Notification '{}' to {} failed (attempt {}/{}): {}",
                            notification.subject, notification.to, attempt, max_attempts, e
                        );
                        if attempt < max_attempts {
                            tokio::time::sleep(backoff * attempt).await;
                        }
                    }
                }
            }
            tracing::error!("Dropping notification '{}' to {}", notification.subject, notification.to);
            false
        })
    }
}

/// Resolves a user's contact address and hands the composed message to the
/// [`Notifier`]. Only called after the owning transaction has committed.
#[derive(Clone)]
pub struct Outbox {
    store: Arc<dyn InventoryStore>,
    notifier: Notifier,
}

impl Outbox {
    pub fn new(store: Arc<dyn InventoryStore>, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    /// Returns the delivery handle, or `None` when nothing was dispatched
    pub async fn send_to<F>(&self, user_id: UserId, compose: F) -> Option<JoinHandle<bool>>
    where
        F: FnOnce(String) -> Notification + Send,
    {
        match self.store.contact_address(user_id).await {
            Ok(Some(address)) => Some(self.notifier.dispatch(compose(address))),
            Ok(None) => {
                tracing::warn!("No contact address for user {}, skipping notification", user_id);
                None
            }
            Err(e) => {
                tracing::warn!("Contact lookup for user {} failed: {}", user_id, e);
                None
            }
        }
    }
}
