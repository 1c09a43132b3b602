use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{Booking, BookingId, BookingSummary, NewBooking, Trip, TripId, UserId, WaitingEntryId, WaitingListEntry};
use crate::payment::{NewPayment, PaymentRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Trip {0} is not locked by this transaction")]
    TripNotLocked(TripId),
    #[error("Transaction already holds the lock on trip {held}, cannot lock trip {requested}")]
    LockConflict { held: TripId, requested: TripId },
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        StoreError::Backend(err.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent trip inventory, booking ledger and waiting list.
///
/// Methods on the store itself are committed reads that take no locks. Every
/// mutation goes through a [`StoreTx`].
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;

    async fn get_trip(&self, trip_id: TripId) -> StoreResult<Option<Trip>>;

    async fn get_booking(&self, booking_id: BookingId) -> StoreResult<Option<Booking>>;

    /// Active bookings of a user joined with their trips, earliest start first
    async fn list_active_bookings(&self, user_id: UserId) -> StoreResult<Vec<BookingSummary>>;

    /// Waiting-list entries of a trip in FIFO order
    async fn list_waiting_entries(&self, trip_id: TripId) -> StoreResult<Vec<WaitingListEntry>>;

    /// Trips holding at least one entry whose offer deadline has passed
    async fn trips_with_expired_offers(&self, now: DateTime<Utc>) -> StoreResult<Vec<TripId>>;

    /// Trips with un-notified entries and more free rooms than live offers,
    /// i.e. a promotion pass that never ran or failed after its caller committed
    async fn trips_awaiting_promotion(&self, now: DateTime<Utc>) -> StoreResult<Vec<TripId>>;

    /// Active bookings whose trip starts in `[from, to)`
    async fn bookings_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<BookingSummary>>;

    async fn contact_address(&self, user_id: UserId) -> StoreResult<Option<String>>;
}

/// One unit of work. A transaction locks at most one trip; all reads and
/// writes of that trip's bookings and waiting list require the lock.
///
/// Dropping a transaction without calling [`StoreTx::commit`] rolls it back.
#[async_trait]
pub trait StoreTx: Send {
    /// Serialize admission checks of one user. Must be taken before `lock_trip`.
    async fn lock_user(&mut self, user_id: UserId) -> StoreResult<()>;

    /// Distinct trips other than `excluding` on which the user holds an
    /// Active booking and whose start is after `now`
    async fn count_upcoming_trips(
        &mut self,
        user_id: UserId,
        excluding: TripId,
        now: DateTime<Utc>,
    ) -> StoreResult<u32>;

    /// Take the exclusive trip row lock, held until commit or rollback.
    /// Returns `None` when the trip does not exist.
    async fn lock_trip(&mut self, trip_id: TripId) -> StoreResult<Option<Trip>>;

    /// `available_rooms += delta`. Callers validate the result stays non-negative.
    async fn adjust_rooms(&mut self, trip_id: TripId, delta: i32) -> StoreResult<()>;

    async fn set_available_rooms(&mut self, trip_id: TripId, rooms: i32) -> StoreResult<()>;

    async fn find_active_booking(&mut self, user_id: UserId, trip_id: TripId) -> StoreResult<Option<Booking>>;

    async fn get_booking(&mut self, booking_id: BookingId) -> StoreResult<Option<Booking>>;

    async fn insert_booking(&mut self, booking: NewBooking) -> StoreResult<Booking>;

    /// Persist quantity, status, paid flag/timestamp and group minimum age
    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<()>;

    async fn record_payment(&mut self, payment: NewPayment) -> StoreResult<PaymentRecord>;

    /// All waiting-list entries of the locked trip in FIFO order (join date,
    /// then entry id)
    async fn waiting_entries(&mut self, trip_id: TripId) -> StoreResult<Vec<WaitingListEntry>>;

    async fn insert_waiting_entry(
        &mut self,
        trip_id: TripId,
        user_id: UserId,
        join_date: DateTime<Utc>,
    ) -> StoreResult<WaitingListEntry>;

    async fn mark_notified(
        &mut self,
        trip_id: TripId,
        entry_id: WaitingEntryId,
        notified_at: DateTime<Utc>,
        expiration_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Remove a user's own entry. Returns whether one existed.
    async fn delete_waiting_entry(&mut self, trip_id: TripId, user_id: UserId) -> StoreResult<bool>;

    async fn delete_waiting_entries(&mut self, trip_id: TripId, ids: &[WaitingEntryId]) -> StoreResult<u64>;

    async fn clear_waiting_list(&mut self, trip_id: TripId) -> StoreResult<u64>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
