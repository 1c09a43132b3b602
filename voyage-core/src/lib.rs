pub mod clock;
pub mod model;
pub mod notify;
pub mod payment;
pub mod pii;
pub mod repository;

pub use clock::{Clock, ManualClock, SystemClock};
pub use model::{Booking, BookingId, BookingStatus, BookingSummary, NewBooking, Trip, TripId, UserId, WaitingEntryId, WaitingListEntry};
pub use repository::{InventoryStore, StoreError, StoreResult, StoreTx};

/// Outcome kinds surfaced by every booking, cancellation, quantity and
/// waiting-list operation. A returned error always means no state changed.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("You cannot book more than {limit} upcoming trips")]
    CapacityExceeded { limit: u32 },
    #[error("This trip requires participants to be at least {min_age} years old; the group's minimum age is required")]
    AgeInfoRequired { min_age: u32 },
    #[error("This trip requires participants to be at least {min_age} years old (group minimum age {group_min_age})")]
    AgeIneligible { min_age: u32, group_min_age: u32 },
    #[error("Insufficient rooms: requested {requested}, available {available}")]
    InsufficientCapacity { requested: u32, available: i32 },
    #[error("You are not first in the waiting list")]
    NotFirstInLine,
    #[error("Cancellation not allowed within {window_days} days of the trip start")]
    CancellationWindowViolated { window_days: u32 },
    #[error("Paid bookings cannot change quantity")]
    PaidBookingImmutable,
    #[error("The trip has already started")]
    TripAlreadyStarted,
    #[error("You are already in the waiting list")]
    AlreadyWaiting,
    #[error("You already hold a booking for this trip")]
    AlreadyBooked,
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),
    #[error("Payment was not completed")]
    PaymentDeclined,
    #[error("Booking failed, please try again")]
    BookingFailed(#[from] StoreError),
}

impl BookingError {
    /// Stable machine-readable code for API responses and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::NotFound(_) => "NOT_FOUND",
            BookingError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            BookingError::AgeInfoRequired { .. } => "AGE_INFO_REQUIRED",
            BookingError::AgeIneligible { .. } => "AGE_INELIGIBLE",
            BookingError::InsufficientCapacity { .. } => "INSUFFICIENT_CAPACITY",
            BookingError::NotFirstInLine => "NOT_FIRST_IN_LINE",
            BookingError::CancellationWindowViolated { .. } => "CANCELLATION_WINDOW_VIOLATED",
            BookingError::PaidBookingImmutable => "PAID_BOOKING_IMMUTABLE",
            BookingError::TripAlreadyStarted => "TRIP_ALREADY_STARTED",
            BookingError::AlreadyWaiting => "ALREADY_WAITING",
            BookingError::AlreadyBooked => "ALREADY_BOOKED",
            BookingError::InvalidQuantity(_) => "INVALID_QUANTITY",
            BookingError::PaymentDeclined => "PAYMENT_DECLINED",
            BookingError::BookingFailed(_) => "BOOKING_FAILED",
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
