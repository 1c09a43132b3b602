use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Primary key of a bookable trip
    TripId
);
id_type!(UserId);
id_type!(BookingId);
id_type!(WaitingEntryId);

/// A bookable travel package with a fixed date range and room inventory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: TripId,
    pub package_name: String,
    pub destination: String,
    pub country: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Price per room in minor currency units
    pub price_cents: i64,
    /// Never negative; only mutated while the trip row is locked
    pub available_rooms: i32,
    pub min_age: Option<u32>,
    /// Lead time (days before start) required to cancel. Zero disables the check.
    pub cancellation_window_days: u32,
}

impl Trip {
    /// Package name, or "destination, country" when the package is unnamed
    pub fn display_title(&self) -> String {
        let title = self.package_name.trim();
        if title.is_empty() {
            format!("{}, {}", self.destination, self.country)
        } else {
            title.to_string()
        }
    }

    pub fn date_range(&self) -> String {
        format!(
            "{} - {}",
            self.start_date.format("%d/%m/%Y"),
            self.end_date.format("%d/%m/%Y")
        )
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now
    }

    /// True when `now` is closer to the start than the cancellation window allows
    pub fn within_cancellation_window(&self, now: DateTime<Utc>) -> bool {
        self.cancellation_window_days > 0
            && self.start_date - now < Duration::days(i64::from(self.cancellation_window_days))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Active,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Active => "ACTIVE",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(BookingStatus::Active),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status {other}")),
        }
    }
}

/// A user's reservation of one or more rooms on a trip.
///
/// At most one `Active` booking exists per (user, trip); repeat reservations
/// grow `quantity` instead of adding rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: BookingId,
    pub user_id: UserId,
    pub trip_id: TripId,
    pub quantity: u32,
    pub status: BookingStatus,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub group_min_age: Option<u32>,
    pub booked_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Active
    }
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: UserId,
    pub trip_id: TripId,
    pub quantity: u32,
    pub group_min_age: Option<u32>,
    pub booked_at: DateTime<Utc>,
}

/// Booking joined with its trip, as listed to the owning user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSummary {
    pub booking: Booking,
    pub trip: Trip,
}

/// A user queued for a seat on a full trip.
///
/// `join_date` is the FIFO key. An entry with `expiration_at` in the future
/// holds a live offer; once passed the offer has lapsed, whether or not the
/// sweeper has removed the row yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaitingListEntry {
    pub id: WaitingEntryId,
    pub trip_id: TripId,
    pub user_id: UserId,
    pub join_date: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
    pub expiration_at: Option<DateTime<Utc>>,
}

impl WaitingListEntry {
    pub fn is_active_notified(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiration_at, Some(expires) if now < expires)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiration_at, Some(expires) if now >= expires)
    }

    pub fn is_pending(&self) -> bool {
        self.notified_at.is_none()
    }
}
