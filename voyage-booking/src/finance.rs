use chrono::{DateTime, Utc};
use voyage_core::payment::{NewPayment, PaymentStatus};
use voyage_core::{Booking, Trip};

/// Price of the rooms held by a booking, in minor units
pub fn booking_total(trip: &Trip, booking: &Booking) -> i64 {
    trip.price_cents * i64::from(booking.quantity)
}

pub fn settlement(trip: &Trip, booking: &Booking, at: DateTime<Utc>) -> NewPayment {
    NewPayment {
        booking_id: booking.id,
        amount_cents: booking_total(trip, booking),
        status: PaymentStatus::Success,
        recorded_at: at,
    }
}

/// Compensating ledger row for a paid booking being cancelled. Bookkeeping
/// only: no money moves from here.
pub fn refund(trip: &Trip, booking: &Booking, at: DateTime<Utc>) -> NewPayment {
    NewPayment {
        booking_id: booking.id,
        amount_cents: booking_total(trip, booking),
        status: PaymentStatus::Refunded,
        recorded_at: at,
    }
}
