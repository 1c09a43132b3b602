use voyage_core::{BookingError, BookingResult, Trip};

/// Requested room counts below one are treated as a single room
pub fn normalize_quantity(requested: i32) -> u32 {
    requested.max(1) as u32
}

/// Per-user limit on distinct upcoming trips. Adding rooms to a trip the
/// user already holds never counts as a new trip.
pub fn check_trip_limit(already_booked: bool, upcoming_elsewhere: u32, limit: u32) -> BookingResult<()> {
    if !already_booked && upcoming_elsewhere >= limit {
        return Err(BookingError::CapacityExceeded { limit });
    }
    Ok(())
}

pub fn check_age(trip: &Trip, group_min_age: Option<u32>) -> BookingResult<()> {
    let Some(min_age) = trip.min_age else {
        return Ok(());
    };
    match group_min_age {
        None => Err(BookingError::AgeInfoRequired { min_age }),
        Some(age) if age < min_age => Err(BookingError::AgeIneligible { min_age, group_min_age: age }),
        Some(_) => Ok(()),
    }
}

pub fn check_rooms(available: i32, requested: u32) -> BookingResult<()> {
    if available <= 0 || i64::from(available) < i64::from(requested) {
        return Err(BookingError::InsufficientCapacity { requested, available });
    }
    Ok(())
}
