use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use voyage_core::BookingError;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    Booking(BookingError),
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        AppError::Booking(err)
    }
}

fn booking_status(err: &BookingError) -> StatusCode {
    match err {
        BookingError::NotFound(_) => StatusCode::NOT_FOUND,
        BookingError::AgeInfoRequired { .. }
        | BookingError::AgeIneligible { .. }
        | BookingError::InvalidQuantity(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BookingError::CapacityExceeded { .. }
        | BookingError::InsufficientCapacity { .. }
        | BookingError::NotFirstInLine
        | BookingError::CancellationWindowViolated { .. }
        | BookingError::PaidBookingImmutable
        | BookingError::TripAlreadyStarted
        | BookingError::AlreadyWaiting
        | BookingError::AlreadyBooked => StatusCode::CONFLICT,
        BookingError::PaymentDeclined => StatusCode::PAYMENT_REQUIRED,
        BookingError::BookingFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            AppError::Booking(err) => {
                if let BookingError::BookingFailed(cause) = &err {
                    tracing::error!("Booking failed: {}", cause);
                }
                (booking_status(&err), err.code(), err.to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}
