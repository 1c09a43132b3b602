use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use voyage_booking::{CancellationReceipt, PaymentReceipt};
use voyage_core::payment::PaymentOutcome;
use voyage_core::{Booking, BookingId, BookingSummary, TripId};

use crate::error::AppError;
use crate::middleware::{customer_auth_middleware, CustomerClaims};
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    #[serde(default = "one")]
    pub quantity: i32,
    pub group_min_age: Option<u32>,
}

fn one() -> i32 { 1 }

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", get(list_bookings))
        .route("/v1/trips/{trip_id}/bookings", post(reserve))
        .route("/v1/bookings/{booking_id}", delete(cancel))
        .route("/v1/bookings/{booking_id}/quantity", post(update_quantity))
        .route("/v1/bookings/{booking_id}/payment", post(confirm_payment))
        .route_layer(middleware::from_fn_with_state(state, customer_auth_middleware))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /v1/bookings
async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
) -> Result<Json<Vec<BookingSummary>>, AppError> {
    let bookings = state.bookings.list_bookings(claims.user_id()?).await?;
    Ok(Json(bookings))
}

/// POST /v1/trips/{trip_id}/bookings
async fn reserve(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(trip_id): Path<i64>,
    Json(req): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state
        .bookings
        .reserve(claims.user_id()?, TripId(trip_id), req.quantity, req.group_min_age)
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// DELETE /v1/bookings/{booking_id}
async fn cancel(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(booking_id): Path<i64>,
) -> Result<Json<CancellationReceipt>, AppError> {
    let receipt = state.bookings.cancel(claims.user_id()?, BookingId(booking_id)).await?;
    Ok(Json(receipt))
}

/// POST /v1/bookings/{booking_id}/quantity
async fn update_quantity(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(booking_id): Path<i64>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .bookings
        .update_quantity(claims.user_id()?, BookingId(booking_id), req.quantity)
        .await?;
    Ok(Json(booking))
}

/// POST /v1/bookings/{booking_id}/payment
/// Called once the payment gateway has reported its verdict
async fn confirm_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(booking_id): Path<i64>,
    Json(outcome): Json<PaymentOutcome>,
) -> Result<Json<PaymentReceipt>, AppError> {
    let receipt = state
        .bookings
        .confirm_payment(claims.user_id()?, BookingId(booking_id), outcome)
        .await?;
    Ok(Json(receipt))
}
