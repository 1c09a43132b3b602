use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::post,
    Extension, Json, Router,
};
use voyage_core::{TripId, WaitingListEntry};
use voyage_waitlist::WaitingStatus;

use crate::error::AppError;
use crate::middleware::{customer_auth_middleware, CustomerClaims};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/v1/trips/{trip_id}/waiting-list",
            post(join).get(status).delete(leave),
        )
        .route_layer(middleware::from_fn_with_state(state, customer_auth_middleware))
}

async fn join(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(trip_id): Path<i64>,
) -> Result<(StatusCode, Json<WaitingListEntry>), AppError> {
    let entry = state.waitlist.join(claims.user_id()?, TripId(trip_id)).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn status(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(trip_id): Path<i64>,
) -> Result<Json<WaitingStatus>, AppError> {
    let status = state.waitlist.status(claims.user_id()?, TripId(trip_id)).await?;
    Ok(Json(status))
}

async fn leave(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(trip_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.waitlist.leave(claims.user_id()?, TripId(trip_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
