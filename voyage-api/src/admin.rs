use axum::{
    extract::{Path, State},
    middleware,
    routing::{post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use voyage_core::{Trip, TripId, UserId};
use voyage_waitlist::SweepReport;

use crate::error::AppError;
use crate::middleware::{admin_auth_middleware, has_permission, AdminClaims};
use crate::state::AppState;

const INVENTORY_WRITE: &str = "inventory:write";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SetRoomsRequest {
    pub available_rooms: i32,
}

#[derive(Debug, Serialize)]
pub struct PromotionResponse {
    pub trip_id: TripId,
    pub offered_to: Vec<UserId>,
    pub drained: u64,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub trips_swept: usize,
    pub expired_removed: u64,
    pub offers_extended: usize,
    pub failures: usize,
}

impl From<SweepReport> for SweepResponse {
    fn from(report: SweepReport) -> Self {
        Self {
            trips_swept: report.trips_swept,
            expired_removed: report.expired_removed,
            offers_extended: report.offers_extended,
            failures: report.failures,
        }
    }
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/admin/trips/{trip_id}/rooms", put(set_available_rooms))
        .route("/v1/admin/trips/{trip_id}/promote", post(promote))
        .route("/v1/admin/waiting-list/sweep", post(sweep))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}

fn require_inventory_write(claims: &AdminClaims) -> Result<(), AppError> {
    if !has_permission(claims, INVENTORY_WRITE) {
        return Err(AppError::AuthorizationError(format!("Missing permission {}", INVENTORY_WRITE)));
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// PUT /v1/admin/trips/{trip_id}/rooms
async fn set_available_rooms(
    State(state): State<AppState>,
    Extension(claims): Extension<AdminClaims>,
    Path(trip_id): Path<i64>,
    Json(req): Json<SetRoomsRequest>,
) -> Result<Json<Trip>, AppError> {
    require_inventory_write(&claims)?;
    tracing::info!("Admin {} setting rooms of trip {} to {}", claims.sub, trip_id, req.available_rooms);
    let trip = state.admin.set_available_rooms(TripId(trip_id), req.available_rooms).await?;
    Ok(Json(trip))
}

/// POST /v1/admin/trips/{trip_id}/promote
async fn promote(
    State(state): State<AppState>,
    Extension(claims): Extension<AdminClaims>,
    Path(trip_id): Path<i64>,
) -> Result<Json<PromotionResponse>, AppError> {
    require_inventory_write(&claims)?;
    let outcome = state.engine.promote(TripId(trip_id)).await?;
    Ok(Json(PromotionResponse {
        trip_id: TripId(trip_id),
        offered_to: outcome.offers.iter().map(|e| e.user_id).collect(),
        drained: outcome.drained,
    }))
}

/// POST /v1/admin/waiting-list/sweep
async fn sweep(
    State(state): State<AppState>,
    Extension(claims): Extension<AdminClaims>,
) -> Result<Json<SweepResponse>, AppError> {
    require_inventory_write(&claims)?;
    let report = state.engine.sweep_expired().await?;
    Ok(Json(report.into()))
}
