use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use voyage_api::{app, state::{AppState, AuthConfig}};
use voyage_api::middleware::{AdminClaims, CustomerClaims};
use voyage_core::notify::RecordingSink;
use voyage_core::{SystemClock, Trip, TripId, UserId};
use voyage_store::app_config::BookingRules;
use voyage_store::MemoryStore;

const SECRET: &str = "integration-secret";

fn expiry() -> usize {
    (Utc::now() + Duration::hours(1)).timestamp() as usize
}

fn customer_token(user: i64) -> String {
    let claims = CustomerClaims {
        sub: user.to_string(),
        email: format!("user{}@example.com", user),
        role: "CUSTOMER".to_string(),
        exp: expiry(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn admin_token(permissions: &[&str]) -> String {
    let claims = AdminClaims {
        sub: "900".to_string(),
        email: "ops@example.com".to_string(),
        role: "ADMIN".to_string(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        exp: expiry(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

struct TestApp {
    router: Router,
    store: MemoryStore,
}

impl TestApp {
    fn new() -> Self {
        let store = MemoryStore::new();
        for user in 1..=10 {
            store.register_contact(UserId(user), format!("user{}@example.com", user));
        }
        let state = AppState::build(
            Arc::new(store.clone()),
            Arc::new(SystemClock),
            Arc::new(RecordingSink::new()),
            &BookingRules::default(),
            AuthConfig { secret: SECRET.to_string() },
        );
        Self { router: app(state), store }
    }

    fn trip(&self, id: i64, rooms: i32) -> TripId {
        let start = Utc::now() + Duration::days(60);
        self.store.insert_trip(Trip {
            id: TripId(id),
            package_name: "Fjord Explorer".to_string(),
            destination: "Bergen".to_string(),
            country: "Norway".to_string(),
            start_date: start,
            end_date: start + Duration::days(7),
            price_cents: 90_000,
            available_rooms: rooms,
            min_age: None,
            cancellation_window_days: 14,
        });
        TripId(id)
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_reserve_then_list() {
    let app = TestApp::new();
    let trip = app.trip(1, 5);
    let token = customer_token(1);

    let (status, booking) = app
        .call(Method::POST, &format!("/v1/trips/{}/bookings", trip), Some(&token), Some(json!({ "quantity": 2 })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["quantity"], 2);
    assert_eq!(booking["status"], "ACTIVE");

    let (status, list) = app.call(Method::GET, "/v1/bookings", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["trip"]["available_rooms"], 3);
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = TestApp::new();
    let (status, _) = app.call(Method::GET, "/v1/bookings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.call(Method::GET, "/v1/bookings", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_customer_cannot_reach_admin_routes() {
    let app = TestApp::new();
    let trip = app.trip(1, 0);
    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/v1/admin/trips/{}/rooms", trip),
            Some(&customer_token(1)),
            Some(json!({ "available_rooms": 4 })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/v1/admin/trips/{}/rooms", trip),
            Some(&admin_token(&[])),
            Some(json!({ "available_rooms": 4 })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_full_trip_sends_users_to_waiting_list() {
    let app = TestApp::new();
    let trip = app.trip(1, 1);

    let (status, _) = app
        .call(Method::POST, &format!("/v1/trips/{}/bookings", trip), Some(&customer_token(1)), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let late = customer_token(2);
    let (status, body) = app
        .call(Method::POST, &format!("/v1/trips/{}/bookings", trip), Some(&late), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INSUFFICIENT_CAPACITY");

    let uri = format!("/v1/trips/{}/waiting-list", trip);
    let (status, entry) = app.call(Method::POST, &uri, Some(&late), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(entry["user_id"], 2);

    let (status, waiting) = app.call(Method::GET, &uri, Some(&late), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(waiting["in_list"], true);
    assert_eq!(waiting["position"], 1);
    assert_eq!(waiting["waiting_count"], 1);

    let (status, body) = app.call(Method::POST, &uri, Some(&late), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_WAITING");

    let (status, _) = app.call(Method::DELETE, &uri, Some(&late), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = app.call(Method::DELETE, &uri, Some(&late), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_released_rooms_go_to_waiting_user_first() {
    let app = TestApp::new();
    let trip = app.trip(1, 1);
    app.call(Method::POST, &format!("/v1/trips/{}/bookings", trip), Some(&customer_token(1)), Some(json!({})))
        .await;

    let waiting = customer_token(2);
    let (status, _) = app
        .call(Method::POST, &format!("/v1/trips/{}/waiting-list", trip), Some(&waiting), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, updated) = app
        .call(
            Method::PUT,
            &format!("/v1/admin/trips/{}/rooms", trip),
            Some(&admin_token(&["inventory:write"])),
            Some(json!({ "available_rooms": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["available_rooms"], 1);

    let (_, waiting_status) = app
        .call(Method::GET, &format!("/v1/trips/{}/waiting-list", trip), Some(&waiting), None)
        .await;
    assert_eq!(waiting_status["has_live_offer"], true);

    let (status, body) = app
        .call(Method::POST, &format!("/v1/trips/{}/bookings", trip), Some(&customer_token(3)), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "NOT_FIRST_IN_LINE");

    let (status, booking) = app
        .call(Method::POST, &format!("/v1/trips/{}/bookings", trip), Some(&waiting), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["user_id"], 2);
}

#[tokio::test]
async fn test_pay_then_cancel_refunds() {
    let app = TestApp::new();
    let trip = app.trip(1, 4);
    let token = customer_token(1);

    let (_, booking) = app
        .call(Method::POST, &format!("/v1/trips/{}/bookings", trip), Some(&token), Some(json!({ "quantity": 2 })))
        .await;
    let id = booking["id"].as_i64().unwrap();

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/v1/bookings/{}/payment", id),
            Some(&token),
            Some(json!({ "succeeded": false })),
        )
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "PAYMENT_DECLINED");

    let (status, receipt) = app
        .call(
            Method::POST,
            &format!("/v1/bookings/{}/payment", id),
            Some(&token),
            Some(json!({ "succeeded": true, "reference": "pi_123" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["amount_cents"], 180_000);
    assert_eq!(receipt["booking"]["is_paid"], true);

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/v1/bookings/{}/quantity", id),
            Some(&token),
            Some(json!({ "quantity": 3 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "PAID_BOOKING_IMMUTABLE");

    let (status, cancelled) = app.call(Method::DELETE, &format!("/v1/bookings/{}", id), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["booking"]["status"], "CANCELLED");
    assert_eq!(cancelled["refunded_cents"], 180_000);
}

#[tokio::test]
async fn test_other_users_booking_is_not_found() {
    let app = TestApp::new();
    let trip = app.trip(1, 4);
    let (_, booking) = app
        .call(Method::POST, &format!("/v1/trips/{}/bookings", trip), Some(&customer_token(1)), Some(json!({})))
        .await;
    let id = booking["id"].as_i64().unwrap();

    let (status, _) = app
        .call(Method::DELETE, &format!("/v1/bookings/{}", id), Some(&customer_token(2)), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
