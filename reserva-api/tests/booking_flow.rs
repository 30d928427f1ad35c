use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use reserva_api::{app, AppState};
use reserva_booking::BookingLocker;
use reserva_core::models::{Package, PackageService};
use reserva_core::repository::BookingStore;
use reserva_store::InMemoryBookingStore;
use reserva_ticket::adapters::{MockChannel, MockRenderer};
use reserva_ticket::TicketPipeline;

async fn test_app() -> (Router, Uuid, Uuid) {
    let store = Arc::new(InMemoryBookingStore::new());
    let tenant_id = Uuid::new_v4();
    let package = Package {
        id: Uuid::new_v4(),
        tenant_id,
        name: "Spa Duo".to_string(),
        services: vec![
            PackageService {
                service_id: Uuid::new_v4(),
                name: "Massage".to_string(),
                quantity: 1,
                unit_price_cents: 4500,
            },
            PackageService {
                service_id: Uuid::new_v4(),
                name: "Sauna".to_string(),
                quantity: 1,
                unit_price_cents: 2000,
            },
        ],
    };
    let package_id = package.id;
    store.put_package(package).await;

    let store: Arc<dyn BookingStore> = store;
    let locker = Arc::new(BookingLocker::new(store.clone()));
    let pipeline = Arc::new(TicketPipeline::new(
        store,
        Arc::new(MockRenderer::ok()),
        Arc::new(MockChannel::ok("whatsapp")),
        Arc::new(MockChannel::ok("email")),
        Duration::from_secs(5),
    ));

    (app(AppState { locker, pipeline }), tenant_id, package_id)
}

fn create_request(tenant_id: Uuid, package_id: Uuid, starts_at: &str) -> Request<Body> {
    let payload = json!({
        "tenant_id": tenant_id,
        "resource_id": "5f8b1a52-8a3c-4b1f-9a68-cd2a36aa11fa",
        "starts_at": starts_at,
        "duration_minutes": 60,
        "customer": {
            "name": "Ana García",
            "email": "ana@example.com",
            "phone": "+34600000000",
            "language": "es"
        },
        "package_id": package_id
    });

    Request::builder()
        .method("POST")
        .uri("/v1/bookings")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_create_booking_returns_confirmed_with_line_items() {
    let (app, tenant_id, package_id) = test_app().await;

    let response = app
        .oneshot(create_request(tenant_id, package_id, "2025-01-01T10:00:00Z"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "CONFIRMED");
    assert_eq!(body["line_items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_second_booking_for_same_slot_conflicts() {
    let (app, tenant_id, package_id) = test_app().await;

    let first = app
        .clone()
        .oneshot(create_request(tenant_id, package_id, "2025-01-01T10:00:00Z"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(create_request(tenant_id, package_id, "2025-01-01T10:00:00Z"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_package_is_bad_request() {
    let (app, tenant_id, _) = test_app().await;

    let response = app
        .oneshot(create_request(tenant_id, Uuid::new_v4(), "2025-01-01T10:00:00Z"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_selection_is_bad_request() {
    let (app, tenant_id, _) = test_app().await;

    let payload = json!({
        "tenant_id": tenant_id,
        "resource_id": Uuid::new_v4(),
        "starts_at": "2025-01-01T10:00:00Z",
        "duration_minutes": 60,
        "customer": {
            "name": "Ana",
            "email": "ana@example.com",
            "phone": "+34600000000"
        }
    });
    let request = Request::builder()
        .method("POST")
        .uri("/v1/bookings")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ticket_status_for_unknown_booking_is_not_found() {
    let (app, _, _) = test_app().await;

    let request = Request::builder()
        .uri(format!("/v1/bookings/{}/ticket", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ticket_status_reaches_success_after_detached_pipeline() {
    let (app, tenant_id, package_id) = test_app().await;

    let response = app
        .clone()
        .oneshot(create_request(tenant_id, package_id, "2025-01-01T10:00:00Z"))
        .await
        .unwrap();
    let body = body_json(response).await;
    let booking_id = body["booking_id"].as_str().unwrap().to_string();

    // The pipeline runs detached from the request; poll until it lands.
    let mut status = Value::Null;
    for _ in 0..100 {
        let request = Request::builder()
            .uri(format!("/v1/bookings/{}/ticket", booking_id))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        status = body_json(response).await;
        if status["pdf"]["status"] == "SUCCESS" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(status["pdf"]["status"], "SUCCESS");
    assert_eq!(status["whatsapp"]["status"], "SUCCESS");
    assert_eq!(status["email"]["status"], "SUCCESS");
}

#[tokio::test]
async fn test_cancel_frees_slot_for_rebooking() {
    let (app, tenant_id, package_id) = test_app().await;

    let response = app
        .clone()
        .oneshot(create_request(tenant_id, package_id, "2025-01-01T10:00:00Z"))
        .await
        .unwrap();
    let body = body_json(response).await;
    let booking_id = body["booking_id"].as_str().unwrap().to_string();

    let cancel = Request::builder()
        .method("POST")
        .uri(format!("/v1/bookings/{}/cancel", booking_id))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(cancel).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "CANCELLED");

    let rebook = app
        .oneshot(create_request(tenant_id, package_id, "2025-01-01T10:00:00Z"))
        .await
        .unwrap();
    assert_eq!(rebook.status(), StatusCode::OK);
}
