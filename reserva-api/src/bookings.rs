use axum::{
    extract::{Json, Path, State},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use reserva_core::models::{
    Booking, BookingSelection, CustomerContact, LineItem, PipelineStep, ServiceSelection, SlotKey,
};
use reserva_ticket::{StepOutcome, TicketPipelineResult};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/bookings/{id}/ticket", get(ticket_status))
        .route("/v1/bookings/{id}/ticket/redeliver", post(redeliver_ticket))
}

#[derive(Debug, Deserialize)]
struct CreateBookingRequest {
    tenant_id: Uuid,
    resource_id: Uuid,
    starts_at: DateTime<Utc>,
    duration_minutes: i32,
    customer: CustomerPayload,
    package_id: Option<Uuid>,
    services: Option<Vec<ServicePayload>>,
}

#[derive(Debug, Deserialize)]
struct CustomerPayload {
    name: String,
    email: String,
    phone: String,
    #[serde(default = "default_language")]
    language: String,
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Deserialize)]
struct ServicePayload {
    service_id: Uuid,
    name: String,
    quantity: i32,
    unit_price_cents: i32,
}

#[derive(Debug, Serialize)]
struct BookingResponse {
    booking_id: Uuid,
    status: String,
    line_items: Vec<LineItemView>,
}

#[derive(Debug, Serialize)]
struct LineItemView {
    service_id: Uuid,
    name: String,
    quantity: i32,
    unit_price_cents: i32,
}

impl BookingResponse {
    fn from_parts(booking: &Booking, items: Vec<LineItem>) -> Self {
        Self {
            booking_id: booking.id,
            status: booking.status.as_str().to_string(),
            line_items: items
                .into_iter()
                .map(|li| LineItemView {
                    service_id: li.service_id,
                    name: li.name,
                    quantity: li.quantity,
                    unit_price_cents: li.unit_price_cents,
                })
                .collect(),
        }
    }
}

async fn create_booking(
    State(state): State<AppState>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let selection = match (req.package_id, req.services) {
        (Some(package_id), _) => BookingSelection::Package(package_id),
        (None, Some(services)) if !services.is_empty() => BookingSelection::Services(
            services
                .into_iter()
                .map(|s| ServiceSelection {
                    service_id: s.service_id,
                    name: s.name,
                    quantity: s.quantity,
                    unit_price_cents: s.unit_price_cents,
                })
                .collect(),
        ),
        _ => {
            return Err(AppError::ValidationError(
                "either package_id or a non-empty services list is required".to_string(),
            ))
        }
    };

    let slot = SlotKey {
        tenant_id: req.tenant_id,
        resource_id: req.resource_id,
        starts_at: req.starts_at,
        duration_minutes: req.duration_minutes,
    };
    let customer = CustomerContact {
        name: req.customer.name,
        email: req.customer.email,
        phone: req.customer.phone,
        language: req.customer.language,
    };

    let booking = state
        .locker
        .create_booking(req.tenant_id, slot, customer, selection)
        .await
        .map_err(AppError::from_booking)?;

    let items = state
        .locker
        .list_line_items(booking.id)
        .await
        .map_err(AppError::from_booking)?;

    // Ticket generation runs detached: delivery outcome never affects the
    // response or the booking itself.
    let pipeline = state.pipeline.clone();
    let detached = booking.clone();
    tokio::spawn(async move {
        if let Err(e) = pipeline.generate_and_deliver(&detached).await {
            error!(booking_id = %detached.id, error = %e, "ticket pipeline did not run");
        }
    });

    info!("Booking confirmed: {}", booking.id);

    Ok(Json(BookingResponse::from_parts(&booking, items)))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state
        .locker
        .get_booking(id)
        .await
        .map_err(AppError::from_booking)?
        .ok_or_else(|| AppError::NotFoundError(format!("booking {}", id)))?;

    let items = state
        .locker
        .list_line_items(id)
        .await
        .map_err(AppError::from_booking)?;

    Ok(Json(BookingResponse::from_parts(&booking, items)))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state
        .locker
        .cancel_booking(id)
        .await
        .map_err(AppError::from_booking)?;

    let items = state
        .locker
        .list_line_items(id)
        .await
        .map_err(AppError::from_booking)?;

    Ok(Json(BookingResponse::from_parts(&booking, items)))
}

async fn ticket_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketPipelineResult>, AppError> {
    state
        .locker
        .get_booking(id)
        .await
        .map_err(AppError::from_booking)?
        .ok_or_else(|| AppError::NotFoundError(format!("booking {}", id)))?;

    let status = state
        .pipeline
        .status(id)
        .await
        .map_err(AppError::from_pipeline)?;

    Ok(Json(status))
}

#[derive(Debug, Deserialize)]
struct RedeliverRequest {
    channel: PipelineStep,
}

#[derive(Debug, Serialize)]
struct RedeliverResponse {
    booking_id: Uuid,
    channel: PipelineStep,
    outcome: StepOutcome,
}

async fn redeliver_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RedeliverRequest>,
) -> Result<Json<RedeliverResponse>, AppError> {
    let booking = state
        .locker
        .get_booking(id)
        .await
        .map_err(AppError::from_booking)?
        .ok_or_else(|| AppError::NotFoundError(format!("booking {}", id)))?;

    let outcome = state
        .pipeline
        .redeliver(&booking, req.channel)
        .await
        .map_err(AppError::from_pipeline)?;

    info!(booking_id = %id, channel = req.channel.as_str(), "manual re-delivery triggered");

    Ok(Json(RedeliverResponse {
        booking_id: id,
        channel: req.channel,
        outcome,
    }))
}
