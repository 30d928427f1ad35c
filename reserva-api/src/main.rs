use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reserva_api::{app, state::AppState};
use reserva_booking::BookingLocker;
use reserva_core::repository::BookingStore;
use reserva_store::{DbClient, PgBookingStore};
use reserva_ticket::adapters::{MockChannel, MockRenderer};
use reserva_ticket::TicketPipeline;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reserva_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = reserva_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Reserva API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let store: Arc<dyn BookingStore> = Arc::new(PgBookingStore::new(
        db.pool.clone(),
        config.booking.slot_lock_timeout_ms,
    ));

    let locker = Arc::new(BookingLocker::new(store.clone()));

    // The renderer and channel providers are external services; the mock
    // adapters keep a local run self-contained until they are wired in.
    let pipeline = Arc::new(TicketPipeline::new(
        store,
        Arc::new(MockRenderer::ok()),
        Arc::new(MockChannel::ok("whatsapp")),
        Arc::new(MockChannel::ok("email")),
        Duration::from_secs(config.ticket.step_timeout_seconds),
    ));

    let app = app(AppState { locker, pipeline });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
