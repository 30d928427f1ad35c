use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use reserva_core::models::{
    AttemptStatus, Booking, BookingStatus, CustomerContact, LineItem, Package, PackageService,
    PipelineStep, SlotKey, TicketDeliveryAttempt,
};
use reserva_core::repository::{BookingStore, NewBooking};
use reserva_core::StoreError;

/// Postgres-backed slot ledger and booking store.
///
/// Slot exclusion is the partial unique index `bookings_slot_active_idx`:
/// the booking insert runs `ON CONFLICT ... DO NOTHING` against it, so the
/// losing side of a race sees zero rows affected instead of an error. A
/// concurrent writer holding the index entry uncommitted makes the insert
/// wait; `lock_timeout` bounds that wait and the timeout is reported as the
/// slot being taken.
pub struct PgBookingStore {
    pool: PgPool,
    slot_lock_timeout_ms: u64,
}

impl PgBookingStore {
    pub fn new(pool: PgPool, slot_lock_timeout_ms: u64) -> Self {
        Self {
            pool,
            slot_lock_timeout_ms,
        }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    tenant_id: Uuid,
    resource_id: Uuid,
    starts_at: DateTime<Utc>,
    duration_minutes: i32,
    customer_name: String,
    customer_email: String,
    customer_phone: String,
    customer_language: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_booking(self) -> Result<Booking, StoreError> {
        let status = BookingStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Backend(format!("unknown booking status {}", self.status)))?;

        Ok(Booking {
            id: self.id,
            tenant_id: self.tenant_id,
            slot: SlotKey {
                tenant_id: self.tenant_id,
                resource_id: self.resource_id,
                starts_at: self.starts_at,
                duration_minutes: self.duration_minutes,
            },
            customer: CustomerContact {
                name: self.customer_name,
                email: self.customer_email,
                phone: self.customer_phone,
                language: self.customer_language,
            },
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LineItemRow {
    id: Uuid,
    booking_id: Uuid,
    service_id: Uuid,
    name: String,
    quantity: i32,
    unit_price_cents: i32,
}

#[derive(sqlx::FromRow)]
struct PackageServiceRow {
    service_id: Uuid,
    name: String,
    quantity: i32,
    unit_price_cents: i32,
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: Uuid,
    booking_id: Uuid,
    step: String,
    status: String,
    error_detail: Option<String>,
    created_at: DateTime<Utc>,
}

fn map_sqlx(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) => {
            // 55P03: lock wait exceeded lock_timeout while a concurrent
            // booking held the slot's index entry.
            if db.code().as_deref() == Some("55P03") {
                return StoreError::SlotTaken("timed out waiting on slot lock".to_string());
            }
            StoreError::Backend(e.to_string())
        }
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Transient(e.to_string()),
        _ => StoreError::Backend(e.to_string()),
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn create_booking(&self, new: &NewBooking) -> Result<Booking, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        // lock_timeout cannot be bound as a parameter; the value comes from
        // config, not user input.
        let set_timeout = format!("SET LOCAL lock_timeout = '{}ms'", self.slot_lock_timeout_ms);
        sqlx::query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO bookings (id, tenant_id, resource_id, starts_at, duration_minutes,
                                  customer_name, customer_email, customer_phone, customer_language,
                                  status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'PENDING')
            ON CONFLICT (tenant_id, resource_id, starts_at) WHERE status <> 'CANCELLED'
            DO NOTHING
            "#,
        )
        .bind(new.id)
        .bind(new.tenant_id)
        .bind(new.slot.resource_id)
        .bind(new.slot.starts_at)
        .bind(new.slot.duration_minutes)
        .bind(&new.customer.name)
        .bind(&new.customer.email)
        .bind(&new.customer.phone)
        .bind(&new.customer.language)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        if inserted.rows_affected() == 0 {
            // Another active booking holds this slot; the transaction is
            // dropped and nothing was committed.
            return Err(StoreError::SlotTaken(new.slot.to_string()));
        }

        for (position, draft) in new.line_items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO line_items (id, booking_id, service_id, name, quantity, unit_price_cents, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(new.id)
            .bind(draft.service_id)
            .bind(&draft.name)
            .bind(draft.quantity)
            .bind(draft.unit_price_cents)
            .bind(position as i32)
            .execute(&mut *tx)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    StoreError::DuplicateLineItem(draft.service_id)
                }
                _ => map_sqlx(e),
            })?;
        }

        sqlx::query("UPDATE bookings SET status = 'CONFIRMED', updated_at = NOW() WHERE id = $1")
            .bind(new.id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        let row: BookingRow = sqlx::query_as(
            r#"
            SELECT id, tenant_id, resource_id, starts_at, duration_minutes,
                   customer_name, customer_email, customer_phone, customer_language,
                   status, created_at, updated_at
            FROM bookings WHERE id = $1
            "#,
        )
        .bind(new.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;

        row.into_booking()
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, resource_id, starts_at, duration_minutes,
                   customer_name, customer_email, customer_phone, customer_language,
                   status, created_at, updated_at
            FROM bookings WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(BookingRow::into_booking).transpose()
    }

    async fn list_line_items(&self, booking_id: Uuid) -> Result<Vec<LineItem>, StoreError> {
        let rows: Vec<LineItemRow> = sqlx::query_as(
            r#"
            SELECT id, booking_id, service_id, name, quantity, unit_price_cents
            FROM line_items WHERE booking_id = $1 ORDER BY position
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows
            .into_iter()
            .map(|r| LineItem {
                id: r.id,
                booking_id: r.booking_id,
                service_id: r.service_id,
                name: r.name,
                quantity: r.quantity,
                unit_price_cents: r.unit_price_cents,
            })
            .collect())
    }

    async fn update_booking_status(
        &self,
        id: Uuid,
        status: BookingStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE bookings SET status = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("booking {}", id)));
        }
        Ok(())
    }

    async fn get_package(&self, id: Uuid) -> Result<Option<Package>, StoreError> {
        let header: Option<(Uuid, Uuid, String)> =
            sqlx::query_as("SELECT id, tenant_id, name FROM packages WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;

        let Some((id, tenant_id, name)) = header else {
            return Ok(None);
        };

        let rows: Vec<PackageServiceRow> = sqlx::query_as(
            r#"
            SELECT service_id, name, quantity, unit_price_cents
            FROM package_services WHERE package_id = $1 ORDER BY position
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(Some(Package {
            id,
            tenant_id,
            name,
            services: rows
                .into_iter()
                .map(|r| PackageService {
                    service_id: r.service_id,
                    name: r.name,
                    quantity: r.quantity,
                    unit_price_cents: r.unit_price_cents,
                })
                .collect(),
        }))
    }

    async fn record_delivery_attempt(
        &self,
        attempt: &TicketDeliveryAttempt,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ticket_delivery_attempts (id, booking_id, step, status, error_detail, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.booking_id)
        .bind(attempt.step.as_str())
        .bind(attempt.status.as_str())
        .bind(&attempt.error_detail)
        .bind(attempt.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn list_delivery_attempts(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<TicketDeliveryAttempt>, StoreError> {
        let rows: Vec<AttemptRow> = sqlx::query_as(
            r#"
            SELECT id, booking_id, step, status, error_detail, created_at
            FROM ticket_delivery_attempts WHERE booking_id = $1 ORDER BY created_at, id
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.into_iter()
            .map(|r| {
                let step = PipelineStep::parse(&r.step)
                    .ok_or_else(|| StoreError::Backend(format!("unknown step {}", r.step)))?;
                let status = AttemptStatus::parse(&r.status)
                    .ok_or_else(|| StoreError::Backend(format!("unknown status {}", r.status)))?;
                Ok(TicketDeliveryAttempt {
                    id: r.id,
                    booking_id: r.booking_id,
                    step,
                    status,
                    error_detail: r.error_detail,
                    created_at: r.created_at,
                })
            })
            .collect()
    }

    async fn save_ticket_artifact(&self, booking_id: Uuid, pdf: &[u8]) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ticket_artifacts (booking_id, pdf)
            VALUES ($1, $2)
            ON CONFLICT (booking_id) DO UPDATE SET pdf = EXCLUDED.pdf, created_at = NOW()
            "#,
        )
        .bind(booking_id)
        .bind(pdf)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn get_ticket_artifact(&self, booking_id: Uuid) -> Result<Option<Vec<u8>>, StoreError> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT pdf FROM ticket_artifacts WHERE booking_id = $1")
                .bind(booking_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;

        Ok(row.map(|(pdf,)| pdf))
    }
}
