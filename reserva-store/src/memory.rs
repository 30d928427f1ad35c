use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use reserva_core::models::{
    Booking, BookingStatus, LineItem, Package, SlotKey, TicketDeliveryAttempt,
};
use reserva_core::repository::{BookingStore, NewBooking};
use reserva_core::StoreError;

/// In-memory booking store for tests and local development.
///
/// Every trait method takes the single state mutex, which makes each
/// operation atomic the same way the Postgres transaction does. Not suitable
/// for multi-instance deployments, where the slot ledger must live in the
/// shared database.
pub struct InMemoryBookingStore {
    state: Mutex<MemState>,
}

#[derive(Default)]
struct MemState {
    bookings: HashMap<Uuid, Booking>,
    line_items: HashMap<Uuid, Vec<LineItem>>,
    // active slot identity -> booking holding it
    slots: HashMap<(Uuid, Uuid, DateTime<Utc>), Uuid>,
    packages: HashMap<Uuid, Package>,
    attempts: HashMap<Uuid, Vec<TicketDeliveryAttempt>>,
    artifacts: HashMap<Uuid, Vec<u8>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemState::default()),
        }
    }

    pub async fn put_package(&self, package: Package) {
        let mut state = self.state.lock().await;
        state.packages.insert(package.id, package);
    }
}

impl Default for InMemoryBookingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn create_booking(&self, new: &NewBooking) -> Result<Booking, StoreError> {
        let mut state = self.state.lock().await;

        let identity = new.slot.identity();
        if state.slots.contains_key(&identity) {
            return Err(StoreError::SlotTaken(new.slot.to_string()));
        }

        let mut items: Vec<LineItem> = Vec::with_capacity(new.line_items.len());
        for draft in &new.line_items {
            if items.iter().any(|li| li.service_id == draft.service_id) {
                return Err(StoreError::DuplicateLineItem(draft.service_id));
            }
            items.push(LineItem {
                id: Uuid::new_v4(),
                booking_id: new.id,
                service_id: draft.service_id,
                name: draft.name.clone(),
                quantity: draft.quantity,
                unit_price_cents: draft.unit_price_cents,
            });
        }

        let now = Utc::now();
        let booking = Booking {
            id: new.id,
            tenant_id: new.tenant_id,
            slot: new.slot.clone(),
            customer: new.customer.clone(),
            status: BookingStatus::Confirmed,
            created_at: now,
            updated_at: now,
        };

        state.slots.insert(identity, new.id);
        state.bookings.insert(new.id, booking.clone());
        state.line_items.insert(new.id, items);

        Ok(booking)
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.bookings.get(&id).cloned())
    }

    async fn list_line_items(&self, booking_id: Uuid) -> Result<Vec<LineItem>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.line_items.get(&booking_id).cloned().unwrap_or_default())
    }

    async fn update_booking_status(
        &self,
        id: Uuid,
        status: BookingStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;

        let slot_identity = {
            let booking = state
                .bookings
                .get_mut(&id)
                .ok_or_else(|| StoreError::NotFound(format!("booking {}", id)))?;
            booking.update_status(status);
            booking.slot.identity()
        };

        if !status.is_active() {
            state.slots.remove(&slot_identity);
        }
        Ok(())
    }

    async fn get_package(&self, id: Uuid) -> Result<Option<Package>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.packages.get(&id).cloned())
    }

    async fn record_delivery_attempt(
        &self,
        attempt: &TicketDeliveryAttempt,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state
            .attempts
            .entry(attempt.booking_id)
            .or_default()
            .push(attempt.clone());
        Ok(())
    }

    async fn list_delivery_attempts(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<TicketDeliveryAttempt>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.attempts.get(&booking_id).cloned().unwrap_or_default())
    }

    async fn save_ticket_artifact(&self, booking_id: Uuid, pdf: &[u8]) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.artifacts.insert(booking_id, pdf.to_vec());
        Ok(())
    }

    async fn get_ticket_artifact(&self, booking_id: Uuid) -> Result<Option<Vec<u8>>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.artifacts.get(&booking_id).cloned())
    }
}
