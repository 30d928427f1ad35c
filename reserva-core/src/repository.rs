use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Booking, BookingStatus, CustomerContact, LineItem, LineItemDraft, Package, SlotKey,
    TicketDeliveryAttempt,
};

/// Everything the atomic booking write needs, resolved up front.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub slot: SlotKey,
    pub customer: CustomerContact,
    pub line_items: Vec<LineItemDraft>,
}

/// Storage contract for the booking core.
///
/// `create_booking` is the insert-if-slot-free primitive: slot reservation,
/// booking row and line items commit as one unit. Implementations must
/// return `StoreError::SlotTaken` when another active booking holds the
/// slot identity, never a generic conflict.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn create_booking(&self, new: &NewBooking) -> Result<Booking, StoreError>;

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    /// Line items in the order they were given to `create_booking`.
    async fn list_line_items(&self, booking_id: Uuid) -> Result<Vec<LineItem>, StoreError>;

    async fn update_booking_status(
        &self,
        id: Uuid,
        status: BookingStatus,
    ) -> Result<(), StoreError>;

    async fn get_package(&self, id: Uuid) -> Result<Option<Package>, StoreError>;

    /// Append-only; attempts are never updated or deleted.
    async fn record_delivery_attempt(
        &self,
        attempt: &TicketDeliveryAttempt,
    ) -> Result<(), StoreError>;

    /// Attempts for a booking, oldest first.
    async fn list_delivery_attempts(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<TicketDeliveryAttempt>, StoreError>;

    async fn save_ticket_artifact(&self, booking_id: Uuid, pdf: &[u8]) -> Result<(), StoreError>;

    async fn get_ticket_artifact(&self, booking_id: Uuid) -> Result<Option<Vec<u8>>, StoreError>;
}
