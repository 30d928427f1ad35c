use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a bookable (tenant, resource, time window) unit.
///
/// Uniqueness is scoped to `(tenant_id, resource_id, starts_at)` over active
/// bookings: a cancelled booking frees its slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotKey {
    pub tenant_id: Uuid,
    pub resource_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i32,
}

impl SlotKey {
    /// The portion of the key that participates in the uniqueness constraint.
    pub fn identity(&self) -> (Uuid, Uuid, DateTime<Utc>) {
        (self.tenant_id, self.resource_id, self.starts_at)
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.tenant_id,
            self.resource_id,
            self.starts_at.to_rfc3339()
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerContact {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub language: String,
}

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(BookingStatus::Pending),
            "CONFIRMED" => Some(BookingStatus::Confirmed),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    /// A cancelled booking no longer occupies its slot.
    pub fn is_active(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

/// The single source of truth for a customer's reservation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub slot: SlotKey,
    pub customer: CustomerContact,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(tenant_id: Uuid, slot: SlotKey, customer: CustomerContact) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            slot,
            customer,
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update_status(&mut self, new_status: BookingStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }
}

/// A named bundle of services sold as one unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub services: Vec<PackageService>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageService {
    pub service_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: i32,
}

/// What the caller asked to book: a predefined package or an explicit
/// service list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BookingSelection {
    Package(Uuid),
    Services(Vec<ServiceSelection>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSelection {
    pub service_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: i32,
}

/// A resolved line item, not yet written to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemDraft {
    pub service_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: i32,
}

/// One service entry attached to a booking. `(booking_id, service_id)` is
/// unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub service_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: i32,
}

/// Pipeline step for ticket generation and delivery
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStep {
    Pdf,
    Whatsapp,
    Email,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Pdf => "PDF",
            PipelineStep::Whatsapp => "WHATSAPP",
            PipelineStep::Email => "EMAIL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PDF" => Some(PipelineStep::Pdf),
            "WHATSAPP" => Some(PipelineStep::Whatsapp),
            "EMAIL" => Some(PipelineStep::Email),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    /// Appended when the step starts. A crash mid-step leaves this as the
    /// latest row, so the interrupted step stays visible afterwards.
    Pending,
    Success,
    Failed,
    Skipped,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pending => "PENDING",
            AttemptStatus::Success => "SUCCESS",
            AttemptStatus::Failed => "FAILED",
            AttemptStatus::Skipped => "SKIPPED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(AttemptStatus::Pending),
            "SUCCESS" => Some(AttemptStatus::Success),
            "FAILED" => Some(AttemptStatus::Failed),
            "SKIPPED" => Some(AttemptStatus::Skipped),
            _ => None,
        }
    }
}

/// Append-only audit record of one pipeline step execution. Never deleted,
/// never blocks the booking it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDeliveryAttempt {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub step: PipelineStep,
    pub status: AttemptStatus,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TicketDeliveryAttempt {
    pub fn new(
        booking_id: Uuid,
        step: PipelineStep,
        status: AttemptStatus,
        error_detail: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            step,
            status,
            error_detail,
            created_at: Utc::now(),
        }
    }
}

/// Immutable view of a booking handed to the ticket renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSnapshot {
    pub booking_id: Uuid,
    pub tenant_id: Uuid,
    pub slot: SlotKey,
    pub customer: CustomerContact,
    pub line_items: Vec<LineItem>,
}

impl BookingSnapshot {
    pub fn total_cents(&self) -> i64 {
        self.line_items
            .iter()
            .map(|li| li.unit_price_cents as i64 * li.quantity as i64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for s in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
        ] {
            assert_eq!(BookingStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(BookingStatus::parse("EXPIRED"), None);
    }

    #[test]
    fn test_cancelled_is_not_active() {
        assert!(BookingStatus::Confirmed.is_active());
        assert!(BookingStatus::Pending.is_active());
        assert!(!BookingStatus::Cancelled.is_active());
    }

    #[test]
    fn test_snapshot_total() {
        let booking_id = Uuid::new_v4();
        let snapshot = BookingSnapshot {
            booking_id,
            tenant_id: Uuid::new_v4(),
            slot: SlotKey {
                tenant_id: Uuid::new_v4(),
                resource_id: Uuid::new_v4(),
                starts_at: Utc::now(),
                duration_minutes: 60,
            },
            customer: CustomerContact {
                name: "Ana".to_string(),
                email: "ana@example.com".to_string(),
                phone: "+34600000000".to_string(),
                language: "es".to_string(),
            },
            line_items: vec![
                LineItem {
                    id: Uuid::new_v4(),
                    booking_id,
                    service_id: Uuid::new_v4(),
                    name: "Massage".to_string(),
                    quantity: 2,
                    unit_price_cents: 4500,
                },
                LineItem {
                    id: Uuid::new_v4(),
                    booking_id,
                    service_id: Uuid::new_v4(),
                    name: "Sauna".to_string(),
                    quantity: 1,
                    unit_price_cents: 2000,
                },
            ],
        };
        assert_eq!(snapshot.total_cents(), 11000);
    }
}
