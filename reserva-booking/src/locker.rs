use std::sync::Arc;

use reserva_core::models::{
    Booking, BookingSelection, BookingStatus, CustomerContact, LineItem, LineItemDraft, SlotKey,
};
use reserva_core::repository::{BookingStore, NewBooking};
use reserva_core::BookingError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::composer;

/// Serializes booking creation against the slot ledger.
///
/// The locker itself holds no lock: mutual exclusion lives in the store's
/// atomic insert-if-slot-free primitive, so multiple server instances can
/// run concurrently against the same ledger.
pub struct BookingLocker {
    store: Arc<dyn BookingStore>,
}

impl BookingLocker {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    /// Create a booking for a slot. Exactly one of N concurrent attempts on
    /// the same slot key succeeds; the rest get `SlotUnavailable`.
    pub async fn create_booking(
        &self,
        tenant_id: Uuid,
        slot: SlotKey,
        customer: CustomerContact,
        selection: BookingSelection,
    ) -> Result<Booking, BookingError> {
        if slot.tenant_id != tenant_id {
            return Err(BookingError::InvalidRequest(
                "slot tenant does not match request tenant".to_string(),
            ));
        }

        let line_items = self.resolve_selection(tenant_id, &selection).await?;

        let new = NewBooking {
            id: Uuid::new_v4(),
            tenant_id,
            slot: slot.clone(),
            customer,
            line_items,
        };

        match self.store.create_booking(&new).await {
            Ok(booking) => {
                info!(
                    booking_id = %booking.id,
                    slot = %slot,
                    "booking created"
                );
                Ok(booking)
            }
            Err(e) => {
                warn!(slot = %slot, error = %e, "booking creation failed");
                Err(e.into())
            }
        }
    }

    pub async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, BookingError> {
        Ok(self.store.get_booking(id).await?)
    }

    pub async fn list_line_items(&self, booking_id: Uuid) -> Result<Vec<LineItem>, BookingError> {
        Ok(self.store.list_line_items(booking_id).await?)
    }

    /// Transition: Pending -> Confirmed
    pub async fn confirm_booking(&self, id: Uuid) -> Result<Booking, BookingError> {
        self.transition(id, BookingStatus::Confirmed, |status| {
            matches!(status, BookingStatus::Pending)
        })
        .await
    }

    /// Transition: Pending | Confirmed -> Cancelled. Cancelling frees the
    /// slot for a new booking.
    pub async fn cancel_booking(&self, id: Uuid) -> Result<Booking, BookingError> {
        self.transition(id, BookingStatus::Cancelled, |status| {
            matches!(status, BookingStatus::Pending | BookingStatus::Confirmed)
        })
        .await
    }

    async fn transition(
        &self,
        id: Uuid,
        to: BookingStatus,
        allowed: impl Fn(BookingStatus) -> bool,
    ) -> Result<Booking, BookingError> {
        let mut booking = self
            .store
            .get_booking(id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", id)))?;

        if !allowed(booking.status) {
            return Err(BookingError::InvalidTransition {
                from: booking.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        self.store.update_booking_status(id, to).await?;
        booking.update_status(to);
        info!(booking_id = %id, status = to.as_str(), "booking status updated");
        Ok(booking)
    }

    async fn resolve_selection(
        &self,
        tenant_id: Uuid,
        selection: &BookingSelection,
    ) -> Result<Vec<LineItemDraft>, BookingError> {
        match selection {
            BookingSelection::Package(package_id) => {
                let package = self
                    .store
                    .get_package(*package_id)
                    .await?
                    .ok_or_else(|| {
                        BookingError::InvalidPackage(format!("package {} not found", package_id))
                    })?;

                if package.tenant_id != tenant_id {
                    return Err(BookingError::InvalidPackage(format!(
                        "package {} does not belong to tenant {}",
                        package_id, tenant_id
                    )));
                }

                composer::resolve_line_items(&package)
            }
            BookingSelection::Services(services) => {
                composer::resolve_service_selection(services)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use reserva_core::models::{Package, PackageService, TicketDeliveryAttempt};
    use reserva_core::StoreError;
    use reserva_store::InMemoryBookingStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn customer() -> CustomerContact {
        CustomerContact {
            name: "Ana García".to_string(),
            email: "ana@example.com".to_string(),
            phone: "+34600000000".to_string(),
            language: "es".to_string(),
        }
    }

    fn slot(tenant_id: Uuid, resource_id: Uuid) -> SlotKey {
        SlotKey {
            tenant_id,
            resource_id,
            starts_at: Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap(),
            duration_minutes: 60,
        }
    }

    fn spa_duo(tenant_id: Uuid) -> Package {
        Package {
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
        }
    }

    #[tokio::test]
    async fn test_booking_with_package_materializes_exact_line_items() {
        let store = Arc::new(InMemoryBookingStore::new());
        let tenant_id = Uuid::new_v4();
        let package = spa_duo(tenant_id);
        let expected: Vec<Uuid> = package.services.iter().map(|s| s.service_id).collect();
        store.put_package(package.clone()).await;

        let locker = BookingLocker::new(store.clone());
        let booking = locker
            .create_booking(
                tenant_id,
                slot(tenant_id, Uuid::new_v4()),
                customer(),
                BookingSelection::Package(package.id),
            )
            .await
            .unwrap();

        assert_eq!(booking.status, BookingStatus::Confirmed);

        let items = locker.list_line_items(booking.id).await.unwrap();
        assert_eq!(items.len(), 2);
        let ids: Vec<Uuid> = items.iter().map(|li| li.service_id).collect();
        assert_eq!(ids, expected);
        assert!(items.iter().all(|li| li.quantity == 1));
    }

    #[tokio::test]
    async fn test_same_slot_twice_is_unavailable() {
        let store = Arc::new(InMemoryBookingStore::new());
        let tenant_id = Uuid::new_v4();
        let package = spa_duo(tenant_id);
        store.put_package(package.clone()).await;

        let locker = BookingLocker::new(store);
        let resource_id = Uuid::new_v4();

        locker
            .create_booking(
                tenant_id,
                slot(tenant_id, resource_id),
                customer(),
                BookingSelection::Package(package.id),
            )
            .await
            .unwrap();

        let second = locker
            .create_booking(
                tenant_id,
                slot(tenant_id, resource_id),
                customer(),
                BookingSelection::Package(package.id),
            )
            .await;

        assert!(matches!(second, Err(BookingError::SlotUnavailable)));
    }

    #[tokio::test]
    async fn test_concurrent_attempts_one_winner() {
        let store = Arc::new(InMemoryBookingStore::new());
        let tenant_id = Uuid::new_v4();
        let package = spa_duo(tenant_id);
        store.put_package(package.clone()).await;

        let locker = Arc::new(BookingLocker::new(store));
        let resource_id = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let locker = locker.clone();
            let package_id = package.id;
            handles.push(tokio::spawn(async move {
                locker
                    .create_booking(
                        tenant_id,
                        slot(tenant_id, resource_id),
                        customer(),
                        BookingSelection::Package(package_id),
                    )
                    .await
            }));
        }

        let mut winners = 0;
        let mut losers = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(booking) => {
                    assert_eq!(booking.status, BookingStatus::Confirmed);
                    winners += 1;
                }
                Err(BookingError::SlotUnavailable) => losers += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(losers, 15);
    }

    #[tokio::test]
    async fn test_cancel_frees_slot_for_rebooking() {
        let store = Arc::new(InMemoryBookingStore::new());
        let tenant_id = Uuid::new_v4();
        let package = spa_duo(tenant_id);
        store.put_package(package.clone()).await;

        let locker = BookingLocker::new(store);
        let resource_id = Uuid::new_v4();

        let first = locker
            .create_booking(
                tenant_id,
                slot(tenant_id, resource_id),
                customer(),
                BookingSelection::Package(package.id),
            )
            .await
            .unwrap();

        locker.cancel_booking(first.id).await.unwrap();

        let second = locker
            .create_booking(
                tenant_id,
                slot(tenant_id, resource_id),
                customer(),
                BookingSelection::Package(package.id),
            )
            .await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_twice_is_invalid_transition() {
        let store = Arc::new(InMemoryBookingStore::new());
        let tenant_id = Uuid::new_v4();
        let package = spa_duo(tenant_id);
        store.put_package(package.clone()).await;

        let locker = BookingLocker::new(store);
        let booking = locker
            .create_booking(
                tenant_id,
                slot(tenant_id, Uuid::new_v4()),
                customer(),
                BookingSelection::Package(package.id),
            )
            .await
            .unwrap();

        locker.cancel_booking(booking.id).await.unwrap();
        let result = locker.cancel_booking(booking.id).await;
        assert!(matches!(
            result,
            Err(BookingError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_confirm_already_confirmed_is_invalid_transition() {
        let store = Arc::new(InMemoryBookingStore::new());
        let tenant_id = Uuid::new_v4();
        let package = spa_duo(tenant_id);
        store.put_package(package.clone()).await;

        let locker = BookingLocker::new(store);
        let booking = locker
            .create_booking(
                tenant_id,
                slot(tenant_id, Uuid::new_v4()),
                customer(),
                BookingSelection::Package(package.id),
            )
            .await
            .unwrap();

        // The atomic create already confirmed the booking.
        let result = locker.confirm_booking(booking.id).await;
        assert!(matches!(
            result,
            Err(BookingError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_package_is_invalid() {
        let store = Arc::new(InMemoryBookingStore::new());
        let tenant_id = Uuid::new_v4();
        let locker = BookingLocker::new(store);

        let result = locker
            .create_booking(
                tenant_id,
                slot(tenant_id, Uuid::new_v4()),
                customer(),
                BookingSelection::Package(Uuid::new_v4()),
            )
            .await;

        assert!(matches!(result, Err(BookingError::InvalidPackage(_))));
    }

    #[tokio::test]
    async fn test_foreign_tenant_slot_is_rejected_as_invalid_request() {
        let store = Arc::new(InMemoryBookingStore::new());
        let tenant_id = Uuid::new_v4();
        let package = spa_duo(tenant_id);
        store.put_package(package.clone()).await;

        let locker = BookingLocker::new(store);
        let result = locker
            .create_booking(
                tenant_id,
                slot(Uuid::new_v4(), Uuid::new_v4()),
                customer(),
                BookingSelection::Package(package.id),
            )
            .await;

        // A tenant mismatch on the slot is a request problem, not a
        // package problem.
        assert!(matches!(result, Err(BookingError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_foreign_tenant_package_is_invalid() {
        let store = Arc::new(InMemoryBookingStore::new());
        let tenant_id = Uuid::new_v4();
        let package = spa_duo(Uuid::new_v4());
        store.put_package(package.clone()).await;

        let locker = BookingLocker::new(store);
        let result = locker
            .create_booking(
                tenant_id,
                slot(tenant_id, Uuid::new_v4()),
                customer(),
                BookingSelection::Package(package.id),
            )
            .await;

        assert!(matches!(result, Err(BookingError::InvalidPackage(_))));
    }

    /// Store wrapper that fails the first create with a transient error,
    /// simulating a dropped connection before anything was committed.
    struct FlakyStore {
        inner: Arc<InMemoryBookingStore>,
        failed_once: AtomicBool,
    }

    #[async_trait]
    impl BookingStore for FlakyStore {
        async fn create_booking(&self, new: &NewBooking) -> Result<Booking, StoreError> {
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                return Err(StoreError::Transient("connection reset".to_string()));
            }
            self.inner.create_booking(new).await
        }

        async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
            self.inner.get_booking(id).await
        }

        async fn list_line_items(&self, booking_id: Uuid) -> Result<Vec<LineItem>, StoreError> {
            self.inner.list_line_items(booking_id).await
        }

        async fn update_booking_status(
            &self,
            id: Uuid,
            status: BookingStatus,
        ) -> Result<(), StoreError> {
            self.inner.update_booking_status(id, status).await
        }

        async fn get_package(&self, id: Uuid) -> Result<Option<Package>, StoreError> {
            self.inner.get_package(id).await
        }

        async fn record_delivery_attempt(
            &self,
            attempt: &TicketDeliveryAttempt,
        ) -> Result<(), StoreError> {
            self.inner.record_delivery_attempt(attempt).await
        }

        async fn list_delivery_attempts(
            &self,
            booking_id: Uuid,
        ) -> Result<Vec<TicketDeliveryAttempt>, StoreError> {
            self.inner.list_delivery_attempts(booking_id).await
        }

        async fn save_ticket_artifact(
            &self,
            booking_id: Uuid,
            pdf: &[u8],
        ) -> Result<(), StoreError> {
            self.inner.save_ticket_artifact(booking_id, pdf).await
        }

        async fn get_ticket_artifact(
            &self,
            booking_id: Uuid,
        ) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.get_ticket_artifact(booking_id).await
        }
    }

    #[tokio::test]
    async fn test_retry_after_transient_failure_yields_exact_line_items() {
        let inner = Arc::new(InMemoryBookingStore::new());
        let tenant_id = Uuid::new_v4();
        let package = spa_duo(tenant_id);
        let expected: Vec<Uuid> = package.services.iter().map(|s| s.service_id).collect();
        inner.put_package(package.clone()).await;

        let locker = BookingLocker::new(Arc::new(FlakyStore {
            inner: inner.clone(),
            failed_once: AtomicBool::new(false),
        }));
        let resource_id = Uuid::new_v4();

        let first = locker
            .create_booking(
                tenant_id,
                slot(tenant_id, resource_id),
                customer(),
                BookingSelection::Package(package.id),
            )
            .await;
        assert!(matches!(first, Err(BookingError::TransientStorage(_))));

        // Nothing was committed, so resubmitting from scratch is safe and
        // must not double up line items.
        let booking = locker
            .create_booking(
                tenant_id,
                slot(tenant_id, resource_id),
                customer(),
                BookingSelection::Package(package.id),
            )
            .await
            .unwrap();

        let items = locker.list_line_items(booking.id).await.unwrap();
        let ids: Vec<Uuid> = items.iter().map(|li| li.service_id).collect();
        assert_eq!(ids, expected);
    }
}
