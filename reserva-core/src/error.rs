use uuid::Uuid;

/// Errors surfaced by the storage layer. The atomic booking write either
/// commits everything or nothing, so `Transient` is always safe to retry
/// from scratch.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("slot already taken: {0}")]
    SlotTaken(String),

    #[error("duplicate line item for service {0}")]
    DuplicateLineItem(Uuid),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient storage failure: {0}")]
    Transient(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Booking-creation error taxonomy returned to callers.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    /// Expected contention outcome. Not retried internally; the caller may
    /// offer an alternate slot.
    #[error("slot is no longer available")]
    SlotUnavailable,

    /// The request is malformed independently of any package lookup.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid package: {0}")]
    InvalidPackage(String),

    /// Infrastructure failure during the atomic write. Nothing was
    /// committed; resubmitting the same request is safe.
    #[error("transient storage failure: {0}")]
    TransientStorage(String),

    #[error("booking not found: {0}")]
    NotFound(String),

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("line item uniqueness violated for service {0}")]
    LineItemConflict(Uuid),
}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::SlotTaken(_) => BookingError::SlotUnavailable,
            StoreError::DuplicateLineItem(id) => BookingError::LineItemConflict(id),
            StoreError::NotFound(what) => BookingError::NotFound(what),
            StoreError::Transient(msg) => BookingError::TransientStorage(msg),
            // No partial state can have been committed, so a wholesale retry
            // is still the right caller response.
            StoreError::Backend(msg) => BookingError::TransientStorage(msg),
        }
    }
}
