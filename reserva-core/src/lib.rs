pub mod delivery;
pub mod error;
pub mod models;
pub mod repository;

pub use delivery::{ChannelError, ChannelSender, DeliveryReceipt, RenderError, TicketRenderer};
pub use error::{BookingError, StoreError};
pub use models::{
    AttemptStatus, Booking, BookingSelection, BookingSnapshot, BookingStatus, CustomerContact,
    LineItem, LineItemDraft, Package, PackageService, PipelineStep, ServiceSelection, SlotKey,
    TicketDeliveryAttempt,
};
pub use repository::{BookingStore, NewBooking};
