pub mod composer;
pub mod locker;

pub use composer::{resolve_line_items, resolve_service_selection};
pub use locker::BookingLocker;
