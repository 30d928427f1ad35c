use std::sync::Arc;

use reserva_booking::BookingLocker;
use reserva_ticket::TicketPipeline;

#[derive(Clone)]
pub struct AppState {
    pub locker: Arc<BookingLocker>,
    pub pipeline: Arc<TicketPipeline>,
}
